//! Text functions

use crate::ast::FunctionCall;
use crate::error::ValueResult;
use crate::evaluator::FormulaValue;

/// CONCAT function: joins the text of every argument, whatever its type
pub fn fn_concat(_call: &FunctionCall, args: &[FormulaValue]) -> ValueResult<FormulaValue> {
    let mut result = String::new();
    for arg in args {
        match arg {
            FormulaValue::String(s) => result.push_str(s),
            other => result.push_str(&other.to_text()),
        }
    }
    Ok(FormulaValue::String(result))
}
