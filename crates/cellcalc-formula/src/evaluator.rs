//! Formula evaluator
//!
//! Evaluates formula ASTs against a map of externally supplied reference
//! values. Evaluation never re-validates: contract violations that slip
//! through surface as evaluation errors.

use crate::ast::{FormulaExpr, FunctionCall};
use crate::error::{EvaluationError, ValueResult};
use crate::functions::{FunctionDef, FunctionRegistry};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::BuildHasher;

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum FormulaValue {
    Number(f64),
    String(String),
    Boolean(bool),
    /// A reference that is not in the value map
    Undefined,
}

impl FormulaValue {
    /// The number, if this is one
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Textual form used by concatenation
    pub fn to_text(&self) -> String {
        match self {
            FormulaValue::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, FormulaValue::Undefined)
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        // -0 prints as 0
        f.write_str("0")
    } else {
        write!(f, "{n}")
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaValue::Number(n) => write_number(f, *n),
            FormulaValue::String(s) => f.write_str(s),
            FormulaValue::Boolean(true) => f.write_str("TRUE"),
            FormulaValue::Boolean(false) => f.write_str("FALSE"),
            FormulaValue::Undefined => Ok(()),
        }
    }
}

impl From<f64> for FormulaValue {
    fn from(n: f64) -> Self {
        FormulaValue::Number(n)
    }
}

impl From<&str> for FormulaValue {
    fn from(s: &str) -> Self {
        FormulaValue::String(s.to_string())
    }
}

impl From<String> for FormulaValue {
    fn from(s: String) -> Self {
        FormulaValue::String(s)
    }
}

impl From<bool> for FormulaValue {
    fn from(b: bool) -> Self {
        FormulaValue::Boolean(b)
    }
}

/// Read-only source of reference values for one evaluation
pub trait References {
    fn resolve(&self, id: &str) -> Option<&FormulaValue>;
}

impl<S: BuildHasher> References for HashMap<String, FormulaValue, S> {
    fn resolve(&self, id: &str) -> Option<&FormulaValue> {
        self.get(id)
    }
}

impl References for BTreeMap<String, FormulaValue> {
    fn resolve(&self, id: &str) -> Option<&FormulaValue> {
        self.get(id)
    }
}

impl References for ahash::AHashMap<String, FormulaValue> {
    fn resolve(&self, id: &str) -> Option<&FormulaValue> {
        self.get(id)
    }
}

impl<R: References + ?Sized> References for &R {
    fn resolve(&self, id: &str) -> Option<&FormulaValue> {
        (**self).resolve(id)
    }
}

/// No references at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferences;

impl References for NoReferences {
    fn resolve(&self, _id: &str) -> Option<&FormulaValue> {
        None
    }
}

/// Pending work of the evaluation stack
enum Step<'e> {
    Enter(&'e FormulaExpr),
    /// All arguments of the call are on the value stack
    Apply(&'e FunctionCall, &'e FunctionDef),
}

/// Evaluate a formula expression
///
/// Arguments are evaluated left to right and the first error wins. The walk
/// keeps its own stack, so tree depth is bounded only by memory.
pub fn evaluate<R>(
    expr: &FormulaExpr,
    registry: &FunctionRegistry,
    references: &R,
) -> ValueResult<FormulaValue>
where
    R: References + ?Sized,
{
    let mut steps = vec![Step::Enter(expr)];
    let mut values: Vec<FormulaValue> = Vec::new();

    while let Some(step) = steps.pop() {
        match step {
            Step::Enter(FormulaExpr::Number { value, .. }) => {
                values.push(FormulaValue::Number(*value));
            }
            Step::Enter(FormulaExpr::String { value, .. }) => {
                values.push(FormulaValue::String(value.clone()));
            }
            Step::Enter(FormulaExpr::Reference { id, .. }) => {
                values.push(references.resolve(id).cloned().unwrap_or(FormulaValue::Undefined));
            }
            Step::Enter(FormulaExpr::FunctionCall(call)) => {
                let def = registry.operation(&call.name).ok_or_else(|| {
                    EvaluationError::new(call.position, format!("Unknown function: {}", call.name))
                })?;
                steps.push(Step::Apply(call, def));
                steps.extend(call.args.iter().rev().map(Step::Enter));
            }
            Step::Apply(call, def) => {
                let args = values.split_off(values.len().saturating_sub(call.args.len()));
                values.push(apply(call, def, &args)?);
            }
        }
    }

    values
        .pop()
        .ok_or_else(|| EvaluationError::new(expr.position(), "Formula produced no value"))
}

fn apply(call: &FunctionCall, def: &FunctionDef, args: &[FormulaValue]) -> ValueResult<FormulaValue> {
    let result = (def.implementation)(call, args);
    if let Err(err) = &result {
        tracing::trace!(function = %call.name, error = %err, "function evaluation failed");
    }
    result
}
