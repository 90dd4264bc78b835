//! # cellcalc
//!
//! A spreadsheet formula engine.
//!
//! Formulas are parsed into a positioned AST, checked for arity and type
//! errors (all of them at once), then evaluated against a map of reference
//! values supplied by the caller.
//!
//! ## Features
//!
//! - Arithmetic operators `+ - * / ^`, prefix `-` and postfix `!`
//! - Function calls resolved through an extensible registry
//! - Syntax errors pointing at the furthest point the parser reached
//! - Optional `serde` support for trees, values and errors
//!
//! ## Example
//!
//! ```rust
//! use cellcalc::prelude::*;
//! use std::collections::HashMap;
//!
//! let mut refs = HashMap::new();
//! refs.insert("A1".to_string(), FormulaValue::Number(10.0));
//!
//! let value = calculate("=A1 * 2 + 1", &refs).unwrap();
//! assert_eq!(value, FormulaValue::Number(21.0));
//!
//! // Plain text is a literal value
//! let value = calculate("hello", &NoReferences).unwrap();
//! assert_eq!(value, FormulaValue::String("hello".into()));
//! ```

pub mod calculation;
pub mod prelude;

// Re-export calculation types
pub use calculation::{calculate, CalculationOptions, EngineCalculationExt, FormulaError};

// Re-export formula types
#[cfg(feature = "serde")]
pub use cellcalc_formula::EvaluationOutcome;
pub use cellcalc_formula::{
    evaluate,
    parse_formula,
    validate,
    validate_parsed,
    // Validation building blocks
    ArgCount,
    ArgType,
    ArgTypes,
    ArgValidator,
    // Engine
    EngineOptions,
    // Error types
    EvaluationError,
    FormulaEngine,
    // Tree types
    FormulaExpr,
    // Values
    FormulaValue,
    FunctionCall,
    FunctionDef,
    FunctionRegistry,
    Grammar,
    NoReferences,
    Position,
    References,
    RegistryError,
    SemanticError,
    SyntaxError,
    ValidationResult,
    ValueResult,
    ValueType,
};

/// Function implementations and validator helpers
pub mod functions {
    pub use cellcalc_formula::functions::math;
    pub use cellcalc_formula::functions::text;
    pub use cellcalc_formula::functions::{FunctionBuilder, FunctionImpl};
    pub use cellcalc_formula::validator::{either, is};
}
