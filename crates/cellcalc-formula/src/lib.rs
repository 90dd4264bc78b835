//! # cellcalc-formula
//!
//! Formula parser, validator and evaluator for cellcalc.
//!
//! This crate provides:
//! - Formula parsing (text → AST), with the callable names taken from a
//!   function registry
//! - Semantic validation that reports every arity and type error at once
//! - Evaluation against a map of externally supplied reference values
//! - Built-in arithmetic and text functions
//!
//! ## Example
//!
//! ```rust
//! use cellcalc_formula::{FormulaEngine, FormulaValue};
//! use std::collections::HashMap;
//!
//! let engine = FormulaEngine::builtin();
//! let ast = engine.parse("=SUM(A1, 2) * 3").unwrap();
//! assert!(engine.validate(&ast).is_success());
//!
//! let mut refs = HashMap::new();
//! refs.insert("A1".to_string(), FormulaValue::Number(4.0));
//! assert_eq!(engine.evaluate(&ast, &refs).unwrap(), FormulaValue::Number(18.0));
//! ```

pub mod ast;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod position;
pub mod validator;

pub use ast::{FormulaExpr, FunctionCall, ValueType};
#[cfg(feature = "serde")]
pub use engine::EvaluationOutcome;
pub use engine::{EngineOptions, FormulaEngine};
pub use error::{EvaluationError, RegistryError, SemanticError, SyntaxError, ValueResult};
pub use evaluator::{evaluate, FormulaValue, NoReferences, References};
pub use functions::{FunctionDef, FunctionRegistry};
pub use parser::{parse_formula, Grammar};
pub use position::Position;
pub use validator::{
    validate, validate_parsed, ArgCount, ArgType, ArgTypes, ArgValidator, ValidationResult,
};
