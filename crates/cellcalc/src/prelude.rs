//! Prelude module - common imports for cellcalc users
//!
//! ```rust
//! use cellcalc::prelude::*;
//! ```

pub use crate::{
    // Pipeline
    calculate,
    CalculationOptions,
    // Extension traits
    EngineCalculationExt,
    // Error types
    EvaluationError,
    FormulaEngine,
    FormulaError,
    // Main types
    FormulaExpr,
    FormulaValue,
    FunctionRegistry,
    NoReferences,
    Position,
    References,
    SemanticError,
    SyntaxError,
    ValidationResult,
};
