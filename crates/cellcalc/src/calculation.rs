//! One-shot formula calculation
//!
//! Runs the whole pipeline (parse, validate, evaluate) for a single formula
//! and reports the first stage that failed.
//!
//! # Example
//!
//! ```rust
//! use cellcalc::prelude::*;
//!
//! let engine = FormulaEngine::builtin();
//! let options = CalculationOptions::default();
//!
//! let value = engine.calculate("=CONCAT(12, \"12\")", &NoReferences, &options).unwrap();
//! assert_eq!(value, FormulaValue::String("1212".into()));
//!
//! let err = engine.calculate("=SUM(1, 1, 1)", &NoReferences, &options).unwrap_err();
//! assert!(matches!(err, FormulaError::Semantic(_)));
//! ```

use crate::{
    EvaluationError, FormulaEngine, FormulaValue, References, SemanticError, SyntaxError,
    ValidationResult,
};
use thiserror::Error;

/// Options for formula calculation
#[derive(Debug, Clone)]
pub struct CalculationOptions {
    /// Reject formulas with arity or type errors before evaluating them
    pub validate: bool,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

/// Failure of any stage of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// Every semantic error found in the tree, in source order
    #[error("Invalid formula: {}", join_messages(.0))]
    Semantic(Vec<SemanticError>),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl FormulaError {
    /// Semantic errors, empty for the other kinds
    pub fn semantic_errors(&self) -> &[SemanticError] {
        match self {
            FormulaError::Semantic(errors) => errors,
            _ => &[],
        }
    }
}

fn join_messages(errors: &[SemanticError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Extension trait adding the one-shot pipeline to an engine
pub trait EngineCalculationExt {
    /// Parse, optionally validate, and evaluate `formula`
    fn calculate<R>(
        &self,
        formula: &str,
        references: &R,
        options: &CalculationOptions,
    ) -> Result<FormulaValue, FormulaError>
    where
        R: References + ?Sized;
}

impl EngineCalculationExt for FormulaEngine {
    fn calculate<R>(
        &self,
        formula: &str,
        references: &R,
        options: &CalculationOptions,
    ) -> Result<FormulaValue, FormulaError>
    where
        R: References + ?Sized,
    {
        let ast = self.parse(formula)?;

        if options.validate {
            match self.validate(&ast) {
                ValidationResult::Success => {}
                ValidationResult::SemanticFailure(errors) => {
                    tracing::debug!(formula, errors = errors.len(), "rejected invalid formula");
                    return Err(FormulaError::Semantic(errors));
                }
                ValidationResult::SyntaxFailure(err) => return Err(FormulaError::Syntax(err)),
            }
        }

        let value = self.evaluate(&ast, references)?;
        tracing::trace!(formula, value = %value, "calculated formula");
        Ok(value)
    }
}

/// Calculate a formula with the built-in functions and default options
pub fn calculate<R>(formula: &str, references: &R) -> Result<FormulaValue, FormulaError>
where
    R: References + ?Sized,
{
    FormulaEngine::builtin().calculate(formula, references, &CalculationOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoReferences;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_calculate_literal() {
        assert_eq!(
            calculate("12", &NoReferences).unwrap(),
            FormulaValue::Number(12.0)
        );
    }

    #[test]
    fn test_syntax_error_stops_pipeline() {
        let err = calculate("=1+", &NoReferences).unwrap_err();
        match err {
            FormulaError::Syntax(e) => assert_eq!(e.offset(), 3),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_can_be_skipped() {
        let engine = FormulaEngine::builtin();
        let options = CalculationOptions { validate: false };

        // Validation would reject negating a string before evaluation
        let err = engine
            .calculate("=-\"a\"", &NoReferences, &options)
            .unwrap_err();
        assert!(matches!(err, FormulaError::Evaluation(_)));

        let err = calculate("=-\"a\"", &NoReferences).unwrap_err();
        assert!(matches!(err, FormulaError::Semantic(_)));
    }

    #[test]
    fn test_semantic_error_display() {
        let err = calculate("=SUM(1, 1, 1)", &NoReferences).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid formula: Add function takes exactly 2 arguments. 3 received instead. (at line 1, column 2)"
        );
        assert_eq!(err.semantic_errors().len(), 1);
    }
}
