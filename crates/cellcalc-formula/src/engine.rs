//! Formula engine
//!
//! Ties a sealed function registry to the grammar built from it. Engines are
//! immutable once constructed and can be shared across threads.

use crate::ast::FormulaExpr;
use crate::error::{SyntaxError, ValueResult};
use crate::evaluator::{self, FormulaValue, References};
use crate::functions::FunctionRegistry;
use crate::parser::{Grammar, DEFAULT_MAX_DEPTH};
use crate::validator::{self, ValidationResult};
use std::sync::{Arc, OnceLock};

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Deepest allowed nesting of parentheses and function calls
    pub max_depth: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Parser, validator and evaluator over one function registry
#[derive(Debug, Clone)]
pub struct FormulaEngine {
    registry: Arc<FunctionRegistry>,
    grammar: Grammar,
    options: EngineOptions,
}

impl FormulaEngine {
    /// Build an engine from `registry`, sealing it
    pub fn new(registry: FunctionRegistry) -> Self {
        Self::with_options(registry, EngineOptions::default())
    }

    pub fn with_options(mut registry: FunctionRegistry, options: EngineOptions) -> Self {
        let grammar = Grammar::new(&mut registry).with_max_depth(options.max_depth);
        Self {
            registry: Arc::new(registry),
            grammar,
            options,
        }
    }

    /// Shared engine over the built-in functions
    pub fn builtin() -> &'static FormulaEngine {
        static ENGINE: OnceLock<FormulaEngine> = OnceLock::new();
        ENGINE.get_or_init(|| FormulaEngine::new(FunctionRegistry::with_builtins()))
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Parse formula text. Text starting with `=` is a formula; anything
    /// else is a literal number or string.
    pub fn parse(&self, formula: &str) -> Result<FormulaExpr, SyntaxError> {
        self.grammar.parse(formula)
    }

    /// Check arity and argument types of every call in the tree
    pub fn validate(&self, expr: &FormulaExpr) -> ValidationResult {
        validator::validate(expr, &self.registry)
    }

    /// Validate a parse result, passing syntax failures through unchanged
    pub fn validate_parsed(&self, parsed: &Result<FormulaExpr, SyntaxError>) -> ValidationResult {
        validator::validate_parsed(parsed, &self.registry)
    }

    /// Evaluate a tree against the given reference values
    pub fn evaluate<R>(&self, expr: &FormulaExpr, references: &R) -> ValueResult<FormulaValue>
    where
        R: References + ?Sized,
    {
        evaluator::evaluate(expr, &self.registry, references)
    }
}

impl Default for FormulaEngine {
    fn default() -> Self {
        Self::new(FunctionRegistry::with_builtins())
    }
}

/// Serializable evaluation result: `{"ok": true, "value": ..}` or
/// `{"ok": false, "error": ..}`
#[cfg(feature = "serde")]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EvaluationOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FormulaValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<crate::error::EvaluationError>,
}

#[cfg(feature = "serde")]
impl From<ValueResult<FormulaValue>> for EvaluationOutcome {
    fn from(result: ValueResult<FormulaValue>) -> Self {
        match result {
            Ok(value) => Self {
                ok: true,
                value: Some(value),
                error: None,
            },
            Err(error) => Self {
                ok: false,
                value: None,
                error: Some(error),
            },
        }
    }
}
