//! Semantic validation
//!
//! Every function call runs its definition's validators in order and stops
//! at the first one that fails. Argument subtrees are always validated, so a
//! single pass reports every violation in the tree.

use crate::ast::{FormulaExpr, FunctionCall, ValueType};
use crate::error::{SemanticError, SyntaxError};
use crate::functions::FunctionRegistry;
use std::fmt;

/// Outcome of validating a (possibly unparsed) formula
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValidationResult {
    Success,
    /// Parsing already failed; nothing was validated
    SyntaxFailure(SyntaxError),
    SemanticFailure(Vec<SemanticError>),
}

impl ValidationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ValidationResult::Success)
    }

    /// Semantic errors, empty unless this is a `SemanticFailure`
    pub fn semantic_errors(&self) -> &[SemanticError] {
        match self {
            ValidationResult::SemanticFailure(errors) => errors,
            _ => &[],
        }
    }

    pub fn syntax_error(&self) -> Option<&SyntaxError> {
        match self {
            ValidationResult::SyntaxFailure(err) => Some(err),
            _ => None,
        }
    }
}

/// One step of a function's validation pipeline
pub trait ArgValidator: Send + Sync {
    fn validate(&self, call: &FunctionCall) -> Result<(), Vec<SemanticError>>;
}

impl<F> ArgValidator for F
where
    F: Fn(&FunctionCall) -> Result<(), Vec<SemanticError>> + Send + Sync,
{
    fn validate(&self, call: &FunctionCall) -> Result<(), Vec<SemanticError>> {
        self(call)
    }
}

/// Exact argument count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgCount {
    expected: usize,
}

impl ArgCount {
    pub fn exactly(expected: usize) -> Self {
        Self { expected }
    }
}

impl ArgValidator for ArgCount {
    fn validate(&self, call: &FunctionCall) -> Result<(), Vec<SemanticError>> {
        if call.args.len() == self.expected {
            return Ok(());
        }

        let plural = if self.expected == 1 { "" } else { "s" };
        Err(vec![SemanticError::new(
            call.position,
            format!(
                "{} function takes exactly {} argument{}. {} received instead.",
                call.name,
                self.expected,
                plural,
                call.args.len()
            ),
        )])
    }
}

/// Accepted-type predicate for one formal parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgType {
    Is(ValueType),
    Either(Vec<ArgType>),
}

/// Accept exactly `t`
pub fn is(t: ValueType) -> ArgType {
    ArgType::Is(t)
}

/// Accept anything one of `types` accepts
pub fn either(types: impl IntoIterator<Item = ArgType>) -> ArgType {
    ArgType::Either(types.into_iter().collect())
}

impl ArgType {
    pub fn accepts(&self, actual: ValueType) -> bool {
        match self {
            ArgType::Is(t) => *t == actual,
            ArgType::Either(types) => types.iter().any(|t| t.accepts(actual)),
        }
    }

    /// References are only typed at evaluation time, so every declared
    /// parameter also takes one.
    fn or_reference(self) -> ArgType {
        either([self, is(ValueType::Reference)])
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgType::Is(t) => write!(f, "{t}"),
            ArgType::Either(types) => {
                f.write_str("Either(")?;
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{t}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Per-position argument types, with an optional rule for all remaining
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgTypes {
    params: Vec<ArgType>,
    rest: Option<ArgType>,
}

impl ArgTypes {
    pub fn new(params: impl IntoIterator<Item = ArgType>) -> Self {
        Self {
            params: params.into_iter().map(ArgType::or_reference).collect(),
            rest: None,
        }
    }

    /// Every argument must satisfy `rest`
    pub fn varargs(rest: ArgType) -> Self {
        Self::new([]).with_rest(rest)
    }

    /// Arguments after the fixed parameters must satisfy `rest`
    pub fn with_rest(mut self, rest: ArgType) -> Self {
        self.rest = Some(rest.or_reference());
        self
    }

    fn check(arg: &FormulaExpr, expected: &ArgType) -> Option<SemanticError> {
        let actual = arg.static_type();
        if expected.accepts(actual) {
            return None;
        }

        let source = match arg.as_call() {
            Some(call) => format!("(returned from {}) ", call.name),
            None => String::new(),
        };
        Some(SemanticError::new(
            arg.position(),
            format!("Argument of type '{actual}' {source}is not valid. Argument must be '{expected}'."),
        ))
    }
}

impl ArgValidator for ArgTypes {
    fn validate(&self, call: &FunctionCall) -> Result<(), Vec<SemanticError>> {
        let mut errors: Vec<SemanticError> = call
            .args
            .iter()
            .zip(&self.params)
            .filter_map(|(arg, expected)| Self::check(arg, expected))
            .collect();

        if let Some(rest) = &self.rest {
            errors.extend(
                call.args
                    .iter()
                    .skip(self.params.len())
                    .filter_map(|arg| Self::check(arg, rest)),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Run one call's pipeline, returning the first failing step's errors
fn validate_call(call: &FunctionCall, registry: &FunctionRegistry) -> Vec<SemanticError> {
    let Some(def) = registry.operation(&call.name) else {
        return vec![SemanticError::new(
            call.position,
            format!("Unknown function: {}", call.name),
        )];
    };

    for validator in &def.validators {
        if let Err(errors) = validator.validate(call) {
            return errors;
        }
    }
    Vec::new()
}

/// Validate a whole tree, collecting every error in pre-order
pub fn validate(expr: &FormulaExpr, registry: &FunctionRegistry) -> ValidationResult {
    let mut errors = Vec::new();
    let mut pending = vec![expr];

    while let Some(node) = pending.pop() {
        match node {
            FormulaExpr::Number { .. } | FormulaExpr::String { .. } | FormulaExpr::Reference { .. } => {}
            FormulaExpr::FunctionCall(call) => {
                errors.extend(validate_call(call, registry));
                pending.extend(call.args.iter().rev());
            }
        }
    }

    if errors.is_empty() {
        ValidationResult::Success
    } else {
        tracing::debug!(errors = errors.len(), "formula failed validation");
        ValidationResult::SemanticFailure(errors)
    }
}

/// Validate the output of a parse, passing a syntax failure through
pub fn validate_parsed(
    parsed: &Result<FormulaExpr, SyntaxError>,
    registry: &FunctionRegistry,
) -> ValidationResult {
    match parsed {
        Ok(expr) => validate(expr, registry),
        Err(err) => ValidationResult::SyntaxFailure(err.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;
    use pretty_assertions::assert_eq;

    fn at(offset: usize) -> Position {
        Position::new(offset, 1, offset as u32 + 1)
    }

    fn num(v: f64, offset: usize) -> FormulaExpr {
        FormulaExpr::number(v, at(offset))
    }

    fn text(v: &str, offset: usize) -> FormulaExpr {
        FormulaExpr::string(v, at(offset))
    }

    fn call(name: &str, ty: ValueType, args: Vec<FormulaExpr>, offset: usize) -> FormulaExpr {
        FormulaExpr::call(name, ty, args, at(offset))
    }

    fn messages(result: &ValidationResult) -> Vec<(usize, String)> {
        result
            .semantic_errors()
            .iter()
            .map(|e| (e.position.offset, e.message.clone()))
            .collect()
    }

    #[test]
    fn test_leaves_are_valid() {
        let registry = FunctionRegistry::with_builtins();
        assert!(validate(&num(1.0, 0), &registry).is_success());
        assert!(validate(&text("a", 0), &registry).is_success());
        assert!(validate(&FormulaExpr::reference("A1", at(0)), &registry).is_success());
    }

    #[test]
    fn test_arity_message() {
        let registry = FunctionRegistry::with_builtins();
        let expr = call(
            "Add",
            ValueType::Number,
            vec![num(1.0, 5), num(1.0, 8), num(1.0, 11)],
            1,
        );
        assert_eq!(
            messages(&validate(&expr, &registry)),
            vec![(
                1,
                "Add function takes exactly 2 arguments. 3 received instead.".to_string()
            )]
        );

        let expr = call("Negate", ValueType::Number, vec![num(1.0, 1), num(2.0, 3)], 0);
        assert_eq!(
            messages(&validate(&expr, &registry)),
            vec![(
                0,
                "Negate function takes exactly 1 argument. 2 received instead.".to_string()
            )]
        );
    }

    #[test]
    fn test_arity_failure_suppresses_type_errors_of_same_call() {
        let registry = FunctionRegistry::with_builtins();
        let expr = call(
            "Add",
            ValueType::Number,
            vec![text("a", 5), text("b", 9), text("c", 13)],
            1,
        );
        let result = validate(&expr, &registry);
        assert_eq!(result.semantic_errors().len(), 1);
    }

    #[test]
    fn test_type_message_for_literal() {
        let registry = FunctionRegistry::with_builtins();
        let expr = call("Add", ValueType::Number, vec![num(1.0, 5), text("1", 8)], 1);
        assert_eq!(
            messages(&validate(&expr, &registry)),
            vec![(
                8,
                "Argument of type 'string' is not valid. Argument must be 'Either(number, reference)'."
                    .to_string()
            )]
        );
    }

    #[test]
    fn test_type_message_for_nested_call() {
        let registry = FunctionRegistry::with_builtins();
        let concat = call("CONCAT", ValueType::String, vec![num(1.0, 8)], 1);
        let expr = call("Negate", ValueType::Number, vec![concat], 0);
        assert_eq!(
            messages(&validate(&expr, &registry)),
            vec![(
                1,
                "Argument of type 'string' (returned from CONCAT) is not valid. Argument must be 'Either(number, reference)'."
                    .to_string()
            )]
        );
    }

    #[test]
    fn test_references_always_accepted() {
        let registry = FunctionRegistry::with_builtins();
        let expr = call(
            "Multiply",
            ValueType::Number,
            vec![
                FormulaExpr::reference("A1", at(1)),
                FormulaExpr::reference("B1", at(4)),
            ],
            6,
        );
        assert!(validate(&expr, &registry).is_success());
    }

    #[test]
    fn test_collects_errors_across_tree() {
        let registry = FunctionRegistry::with_builtins();
        // SUM(SUM(1,1,1), SUB("a", 1)) -> outer ok, inner arity, inner type
        let expr = call(
            "Add",
            ValueType::Number,
            vec![
                call(
                    "Add",
                    ValueType::Number,
                    vec![num(1.0, 9), num(1.0, 11), num(1.0, 13)],
                    5,
                ),
                call("Subtract", ValueType::Number, vec![text("a", 21), num(1.0, 26)], 17),
            ],
            1,
        );
        assert_eq!(
            messages(&validate(&expr, &registry)),
            vec![
                (
                    5,
                    "Add function takes exactly 2 arguments. 3 received instead.".to_string()
                ),
                (
                    21,
                    "Argument of type 'string' is not valid. Argument must be 'Either(number, reference)'."
                        .to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_failing_call_still_validates_arguments() {
        let registry = FunctionRegistry::with_builtins();
        let inner = call("Add", ValueType::Number, vec![num(1.0, 10)], 6);
        let expr = call("Add", ValueType::Number, vec![inner], 1);
        assert_eq!(
            messages(&validate(&expr, &registry)),
            vec![
                (
                    1,
                    "Add function takes exactly 2 arguments. 1 received instead.".to_string()
                ),
                (
                    6,
                    "Add function takes exactly 2 arguments. 1 received instead.".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_concat_accepts_anything() {
        let registry = FunctionRegistry::with_builtins();
        let expr = call(
            "CONCAT",
            ValueType::String,
            vec![num(1.0, 8), text("x", 11), FormulaExpr::reference("A1", at(16))],
            1,
        );
        assert!(validate(&expr, &registry).is_success());
    }

    #[test]
    fn test_unknown_operation() {
        let registry = FunctionRegistry::with_builtins();
        let expr = call("Nope", ValueType::Number, vec![], 1);
        assert_eq!(
            messages(&validate(&expr, &registry)),
            vec![(1, "Unknown function: Nope".to_string())]
        );
    }

    #[test]
    fn test_varargs_rule() {
        let rule = ArgTypes::new([is(ValueType::String)]).with_rest(is(ValueType::Number));
        let ok = FunctionCall {
            name: "F".into(),
            args: vec![text("a", 2), num(1.0, 6), FormulaExpr::reference("A1", at(9))],
            return_type: ValueType::String,
            position: at(0),
        };
        assert!(rule.validate(&ok).is_ok());

        let bad = FunctionCall {
            name: "F".into(),
            args: vec![text("a", 2), num(1.0, 6), text("b", 9), text("c", 13)],
            return_type: ValueType::String,
            position: at(0),
        };
        let errors = rule.validate(&bad).unwrap_err();
        assert_eq!(
            errors.iter().map(|e| e.position.offset).collect::<Vec<_>>(),
            vec![9, 13]
        );
    }

    #[test]
    fn test_either_names() {
        let t = either([is(ValueType::Number), is(ValueType::String)]);
        assert_eq!(t.to_string(), "Either(number, string)");
        assert!(t.accepts(ValueType::String));
        assert!(!t.accepts(ValueType::Reference));
        assert_eq!(
            t.or_reference().to_string(),
            "Either(Either(number, string), reference)"
        );
    }

    #[test]
    fn test_closure_validator() {
        let no_strings = |call: &FunctionCall| {
            if call.args.iter().any(|a| a.static_type() == ValueType::String) {
                Err(vec![SemanticError::new(call.position, "no strings")])
            } else {
                Ok(())
            }
        };
        let c = FunctionCall {
            name: "F".into(),
            args: vec![text("a", 2)],
            return_type: ValueType::Number,
            position: at(0),
        };
        assert_eq!(no_strings.validate(&c).unwrap_err()[0].message, "no strings");
    }

    #[test]
    fn test_validate_parsed_passes_syntax_failure() {
        let registry = FunctionRegistry::with_builtins();
        let err = SyntaxError::new(at(1), vec!["number".into()]);
        let result = validate_parsed(&Err(err.clone()), &registry);
        assert_eq!(result.syntax_error(), Some(&err));
        assert!(result.semantic_errors().is_empty());
    }
}
