//! Function registry and built-in functions

pub mod math;
pub mod text;

use crate::ast::{FormulaExpr, FunctionCall, ValueType};
use crate::error::{RegistryError, ValueResult};
use crate::evaluator::FormulaValue;
use crate::position::Position;
use crate::validator::{is, ArgCount, ArgTypes, ArgValidator};
use ahash::AHashMap;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Function implementation signature
///
/// Receives the call being evaluated (for its name and position) and the
/// already resolved argument values, in order.
pub type FunctionImpl = fn(&FunctionCall, &[FormulaValue]) -> ValueResult<FormulaValue>;

/// Builds the call node for a parsed `NAME(args...)` or operator application
pub type FunctionBuilder = fn(&FunctionDef, Position, Vec<FormulaExpr>) -> FunctionCall;

/// Function definition
pub struct FunctionDef {
    /// Operation name recorded on call nodes and used in messages
    pub name: Cow<'static, str>,
    /// Static return type seen by validation
    pub return_type: ValueType,
    /// Validation steps, run in order until the first failure
    pub validators: Vec<Box<dyn ArgValidator>>,
    /// Implementation
    pub implementation: FunctionImpl,
    builder: FunctionBuilder,
}

impl FunctionDef {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        return_type: ValueType,
        implementation: FunctionImpl,
    ) -> Self {
        Self {
            name: name.into(),
            return_type,
            validators: Vec::new(),
            implementation,
            builder: default_builder,
        }
    }

    /// Append a validation step
    pub fn with_validator(mut self, validator: impl ArgValidator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Replace the node builder
    pub fn with_builder(mut self, builder: FunctionBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Construct the call node for this function
    pub fn build(&self, position: Position, args: Vec<FormulaExpr>) -> FunctionCall {
        (self.builder)(self, position, args)
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("return_type", &self.return_type)
            .field("validators", &self.validators.len())
            .finish()
    }
}

fn default_builder(def: &FunctionDef, position: Position, args: Vec<FormulaExpr>) -> FunctionCall {
    FunctionCall {
        name: def.name.to_string(),
        args,
        return_type: def.return_type,
        position,
    }
}

/// Function registry
///
/// Populated once at startup; sealed as soon as a grammar is built from it.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    /// Surface name -> definition
    functions: AHashMap<String, Arc<FunctionDef>>,
    /// Operation name -> definition
    operations: AHashMap<String, Arc<FunctionDef>>,
    sealed: bool,
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in functions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (names, def) in builtins() {
            let def = Arc::new(def);
            for name in names {
                debug_assert!(!registry.functions.contains_key(*name));
                registry.functions.insert((*name).to_string(), Arc::clone(&def));
            }
            registry.operations.insert(def.name.to_string(), def);
        }
        registry
    }

    /// Register a function under `name`
    pub fn register(&mut self, name: impl Into<String>, def: FunctionDef) -> Result<(), RegistryError> {
        let name = name.into();
        self.check_open(&name)?;
        if self.functions.contains_key(&name) {
            return Err(RegistryError::DuplicateFunction(name));
        }
        if self.operations.contains_key(&*def.name) {
            return Err(RegistryError::ConflictingOperation(def.name.to_string()));
        }

        tracing::debug!(function = %name, operation = %def.name, "registering function");
        let def = Arc::new(def);
        self.operations.insert(def.name.to_string(), Arc::clone(&def));
        self.functions.insert(name, def);
        Ok(())
    }

    /// Bind another name to an already registered function
    pub fn register_alias(
        &mut self,
        alias: impl Into<String>,
        existing: &str,
    ) -> Result<(), RegistryError> {
        let alias = alias.into();
        self.check_open(&alias)?;
        if self.functions.contains_key(&alias) {
            return Err(RegistryError::DuplicateFunction(alias));
        }
        let def = self
            .functions
            .get(existing)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownFunction(existing.to_string()))?;

        tracing::debug!(alias = %alias, function = existing, "registering alias");
        self.functions.insert(alias, def);
        Ok(())
    }

    /// Register several functions, stopping at the first failure
    pub fn register_bulk<N, I>(&mut self, defs: I) -> Result<(), RegistryError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, FunctionDef)>,
    {
        for (name, def) in defs {
            self.register(name, def)?;
        }
        Ok(())
    }

    /// Look up a function by the name used in formula text
    pub fn get(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        self.functions.get(name)
    }

    /// Look up a function by operation name (as recorded on call nodes)
    pub fn operation(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        self.operations.get(name)
    }

    /// All registered names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Freeze the registry; further registration fails
    pub fn seal(&mut self) {
        if !self.sealed {
            tracing::debug!(functions = self.functions.len(), "sealing function registry");
            self.sealed = true;
        }
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&str, &Arc<FunctionDef>)> {
        self.functions.iter().map(|(name, def)| (name.as_str(), def))
    }

    fn check_open(&self, name: &str) -> Result<(), RegistryError> {
        if self.sealed {
            return Err(RegistryError::Sealed(name.to_string()));
        }
        Ok(())
    }
}

fn numeric_binary(name: &'static str, implementation: FunctionImpl) -> FunctionDef {
    FunctionDef::new(name, ValueType::Number, implementation)
        .with_validator(ArgCount::exactly(2))
        .with_validator(ArgTypes::new([is(ValueType::Number), is(ValueType::Number)]))
}

fn numeric_unary(name: &'static str, implementation: FunctionImpl) -> FunctionDef {
    FunctionDef::new(name, ValueType::Number, implementation)
        .with_validator(ArgCount::exactly(1))
        .with_validator(ArgTypes::new([is(ValueType::Number)]))
}

/// Built-in definitions with every surface name they answer to
fn builtins() -> Vec<(&'static [&'static str], FunctionDef)> {
    vec![
        (&["Add", "SUM"][..], numeric_binary("Add", math::fn_add)),
        (&["Subtract", "SUB"][..], numeric_binary("Subtract", math::fn_subtract)),
        (&["Multiply"][..], numeric_binary("Multiply", math::fn_multiply)),
        (&["Divide"][..], numeric_binary("Divide", math::fn_divide)),
        (
            &["Exponentiate"][..],
            numeric_binary("Exponentiate", math::fn_exponentiate),
        ),
        (&["Factorial"][..], numeric_unary("Factorial", math::fn_factorial)),
        (&["Negate", "NEGATE"][..], numeric_unary("Negate", math::fn_negate)),
        (
            &["CONCAT"][..],
            FunctionDef::new("CONCAT", ValueType::String, text::fn_concat),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fn_first(_call: &FunctionCall, args: &[FormulaValue]) -> ValueResult<FormulaValue> {
        Ok(args.first().cloned().unwrap_or(FormulaValue::Undefined))
    }

    #[test]
    fn test_builtins_registered() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(
            registry.list(),
            vec![
                "Add",
                "CONCAT",
                "Divide",
                "Exponentiate",
                "Factorial",
                "Multiply",
                "NEGATE",
                "Negate",
                "SUB",
                "SUM",
                "Subtract",
            ]
        );
        assert!(!registry.is_sealed());
    }

    #[test]
    fn test_aliases_share_definition() {
        let registry = FunctionRegistry::with_builtins();
        let sum = registry.get("SUM").unwrap();
        let add = registry.get("Add").unwrap();
        assert!(Arc::ptr_eq(sum, add));
        assert_eq!(sum.name, "Add");
        assert!(Arc::ptr_eq(registry.operation("Add").unwrap(), add));
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut registry = FunctionRegistry::with_builtins();
        let err = registry
            .register("SUM", FunctionDef::new("MySum", ValueType::Number, fn_first))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateFunction("SUM".into()));
    }

    #[test]
    fn test_register_conflicting_operation_fails() {
        let mut registry = FunctionRegistry::with_builtins();
        let err = registry
            .register("PLUS", FunctionDef::new("Add", ValueType::Number, fn_first))
            .unwrap_err();
        assert_eq!(err, RegistryError::ConflictingOperation("Add".into()));
    }

    #[test]
    fn test_register_after_seal_fails() {
        let mut registry = FunctionRegistry::with_builtins();
        registry.seal();
        let err = registry
            .register("FIRST", FunctionDef::new("First", ValueType::String, fn_first))
            .unwrap_err();
        assert_eq!(err, RegistryError::Sealed("FIRST".into()));
        assert_eq!(
            registry.register_alias("PLUS", "Add").unwrap_err(),
            RegistryError::Sealed("PLUS".into())
        );
        assert!(registry.get("FIRST").is_none());
    }

    #[test]
    fn test_register_alias() {
        let mut registry = FunctionRegistry::with_builtins();
        registry.register_alias("PLUS", "SUM").unwrap();
        assert!(Arc::ptr_eq(
            registry.get("PLUS").unwrap(),
            registry.get("Add").unwrap()
        ));
        assert_eq!(
            registry.register_alias("MINUS", "NOPE").unwrap_err(),
            RegistryError::UnknownFunction("NOPE".into())
        );
    }

    #[test]
    fn test_register_bulk() {
        let mut registry = FunctionRegistry::new();
        registry
            .register_bulk([
                ("FIRST", FunctionDef::new("First", ValueType::String, fn_first)),
                ("HEAD", FunctionDef::new("Head", ValueType::String, fn_first)),
            ])
            .unwrap();
        assert_eq!(registry.list(), vec!["FIRST", "HEAD"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_runtime_names() {
        let mut registry = FunctionRegistry::with_builtins();
        for column in ["Price", "Qty"] {
            let operation = format!("Lookup{column}");
            registry
                .register(
                    column.to_uppercase(),
                    FunctionDef::new(operation, ValueType::Number, fn_first),
                )
                .unwrap();
        }

        let def = registry.get("QTY").unwrap();
        assert_eq!(def.name, "LookupQty");
        assert!(Arc::ptr_eq(registry.operation("LookupQty").unwrap(), def));

        let call = def.build(Position::start(), vec![]);
        assert_eq!(call.name, "LookupQty");

        let err = registry
            .register(
                "PRICE2",
                FunctionDef::new(String::from("LookupPrice"), ValueType::Number, fn_first),
            )
            .unwrap_err();
        assert_eq!(err, RegistryError::ConflictingOperation("LookupPrice".into()));
    }

    #[test]
    fn test_default_builder() {
        let registry = FunctionRegistry::with_builtins();
        let def = registry.get("SUB").unwrap();
        let pos = Position::new(1, 1, 2);
        let call = def.build(pos, vec![FormulaExpr::number(1.0, pos)]);
        assert_eq!(call.name, "Subtract");
        assert_eq!(call.return_type, ValueType::Number);
        assert_eq!(call.args.len(), 1);
        assert_eq!(call.position, pos);
    }
}
