//! Formula Abstract Syntax Tree types

use crate::position::Position;
use std::fmt;

/// Static type tags used by semantic validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ValueType {
    Number,
    String,
    /// External reference; its real type is only known at evaluation time
    Reference,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Reference => "reference",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Formula expression AST
///
/// Trees are built bottom-up by the parser and never mutated afterwards.
/// Operator chains produce trees as deep as the chain is long, so cloning,
/// comparing, formatting and dropping walk the tree with an explicit stack.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "camelCase"))]
pub enum FormulaExpr {
    /// Numeric literal
    Number { value: f64, position: Position },
    /// String literal
    String { value: String, position: Position },
    /// Reference to an externally supplied value (e.g. a cell id)
    Reference { id: String, position: Position },
    /// Function or operator application
    FunctionCall(FunctionCall),
}

/// Application of a registered function or operator.
///
/// `name` is the operation name (`Add` for both `+` and `SUM`). Argument
/// count and types are only checked by validation.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<FormulaExpr>,
    pub return_type: ValueType,
    pub position: Position,
}

impl FunctionCall {
    /// Copy of this call's header over new arguments
    fn with_args(&self, args: Vec<FormulaExpr>) -> FunctionCall {
        FunctionCall {
            name: self.name.clone(),
            args,
            return_type: self.return_type,
            position: self.position,
        }
    }
}

/// Step of a non-recursive post-order walk
enum Step<'a> {
    Enter(&'a FormulaExpr),
    Exit(&'a FunctionCall),
}

impl FormulaExpr {
    pub fn number(value: f64, position: Position) -> Self {
        FormulaExpr::Number { value, position }
    }

    pub fn string(value: impl Into<String>, position: Position) -> Self {
        FormulaExpr::String {
            value: value.into(),
            position,
        }
    }

    pub fn reference(id: impl Into<String>, position: Position) -> Self {
        FormulaExpr::Reference {
            id: id.into(),
            position,
        }
    }

    pub fn call(
        name: impl Into<String>,
        return_type: ValueType,
        args: Vec<FormulaExpr>,
        position: Position,
    ) -> Self {
        FormulaExpr::FunctionCall(FunctionCall {
            name: name.into(),
            args,
            return_type,
            position,
        })
    }

    pub fn position(&self) -> Position {
        match self {
            FormulaExpr::Number { position, .. }
            | FormulaExpr::String { position, .. }
            | FormulaExpr::Reference { position, .. } => *position,
            FormulaExpr::FunctionCall(call) => call.position,
        }
    }

    /// The type validation sees for this node: the literal type for values,
    /// the declared return type for calls.
    pub fn static_type(&self) -> ValueType {
        match self {
            FormulaExpr::Number { .. } => ValueType::Number,
            FormulaExpr::String { .. } => ValueType::String,
            FormulaExpr::Reference { .. } => ValueType::Reference,
            FormulaExpr::FunctionCall(call) => call.return_type,
        }
    }

    pub fn as_call(&self) -> Option<&FunctionCall> {
        match self {
            FormulaExpr::FunctionCall(call) => Some(call),
            _ => None,
        }
    }

    /// Compare two trees ignoring positions
    pub fn same_shape(&self, other: &FormulaExpr) -> bool {
        self.matches(other, false)
    }

    /// Node-by-node comparison. NaN literals are equal to each other only
    /// when positions are ignored.
    fn matches(&self, other: &FormulaExpr, with_positions: bool) -> bool {
        let mut pending = vec![(self, other)];
        while let Some(pair) = pending.pop() {
            let same = match pair {
                (
                    FormulaExpr::Number { value: a, position: pa },
                    FormulaExpr::Number { value: b, position: pb },
                ) => {
                    if with_positions {
                        a == b && pa == pb
                    } else {
                        a == b || (a.is_nan() && b.is_nan())
                    }
                }
                (
                    FormulaExpr::String { value: a, position: pa },
                    FormulaExpr::String { value: b, position: pb },
                )
                | (
                    FormulaExpr::Reference { id: a, position: pa },
                    FormulaExpr::Reference { id: b, position: pb },
                ) => a == b && (!with_positions || pa == pb),
                (FormulaExpr::FunctionCall(a), FormulaExpr::FunctionCall(b)) => {
                    let same_header = a.name == b.name
                        && a.return_type == b.return_type
                        && a.args.len() == b.args.len()
                        && (!with_positions || a.position == b.position);
                    if same_header {
                        pending.extend(a.args.iter().zip(&b.args));
                    }
                    same_header
                }
                _ => false,
            };
            if !same {
                return false;
            }
        }
        true
    }

    /// Copy of a single node. Calls come back without their arguments.
    fn clone_node(&self) -> FormulaExpr {
        match self {
            FormulaExpr::Number { value, position } => FormulaExpr::number(*value, *position),
            FormulaExpr::String { value, position } => FormulaExpr::string(value.as_str(), *position),
            FormulaExpr::Reference { id, position } => FormulaExpr::reference(id.as_str(), *position),
            FormulaExpr::FunctionCall(call) => FormulaExpr::FunctionCall(call.with_args(Vec::new())),
        }
    }
}

impl Clone for FormulaExpr {
    fn clone(&self) -> Self {
        let FormulaExpr::FunctionCall(root) = self else {
            return self.clone_node();
        };
        let mut steps: Vec<Step<'_>> = root.args.iter().rev().map(Step::Enter).collect();
        let mut built: Vec<FormulaExpr> = Vec::new();
        while let Some(step) = steps.pop() {
            match step {
                Step::Enter(FormulaExpr::FunctionCall(call)) => {
                    steps.push(Step::Exit(call));
                    steps.extend(call.args.iter().rev().map(Step::Enter));
                }
                Step::Enter(leaf) => built.push(leaf.clone_node()),
                Step::Exit(call) => {
                    let args = built.split_off(built.len().saturating_sub(call.args.len()));
                    built.push(FormulaExpr::FunctionCall(call.with_args(args)));
                }
            }
        }
        FormulaExpr::FunctionCall(root.with_args(built))
    }
}

impl PartialEq for FormulaExpr {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other, true)
    }
}

impl Clone for FunctionCall {
    fn clone(&self) -> Self {
        self.with_args(self.args.clone())
    }
}

impl PartialEq for FunctionCall {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.return_type == other.return_type
            && self.position == other.position
            && self.args == other.args
    }
}

impl Drop for FunctionCall {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.args);
        while let Some(expr) = pending.pop() {
            if let FormulaExpr::FunctionCall(mut call) = expr {
                pending.append(&mut call.args);
            }
        }
    }
}

/// Compact rendering without positions, e.g. `Add(Number(1), Reference(A1))`
impl fmt::Display for FormulaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        enum Piece<'a> {
            Node(&'a FormulaExpr),
            Text(&'static str),
        }

        let mut pending = vec![Piece::Node(self)];
        while let Some(piece) = pending.pop() {
            match piece {
                Piece::Text(text) => f.write_str(text)?,
                Piece::Node(FormulaExpr::Number { value, .. }) => write!(f, "Number({value})")?,
                Piece::Node(FormulaExpr::String { value, .. }) => write!(f, "String({value:?})")?,
                Piece::Node(FormulaExpr::Reference { id, .. }) => write!(f, "Reference({id})")?,
                Piece::Node(FormulaExpr::FunctionCall(call)) => {
                    write!(f, "{}(", call.name)?;
                    pending.push(Piece::Text(")"));
                    for (i, arg) in call.args.iter().enumerate().rev() {
                        pending.push(Piece::Node(arg));
                        if i > 0 {
                            pending.push(Piece::Text(", "));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            arg.fmt(f)?;
        }
        f.write_str(")")
    }
}
