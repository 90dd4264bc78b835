//! Formula error types
//!
//! Syntax, semantic and evaluation failures are separate types and are
//! never folded into one another.

use crate::position::Position;
use std::fmt;
use thiserror::Error;

/// Result of resolving a value during evaluation
pub type ValueResult<T> = std::result::Result<T, EvaluationError>;

/// Malformed formula text. Only the first (furthest) failure is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("Syntax error at {position}: expected {}", ExpectedList(.expected))]
pub struct SyntaxError {
    /// Furthest point the parser could not get past
    pub position: Position,
    /// Descriptions of what would have been accepted there, sorted
    pub expected: Vec<String>,
}

impl SyntaxError {
    pub fn new(position: Position, expected: Vec<String>) -> Self {
        Self { position, expected }
    }

    pub fn offset(&self) -> usize {
        self.position.offset
    }
}

struct ExpectedList<'a>(&'a [String]);

impl fmt::Display for ExpectedList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            [] => write!(f, "nothing"),
            [only] => write!(f, "{only}"),
            many => write!(f, "one of {}", many.join(", ")),
        }
    }
}

/// A well-formed tree that breaks a function's contract
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("{message} (at {position})")]
pub struct SemanticError {
    pub position: Position,
    pub message: String,
}

impl SemanticError {
    pub fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// A value-domain failure only discoverable while evaluating
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("{message}")]
pub struct EvaluationError {
    /// The function call that failed
    pub position: Position,
    pub message: String,
}

impl EvaluationError {
    pub fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Misuse of the function registry during startup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The name is already bound to a function
    #[error("Function already registered: {0}")]
    DuplicateFunction(String),

    /// Alias target does not exist
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// A different definition already uses this operation name
    #[error("Operation {0} is already defined by another function")]
    ConflictingOperation(String),

    /// A grammar has been built from the registry
    #[error("Function registry is sealed; cannot register {0}")]
    Sealed(String),
}
