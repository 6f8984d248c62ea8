//! Formula error types
//!
//! These are parse-time failures. Problems found while evaluating are
//! ordinary [`Value::Error`](gridcalc_core::Value::Error) results instead.

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur while tokenizing, parsing or registering functions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    /// Character sequence that is not a token
    #[error("Lex error at position {position}: {message}")]
    Lex { position: usize, message: String },

    /// Token sequence that does not match the grammar
    #[error("Syntax error at position {position}: expected {expected}")]
    Syntax { position: usize, expected: String },

    /// Parentheses, unary operators or calls nested beyond the limit
    #[error("Formula nested too deeply at position {position} (limit: {limit})")]
    NestingTooDeep { position: usize, limit: usize },

    /// Custom function name that is not a valid identifier
    #[error("Invalid function name: {0}")]
    InvalidFunctionName(String),

    /// Custom function name that shadows a built-in
    #[error("Function {0} is built in and cannot be replaced")]
    BuiltinConflict(String),

    /// Invalid cell address or range outside a formula
    #[error(transparent)]
    Address(#[from] gridcalc_core::Error),
}

impl FormulaError {
    pub(crate) fn lex(position: usize, message: impl Into<String>) -> Self {
        FormulaError::Lex {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn syntax(position: usize, expected: impl Into<String>) -> Self {
        FormulaError::Syntax {
            position,
            expected: expected.into(),
        }
    }

    /// Byte offset into the formula text, for parse errors
    pub fn position(&self) -> Option<usize> {
        match self {
            FormulaError::Lex { position, .. }
            | FormulaError::Syntax { position, .. }
            | FormulaError::NestingTooDeep { position, .. } => Some(*position),
            FormulaError::InvalidFunctionName(_)
            | FormulaError::BuiltinConflict(_)
            | FormulaError::Address(_) => None,
        }
    }
}
