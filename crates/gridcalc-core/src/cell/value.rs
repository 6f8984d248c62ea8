//! Cell value types

use std::fmt;

/// The typed value of a cell or of an evaluated expression
///
/// Every operator and function in the engine produces one of these five
/// variants. Numbers are always finite.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// Numeric value (all numbers stored as f64)
    Number(f64),

    /// Text value
    Text(String),

    /// Boolean value (TRUE/FALSE)
    Boolean(bool),

    /// Error value (#VALUE!, #REF!, etc.)
    Error(ErrorKind),

    /// Unset cell
    #[default]
    Empty,
}

impl Value {
    /// Create a new text value
    pub fn text<S: Into<String>>(s: S) -> Self {
        Value::Text(s.into())
    }

    /// Check if the value is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Check if the value is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Get the error if this is one
    pub fn as_error(&self) -> Option<ErrorKind> {
        match self {
            Value::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Get the number if this is one (no coercion)
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Name of the variant, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Boolean(_) => "boolean",
            Value::Error(_) => "error",
            Value::Empty => "empty",
        }
    }

    /// Same variant and same payload, with numbers compared bit for bit
    ///
    /// This is the equality used to decide whether a recomputed cell
    /// changed.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

/// Format a number the way the `&` operator and text functions see it
///
/// Integral values print without a fractional part; everything else uses
/// the shortest representation that round-trips.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(s) => f.write_str(s),
            Value::Boolean(true) => f.write_str("TRUE"),
            Value::Boolean(false) => f.write_str("FALSE"),
            Value::Error(e) => f.write_str(e.as_str()),
            Value::Empty => Ok(()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<ErrorKind> for Value {
    fn from(e: ErrorKind) -> Self {
        Value::Error(e)
    }
}

/// Excel-style error values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// #DIV/0! - Division by zero
    DivByZero,
    /// #REF! - Invalid cell reference or index out of bounds
    RefError,
    /// #NAME? - Unrecognized function name
    NameError,
    /// #VALUE! - Wrong type of argument or operand
    ValueError,
    /// #N/A - Value not available
    NotAvailable,
    /// #CIRCULAR! - Cell takes part in a reference cycle
    CircularRef,
}

impl ErrorKind {
    /// Get the display string for this error
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DivByZero => "#DIV/0!",
            ErrorKind::RefError => "#REF!",
            ErrorKind::NameError => "#NAME?",
            ErrorKind::ValueError => "#VALUE!",
            ErrorKind::NotAvailable => "#N/A",
            ErrorKind::CircularRef => "#CIRCULAR!",
        }
    }

    /// Parse an error string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "#DIV/0!" => Some(ErrorKind::DivByZero),
            "#REF!" => Some(ErrorKind::RefError),
            "#NAME?" => Some(ErrorKind::NameError),
            "#VALUE!" => Some(ErrorKind::ValueError),
            "#N/A" => Some(ErrorKind::NotAvailable),
            "#CIRCULAR!" => Some(ErrorKind::CircularRef),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
