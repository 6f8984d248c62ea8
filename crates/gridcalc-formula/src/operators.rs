//! Value coercion and operator semantics
//!
//! Shared by the evaluator and the function library so that `1+"2"`,
//! `SUM("2")` and `IF("1", ...)` all agree on what counts as a number.

use crate::ast::{BinaryOperator, UnaryOperator};
use gridcalc_core::{ErrorKind, Value};
use lazy_regex::regex_is_match;
use std::cmp::Ordering;

/// Parse text that is a plain decimal number, ignoring surrounding whitespace
///
/// Accepts `[+-]digits[.digits][e[+-]digits]` and `.digits`; anything else
/// (including `inf`, `nan`, hex or thousands separators) is rejected.
pub fn parse_numeric_text(text: &str) -> Option<f64> {
    let text = text.trim();
    if !regex_is_match!(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$", text) {
        return None;
    }
    text.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Coerce a value to a number for arithmetic
pub fn to_number(value: &Value) -> Result<f64, ErrorKind> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Empty => Ok(0.0),
        Value::Text(s) => parse_numeric_text(s).ok_or(ErrorKind::ValueError),
        Value::Error(e) => Err(*e),
    }
}

/// Coerce a value to text for `&` and text functions
pub fn to_text(value: &Value) -> Result<String, ErrorKind> {
    match value {
        Value::Error(e) => Err(*e),
        other => Ok(other.to_string()),
    }
}

/// Coerce a value to a boolean for conditions
pub fn to_bool(value: &Value) -> Result<bool, ErrorKind> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Number(n) => Ok(*n != 0.0),
        Value::Empty => Ok(false),
        Value::Text(s) => {
            if s.trim().eq_ignore_ascii_case("TRUE") {
                Ok(true)
            } else if s.trim().eq_ignore_ascii_case("FALSE") {
                Ok(false)
            } else {
                parse_numeric_text(s)
                    .map(|n| n != 0.0)
                    .ok_or(ErrorKind::ValueError)
            }
        }
        Value::Error(e) => Err(*e),
    }
}

/// Wrap an arithmetic result, turning non-finite numbers into errors
pub fn number_result(n: f64) -> Value {
    if !n.is_finite() {
        Value::Error(ErrorKind::ValueError)
    } else if n == 0.0 {
        // Normalize -0
        Value::Number(0.0)
    } else {
        Value::Number(n)
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) | Value::Empty | Value::Error(_) => 0,
        Value::Text(_) => 1,
        Value::Boolean(_) => 2,
    }
}

/// The "zero" of another value's type, used when comparing against Empty
fn empty_as(other: &Value) -> Value {
    match other {
        Value::Text(_) => Value::Text(String::new()),
        Value::Boolean(_) => Value::Boolean(false),
        _ => Value::Number(0.0),
    }
}

/// Total order used by comparison operators and lookups
///
/// Numbers sort before text, text before booleans; text compares
/// case-insensitively. `Empty` compares as the zero value of the other
/// operand's type. Callers deal with errors before comparing.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Empty, Value::Empty) => Ordering::Equal,
        (Value::Empty, other) => compare_values(&empty_as(other), other),
        (other, Value::Empty) => compare_values(other, &empty_as(other)),
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::Text(a), Value::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

/// Check if two values share a type, treating Empty as matching anything
pub fn same_type(left: &Value, right: &Value) -> bool {
    type_rank(left) == type_rank(right)
        || matches!(left, Value::Empty)
        || matches!(right, Value::Empty)
}

/// Apply a binary operator to two evaluated operands
///
/// An error operand wins before any coercion, the left one first.
pub fn apply_binary(op: BinaryOperator, left: &Value, right: &Value) -> Value {
    if let Value::Error(e) = left {
        return Value::Error(*e);
    }
    if let Value::Error(e) = right {
        return Value::Error(*e);
    }

    match op {
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Power => arithmetic(op, left, right),

        BinaryOperator::Concat => match (to_text(left), to_text(right)) {
            (Ok(l), Ok(r)) => Value::Text(l + &r),
            (Err(e), _) | (_, Err(e)) => Value::Error(e),
        },

        BinaryOperator::Equal
        | BinaryOperator::NotEqual
        | BinaryOperator::LessThan
        | BinaryOperator::LessEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterEqual => {
            let ord = compare_values(left, right);
            Value::Boolean(match op {
                BinaryOperator::Equal => ord == Ordering::Equal,
                BinaryOperator::NotEqual => ord != Ordering::Equal,
                BinaryOperator::LessThan => ord == Ordering::Less,
                BinaryOperator::LessEqual => ord != Ordering::Greater,
                BinaryOperator::GreaterThan => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            })
        }
    }
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> Value {
    let (l, r) = match (to_number(left), to_number(right)) {
        (Ok(l), Ok(r)) => (l, r),
        (Err(e), _) | (_, Err(e)) => return Value::Error(e),
    };

    match op {
        BinaryOperator::Add => number_result(l + r),
        BinaryOperator::Subtract => number_result(l - r),
        BinaryOperator::Multiply => number_result(l * r),
        BinaryOperator::Divide => {
            if r == 0.0 {
                Value::Error(ErrorKind::DivByZero)
            } else {
                number_result(l / r)
            }
        }
        BinaryOperator::Power => {
            if l == 0.0 && r < 0.0 {
                Value::Error(ErrorKind::DivByZero)
            } else {
                number_result(l.powf(r))
            }
        }
        _ => Value::Error(ErrorKind::ValueError),
    }
}

/// Apply a unary operator to an evaluated operand
pub fn apply_unary(op: UnaryOperator, operand: &Value) -> Value {
    match to_number(operand) {
        Ok(n) => match op {
            UnaryOperator::Negate => number_result(-n),
            UnaryOperator::Plus => number_result(n),
        },
        Err(e) => Value::Error(e),
    }
}
