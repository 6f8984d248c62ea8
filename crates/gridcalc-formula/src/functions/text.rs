//! Text functions
//!
//! Lengths and positions count characters, not bytes.

use super::{int_arg, opt_int_arg, ArgValue};
use crate::operators::to_text;
use gridcalc_core::{ErrorKind, Value};

fn text_arg(arg: &ArgValue) -> Result<String, ErrorKind> {
    to_text(&arg.scalar())
}

fn take_left(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn take_right(s: &str, n: usize) -> String {
    let len = s.chars().count();
    s.chars().skip(len.saturating_sub(n)).collect()
}

/// Count argument that must not be negative
fn count_arg(args: &[ArgValue], index: usize) -> Result<usize, ErrorKind> {
    let n = opt_int_arg(args, index, 1)?;
    usize::try_from(n).map_err(|_| ErrorKind::ValueError)
}

fn apply(result: Result<String, ErrorKind>) -> Value {
    match result {
        Ok(s) => Value::Text(s),
        Err(e) => Value::Error(e),
    }
}

/// CONCATENATE function
pub fn fn_concatenate(args: &[ArgValue]) -> Value {
    apply(args.iter().map(text_arg).collect::<Result<String, _>>())
}

/// LEFT function
pub fn fn_left(args: &[ArgValue]) -> Value {
    apply(text_arg(&args[0]).and_then(|s| Ok(take_left(&s, count_arg(args, 1)?))))
}

/// RIGHT function
pub fn fn_right(args: &[ArgValue]) -> Value {
    apply(text_arg(&args[0]).and_then(|s| Ok(take_right(&s, count_arg(args, 1)?))))
}

/// MID function: 1-based start, start past the end yields ""
pub fn fn_mid(args: &[ArgValue]) -> Value {
    let s = match text_arg(&args[0]) {
        Ok(s) => s,
        Err(e) => return Value::Error(e),
    };
    let start = match int_arg(&args[1]) {
        Ok(n) if n >= 1 => (n - 1) as usize,
        Ok(_) => return Value::Error(ErrorKind::ValueError),
        Err(e) => return Value::Error(e),
    };
    let len = match int_arg(&args[2]) {
        Ok(n) if n >= 0 => n as usize,
        Ok(_) => return Value::Error(ErrorKind::ValueError),
        Err(e) => return Value::Error(e),
    };

    Value::Text(s.chars().skip(start).take(len).collect())
}

/// LEN function
pub fn fn_len(args: &[ArgValue]) -> Value {
    match text_arg(&args[0]) {
        Ok(s) => Value::Number(s.chars().count() as f64),
        Err(e) => Value::Error(e),
    }
}

/// LOWER function
pub fn fn_lower(args: &[ArgValue]) -> Value {
    apply(text_arg(&args[0]).map(|s| s.to_lowercase()))
}

/// UPPER function
pub fn fn_upper(args: &[ArgValue]) -> Value {
    apply(text_arg(&args[0]).map(|s| s.to_uppercase()))
}

/// TRIM function: strips outer spaces and collapses inner runs to one
pub fn fn_trim(args: &[ArgValue]) -> Value {
    apply(text_arg(&args[0]).map(|s| {
        s.split(' ')
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }))
}
