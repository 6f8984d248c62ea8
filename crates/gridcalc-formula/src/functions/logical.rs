//! Logical functions
//!
//! `IF` and `IFERROR` are lazy: they evaluate only the argument they end up
//! returning, so `IF(TRUE, 1, 1/0)` never divides by zero.

use super::{or_error, ArgValue};
use crate::ast::Expr;
use crate::evaluator::Evaluator;
use crate::operators::to_bool;
use gridcalc_core::{ErrorKind, Value};

/// IF function
pub fn fn_if(args: &[Expr], ev: &mut Evaluator<'_>) -> Value {
    let condition = match to_bool(&ev.evaluate(&args[0])) {
        Ok(b) => b,
        Err(e) => return Value::Error(e),
    };

    if condition {
        ev.evaluate(&args[1])
    } else {
        match args.get(2) {
            Some(branch) => ev.evaluate(branch),
            None => Value::Boolean(false),
        }
    }
}

/// IFERROR function
pub fn fn_iferror(args: &[Expr], ev: &mut Evaluator<'_>) -> Value {
    match ev.evaluate(&args[0]) {
        Value::Error(_) => ev.evaluate(&args[1]),
        value => value,
    }
}

/// Booleans an AND/OR sees; text and blanks inside ranges are skipped
fn collect_bools(args: &[ArgValue]) -> Result<Vec<bool>, ErrorKind> {
    let mut bools = Vec::new();

    for arg in args {
        match arg {
            ArgValue::Scalar(value) => bools.push(to_bool(value)?),
            ArgValue::Range(range) => {
                for value in range.values() {
                    match value {
                        Value::Boolean(b) => bools.push(*b),
                        Value::Number(n) => bools.push(*n != 0.0),
                        Value::Error(e) => return Err(*e),
                        Value::Text(_) | Value::Empty => {}
                    }
                }
            }
        }
    }

    if bools.is_empty() {
        return Err(ErrorKind::ValueError);
    }
    Ok(bools)
}

/// AND function
pub fn fn_and(args: &[ArgValue]) -> Value {
    or_error(collect_bools(args).map(|b| Value::Boolean(b.iter().all(|&x| x))))
}

/// OR function
pub fn fn_or(args: &[ArgValue]) -> Value {
    or_error(collect_bools(args).map(|b| Value::Boolean(b.iter().any(|&x| x))))
}

/// NOT function
pub fn fn_not(args: &[ArgValue]) -> Value {
    or_error(to_bool(&args[0].scalar()).map(|b| Value::Boolean(!b)))
}
