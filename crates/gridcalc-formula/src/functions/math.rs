//! Math and aggregate functions

use super::{opt_int_arg, or_error, ArgValue};
use crate::operators::{number_result, parse_numeric_text, to_number};
use gridcalc_core::{ErrorKind, Value};

/// Numbers an aggregate sees, in argument order
///
/// Literal arguments are coerced like arithmetic, except that text which is
/// not a number is skipped. Inside ranges only numbers count. The first
/// error found is returned instead.
fn collect_numbers(args: &[ArgValue]) -> Result<Vec<f64>, ErrorKind> {
    let mut numbers = Vec::new();

    for arg in args {
        match arg {
            ArgValue::Scalar(value) => match value {
                Value::Number(n) => numbers.push(*n),
                Value::Boolean(b) => numbers.push(if *b { 1.0 } else { 0.0 }),
                Value::Text(s) => numbers.extend(parse_numeric_text(s)),
                Value::Error(e) => return Err(*e),
                Value::Empty => {}
            },
            ArgValue::Range(range) => {
                for value in range.values() {
                    match value {
                        Value::Number(n) => numbers.push(*n),
                        Value::Error(e) => return Err(*e),
                        _ => {}
                    }
                }
            }
        }
    }

    Ok(numbers)
}

/// SUM function
pub fn fn_sum(args: &[ArgValue]) -> Value {
    match collect_numbers(args) {
        Ok(numbers) => number_result(numbers.iter().sum()),
        Err(e) => Value::Error(e),
    }
}

/// AVERAGE function
pub fn fn_average(args: &[ArgValue]) -> Value {
    match collect_numbers(args) {
        Ok(numbers) if numbers.is_empty() => Value::Error(ErrorKind::DivByZero),
        Ok(numbers) => number_result(numbers.iter().sum::<f64>() / numbers.len() as f64),
        Err(e) => Value::Error(e),
    }
}

/// COUNT function
pub fn fn_count(args: &[ArgValue]) -> Value {
    match collect_numbers(args) {
        Ok(numbers) => Value::Number(numbers.len() as f64),
        Err(e) => Value::Error(e),
    }
}

/// COUNTA function: non-empty values, errors included
pub fn fn_counta(args: &[ArgValue]) -> Value {
    let count = args
        .iter()
        .map(|arg| match arg {
            ArgValue::Scalar(v) => usize::from(!v.is_empty()),
            ArgValue::Range(r) => r.values().iter().filter(|v| !v.is_empty()).count(),
        })
        .sum::<usize>();
    Value::Number(count as f64)
}

/// MIN function
pub fn fn_min(args: &[ArgValue]) -> Value {
    match collect_numbers(args) {
        Ok(numbers) => Value::Number(numbers.into_iter().reduce(f64::min).unwrap_or(0.0)),
        Err(e) => Value::Error(e),
    }
}

/// MAX function
pub fn fn_max(args: &[ArgValue]) -> Value {
    match collect_numbers(args) {
        Ok(numbers) => Value::Number(numbers.into_iter().reduce(f64::max).unwrap_or(0.0)),
        Err(e) => Value::Error(e),
    }
}

/// ABS function
pub fn fn_abs(args: &[ArgValue]) -> Value {
    or_error(to_number(&args[0].scalar()).map(|n| number_result(n.abs())))
}

/// ROUND function: half away from zero, negative digits round left of the point
pub fn fn_round(args: &[ArgValue]) -> Value {
    let n = match to_number(&args[0].scalar()) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    let digits = match opt_int_arg(args, 1, 0) {
        Ok(d) => d.clamp(-308, 308) as i32,
        Err(e) => return Value::Error(e),
    };

    let factor = 10f64.powi(digits.abs());
    let rounded = if digits >= 0 {
        (n * factor).round() / factor
    } else {
        (n / factor).round() * factor
    };

    // Scaling can overflow for large inputs that need no rounding
    if rounded.is_finite() {
        number_result(rounded)
    } else {
        number_result(n)
    }
}
