//! Information functions

use super::ArgValue;
use gridcalc_core::{ErrorKind, Value};

/// NA function
pub fn fn_na(_args: &[ArgValue]) -> Value {
    Value::Error(ErrorKind::NotAvailable)
}

/// ISERROR function
pub fn fn_iserror(args: &[ArgValue]) -> Value {
    Value::Boolean(args[0].scalar().is_error())
}

/// ISNA function
pub fn fn_isna(args: &[ArgValue]) -> Value {
    Value::Boolean(args[0].scalar() == Value::Error(ErrorKind::NotAvailable))
}

/// ISBLANK function
pub fn fn_isblank(args: &[ArgValue]) -> Value {
    Value::Boolean(args[0].scalar().is_empty())
}

/// ISNUMBER function
pub fn fn_isnumber(args: &[ArgValue]) -> Value {
    Value::Boolean(matches!(args[0].scalar(), Value::Number(_)))
}

/// ISTEXT function
pub fn fn_istext(args: &[ArgValue]) -> Value {
    Value::Boolean(matches!(args[0].scalar(), Value::Text(_)))
}
