//! Lookup and reference functions

use super::{int_arg, opt_int_arg, ArgValue, RangeValues};
use crate::operators::{compare_values, same_type, to_bool};
use gridcalc_core::{ErrorKind, Value};
use std::cmp::Ordering;

/// Lookup key argument; errors in the key propagate
fn key_arg(arg: &ArgValue) -> Result<Value, ErrorKind> {
    match arg.scalar() {
        Value::Error(e) => Err(e),
        value => Ok(value),
    }
}

/// Exact match: first position whose value equals `key`
///
/// Blanks never match, on either side: an empty key finds nothing and an
/// empty cell is not a zero here.
fn find_exact<'a>(key: &Value, cells: impl Iterator<Item = &'a Value>) -> Option<usize> {
    if key.is_empty() {
        return None;
    }
    cells
        .enumerate()
        .find(|(_, cell)| {
            !cell.is_error()
                && !cell.is_empty()
                && same_type(key, cell)
                && compare_values(key, cell) == Ordering::Equal
        })
        .map(|(i, _)| i)
}

/// Approximate match over ascending data: last position whose value is `<= key`
///
/// Cells of a different type than the key are skipped.
fn find_sorted_le<'a>(key: &Value, cells: impl Iterator<Item = &'a Value>) -> Option<usize> {
    let mut found = None;
    for (i, cell) in cells.enumerate() {
        if cell.is_error() || cell.is_empty() || !same_type(key, cell) {
            continue;
        }
        if compare_values(cell, key) == Ordering::Greater {
            break;
        }
        found = Some(i);
    }
    found
}

/// Approximate match over descending data: last position whose value is `>= key`
fn find_sorted_ge<'a>(key: &Value, cells: impl Iterator<Item = &'a Value>) -> Option<usize> {
    let mut found = None;
    for (i, cell) in cells.enumerate() {
        if cell.is_error() || cell.is_empty() || !same_type(key, cell) {
            continue;
        }
        if compare_values(cell, key) == Ordering::Less {
            break;
        }
        found = Some(i);
    }
    found
}

/// Shared body of VLOOKUP and HLOOKUP
///
/// `by_rows` selects VLOOKUP semantics: search the first column, return
/// from the `index`-th column of the matching row.
fn table_lookup(args: &[ArgValue], by_rows: bool) -> Result<Value, ErrorKind> {
    let key = key_arg(&args[0])?;
    let table = args[1].to_range();
    let index = int_arg(&args[2])?;
    let approximate = match args.get(3) {
        Some(arg) => to_bool(&arg.scalar())?,
        None => true,
    };

    let (lines, width) = if by_rows {
        (table.rows(), table.cols())
    } else {
        (table.cols(), table.rows())
    };

    if index < 1 {
        return Err(ErrorKind::ValueError);
    }
    let index = index as usize - 1;
    if index >= width {
        return Err(ErrorKind::RefError);
    }

    let keys = (0..lines).filter_map(|line| cell_at(&table, by_rows, line, 0));

    let found = if approximate {
        find_sorted_le(&key, keys)
    } else {
        find_exact(&key, keys)
    };

    found
        .and_then(|line| cell_at(&table, by_rows, line, index))
        .cloned()
        .ok_or(ErrorKind::NotAvailable)
}

fn cell_at(table: &RangeValues, by_rows: bool, line: usize, offset: usize) -> Option<&Value> {
    if by_rows {
        table.get(line, offset)
    } else {
        table.get(offset, line)
    }
}

/// VLOOKUP function
///
/// `VLOOKUP(key, range, col_index, [approximate=TRUE])`
pub fn fn_vlookup(args: &[ArgValue]) -> Value {
    table_lookup(args, true).unwrap_or_else(Value::Error)
}

/// HLOOKUP function
///
/// `HLOOKUP(key, range, row_index, [approximate=TRUE])`
pub fn fn_hlookup(args: &[ArgValue]) -> Value {
    table_lookup(args, false).unwrap_or_else(Value::Error)
}

fn index(table: &RangeValues, row: i64, col: Option<i64>) -> Result<Value, ErrorKind> {
    let (row, col) = match col {
        Some(col) => (row, col),
        // A single row is indexed by column
        None if table.rows() == 1 => (1, row),
        None if table.cols() == 1 => (row, 1),
        None => return Err(ErrorKind::RefError),
    };

    if row < 1 || col < 1 {
        return Err(ErrorKind::ValueError);
    }

    table
        .get(row as usize - 1, col as usize - 1)
        .cloned()
        .ok_or(ErrorKind::RefError)
}

/// INDEX function
///
/// `INDEX(range, row, [col])`, both 1-based
pub fn fn_index(args: &[ArgValue]) -> Value {
    let result = (|| -> Result<Value, ErrorKind> {
        let table = args[0].to_range();
        let row = int_arg(&args[1])?;
        let col = match args.get(2) {
            Some(arg) => Some(int_arg(arg)?),
            None => None,
        };
        index(&table, row, col)
    })();
    result.unwrap_or_else(Value::Error)
}

/// MATCH function
///
/// `MATCH(key, range, [match_type=1])` over a single row or column:
/// `1` finds the largest value `<= key` in ascending data, `0` the first
/// exact match and `-1` the smallest value `>= key` in descending data.
pub fn fn_match(args: &[ArgValue]) -> Value {
    let result = (|| -> Result<Value, ErrorKind> {
        let key = key_arg(&args[0])?;
        let table = args[1].to_range();
        let match_type = opt_int_arg(args, 2, 1)?;

        if table.rows() != 1 && table.cols() != 1 {
            return Err(ErrorKind::NotAvailable);
        }

        let cells = table.values().iter();
        let found = match match_type.signum() {
            1 => find_sorted_le(&key, cells),
            0 => find_exact(&key, cells),
            _ => find_sorted_ge(&key, cells),
        };

        found
            .map(|i| Value::Number((i + 1) as f64))
            .ok_or(ErrorKind::NotAvailable)
    })();
    result.unwrap_or_else(Value::Error)
}
