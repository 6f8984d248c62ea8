//! Date functions over serial day numbers
//!
//! A date is a plain number: the count of days in the 1900 date system,
//! where serial 1 is 1900-01-01. Serial 60 is the fictional 1900-02-29
//! that spreadsheets keep for compatibility, so every later serial is one
//! higher than the true day count. The fractional part of a serial is the
//! time of day.
//!
//! `TODAY` and `NOW` read the clock when their cell is evaluated. They are
//! not re-evaluated on their own; an edit upstream or
//! `recalculate_all` refreshes them.

use super::{int_arg, ArgValue};
use crate::operators::{to_number, to_text};
use chrono::{Datelike, Days, Local, NaiveDate, Timelike};
use gridcalc_core::{ErrorKind, Value};

/// Serial of the fictional 1900-02-29
const LEAP_BUG_SERIAL: i64 = 60;

/// Latest year a serial may land in
const MAX_YEAR: i32 = 9999;

/// Formats accepted by DATEVALUE, tried in order
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%b-%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

fn epoch(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Serial number of a calendar date, if it falls in 1900..=9999
pub fn serial_from_date(date: NaiveDate) -> Option<i64> {
    if !(1900..=MAX_YEAR).contains(&date.year()) {
        return None;
    }
    // Dates from March 1900 on count the fictional leap day
    let base = if date < epoch(1900, 3, 1)? {
        epoch(1899, 12, 31)?
    } else {
        epoch(1899, 12, 30)?
    };
    Some((date - base).num_days())
}

/// Year, month and day of a serial
///
/// Serial 0 is the spreadsheet "day zero", 1900-01-00, and serial 60 is
/// 1900-02-29; neither exists as a [`NaiveDate`].
pub fn ymd_from_serial(serial: i64) -> Option<(i32, u32, u32)> {
    let date = match serial {
        s if s < 0 => return None,
        0 => return Some((1900, 1, 0)),
        LEAP_BUG_SERIAL => return Some((1900, 2, 29)),
        s if s < LEAP_BUG_SERIAL => epoch(1899, 12, 31)?.checked_add_days(Days::new(s as u64))?,
        s => epoch(1899, 12, 30)?.checked_add_days(Days::new(s as u64))?,
    };
    if date.year() > MAX_YEAR {
        return None;
    }
    Some((date.year(), date.month(), date.day()))
}

fn date_result(date: Option<NaiveDate>) -> Value {
    match date.and_then(serial_from_date) {
        Some(serial) => Value::Number(serial as f64),
        None => Value::Error(ErrorKind::ValueError),
    }
}

fn serial_arg(arg: &ArgValue) -> Result<i64, ErrorKind> {
    let n = to_number(&arg.scalar())?;
    if n < 0.0 {
        return Err(ErrorKind::ValueError);
    }
    Ok(n.trunc() as i64)
}

fn date_part(args: &[ArgValue], part: fn((i32, u32, u32)) -> i64) -> Value {
    let result = serial_arg(&args[0])
        .and_then(|serial| ymd_from_serial(serial).ok_or(ErrorKind::ValueError));
    match result {
        Ok(ymd) => Value::Number(part(ymd) as f64),
        Err(e) => Value::Error(e),
    }
}

/// TODAY function
pub fn fn_today(_args: &[ArgValue]) -> Value {
    date_result(Some(Local::now().date_naive()))
}

/// NOW function: today's serial plus the fraction of the day elapsed
pub fn fn_now(_args: &[ArgValue]) -> Value {
    let now = Local::now().naive_local();
    match serial_from_date(now.date()) {
        Some(serial) => {
            let seconds = f64::from(now.time().num_seconds_from_midnight());
            Value::Number(serial as f64 + seconds / 86_400.0)
        }
        None => Value::Error(ErrorKind::ValueError),
    }
}

/// DATE function
///
/// `DATE(year, month, day)`. Years below 1900 are offsets from 1900, and
/// months and days outside their usual range roll into neighbouring
/// months, so `DATE(2024, 14, 1)` is 2025-02-01 and `DATE(2024, 3, 0)` is
/// the last day of February.
pub fn fn_date(args: &[ArgValue]) -> Value {
    let parts = (|| -> Result<(i64, i64, i64), ErrorKind> {
        Ok((int_arg(&args[0])?, int_arg(&args[1])?, int_arg(&args[2])?))
    })();
    let (year, month, day) = match parts {
        Ok(parts) => parts,
        Err(e) => return Value::Error(e),
    };

    let year = if (0..1900).contains(&year) { year + 1900 } else { year };
    let months = year * 12 + (month - 1);
    let first = i32::try_from(months.div_euclid(12))
        .ok()
        .and_then(|y| epoch(y, months.rem_euclid(12) as u32 + 1, 1));

    let date = first.and_then(|first| {
        let offset = day - 1;
        if offset >= 0 {
            first.checked_add_days(Days::new(offset as u64))
        } else {
            first.checked_sub_days(Days::new(offset.unsigned_abs()))
        }
    });
    date_result(date)
}

/// YEAR function
pub fn fn_year(args: &[ArgValue]) -> Value {
    date_part(args, |(y, _, _)| i64::from(y))
}

/// MONTH function
pub fn fn_month(args: &[ArgValue]) -> Value {
    date_part(args, |(_, m, _)| i64::from(m))
}

/// DAY function
pub fn fn_day(args: &[ArgValue]) -> Value {
    date_part(args, |(_, _, d)| i64::from(d))
}

/// DATEVALUE function
///
/// Reads ISO (`2024-03-15`), US (`3/15/2024`) and spelled-out
/// (`15 March 2024`, `March 15, 2024`) dates.
pub fn fn_datevalue(args: &[ArgValue]) -> Value {
    let text = match to_text(&args[0].scalar()) {
        Ok(text) => text,
        Err(e) => return Value::Error(e),
    };
    let text = text.trim();

    let date = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok());
    date_result(date)
}
