//! # gridcalc-core
//!
//! Core data structures for the gridcalc formula engine.
//!
//! This crate provides the types shared by the parser, evaluator and
//! recalculation engine:
//! - [`CellAddress`] and [`CellRange`] - Cell addressing and ranges
//! - [`Value`] and [`ErrorKind`] - Typed cell values and Excel-style errors
//! - [`ValueProvider`], [`CellStore`] and [`ChangeSink`] - The interfaces the
//!   engine reads cells through and reports changes to
//! - [`MemoryStore`] - A sparse in-memory [`CellStore`]
//!
//! ## Example
//!
//! ```rust
//! use gridcalc_core::{CellAddress, CellStore, MemoryStore, Value, ValueProvider};
//!
//! let mut store = MemoryStore::new();
//! let a1 = CellAddress::parse("A1").unwrap();
//! store.set_value(a1, Value::Number(42.0));
//!
//! assert_eq!(store.get_value(a1), Value::Number(42.0));
//! assert_eq!(store.get_value(CellAddress::new(5, 5)), Value::Empty);
//! ```

pub mod cell;
pub mod error;
pub mod store;

pub use cell::{CellAddress, CellRange, CellRangeIterator, ErrorKind, Value};
pub use error::{Error, Result};
pub use store::{CellData, CellStore, ChangeLog, ChangeSink, MemoryStore, ValueProvider};

/// Maximum number of rows in a sheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a sheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Largest range expanded into individual values (one full column)
pub const MAX_RANGE_CELLS: u64 = MAX_ROWS as u64;
