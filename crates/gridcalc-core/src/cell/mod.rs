//! Cell-related types and utilities
//!
//! This module contains:
//! - [`Value`] - The typed value a cell evaluates to
//! - [`ErrorKind`] - Excel-style error values
//! - [`CellAddress`] - A cell's location (e.g., "A1")
//! - [`CellRange`] - A rectangular range of cells (e.g., "A1:B10")

mod address;
mod value;

pub use address::{CellAddress, CellRange, CellRangeIterator};
pub use value::{ErrorKind, Value};
