//! # gridcalc
//!
//! An incremental spreadsheet formula engine.
//!
//! gridcalc parses Excel-style formulas, tracks which cells read which, and
//! keeps cached values up to date as cells change: only the edited cell and
//! its transitive dependents are recalculated, reference cycles become
//! `#CIRCULAR!` instead of hanging, and a pass can be superseded by a newer
//! edit.
//!
//! ## Quick Start
//!
//! ```rust
//! use gridcalc::prelude::*;
//!
//! let mut sheet = Sheet::new();
//! sheet.set("A1", "1").unwrap();
//! sheet.set("A2", "x").unwrap();
//! sheet.set("A3", "2").unwrap();
//! sheet.set("B1", "=SUM(A1:A3)").unwrap();
//!
//! let b1 = CellAddress::parse("B1").unwrap();
//! assert_eq!(sheet.value(b1), Value::Number(3.0));
//!
//! // Cycles are reported, not followed
//! sheet.set("C1", "=C2").unwrap();
//! sheet.set("C2", "=C1").unwrap();
//! let c1 = CellAddress::parse("C1").unwrap();
//! assert_eq!(sheet.value(c1).to_string(), "#CIRCULAR!");
//! ```
//!
//! ## Crates
//!
//! - `gridcalc-core`: addresses, values and the cell store interfaces
//! - `gridcalc-formula`: tokenizer, parser, evaluator, functions and the
//!   dependency graph
//! - `gridcalc`: the [`Sheet`] recalculation engine (this crate)

pub mod calculation;
pub mod prelude;

pub use calculation::{CalculationOptions, GenerationHandle, RecalcReport, Sheet};

// Re-export core types
pub use gridcalc_core::{
    CellAddress, CellData, CellRange, CellStore, ChangeLog, ChangeSink, Error, ErrorKind,
    MemoryStore, Result, Value, ValueProvider, MAX_COLS, MAX_RANGE_CELLS, MAX_ROWS,
};

// Re-export formula types
pub use gridcalc_formula::{
    evaluate, evaluate_with, parse_formula, tokenize, DependencyGraph, Expr, FormulaError,
    FormulaResult, FunctionRegistry, Parser, Reference, DEFAULT_MAX_DEPTH,
};
