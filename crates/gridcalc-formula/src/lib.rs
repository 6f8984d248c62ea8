//! # gridcalc-formula
//!
//! Formula parser and evaluator for gridcalc.
//!
//! This crate provides:
//! - Tokenizing and parsing formula text into an [`Expr`] tree
//! - Evaluating an [`Expr`] against any [`ValueProvider`](gridcalc_core::ValueProvider)
//! - The built-in function library and a registry for custom functions
//! - A dependency graph with cycle detection and evaluation ordering
//!
//! ## Example
//!
//! ```rust
//! use gridcalc_core::{CellAddress, Value};
//! use gridcalc_formula::{evaluate, parse_formula};
//!
//! let ast = parse_formula("=A1*2+1").unwrap();
//! let cells = |addr: CellAddress| {
//!     if addr == CellAddress::new(0, 0) {
//!         Value::Number(20.0)
//!     } else {
//!         Value::Empty
//!     }
//! };
//! assert_eq!(evaluate(&ast, &cells), Value::Number(41.0));
//! ```

pub mod ast;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod operators;
pub mod parser;
pub mod tokenizer;

pub use ast::{BinaryOperator, Expr, Reference, UnaryOperator};
pub use dependency::{DependencyGraph, EdgeDiff};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{evaluate, evaluate_with, Evaluator, MAX_EVAL_DEPTH};
pub use functions::{ArgValue, FunctionRegistry, RangeValues};
pub use parser::{parse_formula, Parser, DEFAULT_MAX_DEPTH};
pub use tokenizer::{tokenize, Token, TokenKind};
