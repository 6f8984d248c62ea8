//! Prelude module - common imports for gridcalc users
//!
//! ```rust
//! use gridcalc::prelude::*;
//! ```

pub use crate::{
    // Engine
    CalculationOptions,
    // Core types
    CellAddress,
    CellRange,
    // Store interfaces
    CellStore,
    ChangeLog,
    ChangeSink,
    ErrorKind,
    // Formula types
    Expr,
    FormulaError,
    FormulaResult,
    FunctionRegistry,
    GenerationHandle,
    MemoryStore,
    RecalcReport,
    Reference,
    Sheet,
    Value,
    ValueProvider,
};
