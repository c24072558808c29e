//! Prelude module - common imports for gridcalc users
//!
//! ```rust
//! use gridcalc::prelude::*;
//! ```

pub use crate::{
    // Calculation types
    CalculationOptions,
    CalculationStats,
    CellState,
    Engine,
    // Cell types
    CellAddress,
    CellCoordinate,
    CellError,
    CellRange,
    CellValue,
    // Names
    DefinedName,
    NameScope,
    // Error types
    Error,
    FormulaError,
    // Formula values
    FormulaValue,
    Result,
    Workbook,
};
