//! # gridcalc
//!
//! A spreadsheet formula engine.
//!
//! gridcalc turns formula text such as `SUM(A1:A10)*IF(B2>0,1,-1)` into an
//! evaluable form, resolves its references against sheets and defined names,
//! evaluates it with Excel-compatible coercion and error rules, and keeps
//! dependent cells consistent as inputs change.
//!
//! ## Features
//!
//! - Cell, range and 3-D references, absolute and relative
//! - Defined names in workbook or sheet scope, and names with parameters
//!   that act as user-defined functions
//! - Built-in math, logical, information, lookup and text functions
//! - Lazy, incremental recalculation with cycle detection
//!
//! ## Example
//!
//! ```rust
//! use gridcalc::prelude::*;
//!
//! let mut engine = Engine::new();
//! let a1 = CellCoordinate::parse("A1", 0).unwrap();
//! let a2 = CellCoordinate::parse("A2", 0).unwrap();
//!
//! engine.define_name(DefinedName::workbook_scope("Rate", "0.5")).unwrap();
//! engine.set_value(a1, 42.0).unwrap();
//! engine.set_formula(a2, "=A1*Rate").unwrap();
//!
//! assert_eq!(engine.get_value(a2), FormulaValue::Number(21.0));
//! ```

pub mod calculation;
pub mod error;
pub mod prelude;

// Re-export calculation types
pub use calculation::{
    CalculationOptions, CalculationStats, CellState, Engine, FormulaCell, ParsedFormula,
};
pub use error::{Error, Result};

// Re-export core types
pub use gridcalc_core::{
    CellAddress, CellCoordinate, CellError, CellRange, CellValue, DefinedName, NameScope,
    SheetRange, Workbook, Worksheet, MAX_COLS, MAX_ROWS, MAX_SHEET_NAME_LEN,
};

// Re-export formula types
pub use gridcalc_formula::{
    parse_formula, serialize_formula, tokenize, FormulaError, FormulaExpr, FormulaValue, Token,
    TokenKind,
};
