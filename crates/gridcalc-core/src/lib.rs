//! # gridcalc-core
//!
//! Core data structures for the gridcalc formula engine.
//!
//! This crate provides the types shared by the parser, evaluator and
//! recalculation engine:
//! - [`CellValue`] and [`CellError`] - Constant cell contents and error codes
//! - [`CellAddress`], [`CellRange`] - A1-style addressing within one sheet
//! - [`CellCoordinate`], [`SheetRange`] - Sheet-qualified cells and 3-D ranges
//! - [`DefinedName`] - Workbook and sheet scoped names
//! - [`Workbook`], [`Worksheet`] - The cell storage the engine reads from
//!
//! ## Example
//!
//! ```rust
//! use gridcalc_core::{CellCoordinate, CellValue, Workbook};
//!
//! let mut workbook = Workbook::new();
//! let a1 = CellCoordinate::parse("A1", 0).unwrap();
//! workbook.set_cell_value(a1, CellValue::Number(42.0)).unwrap();
//! assert_eq!(workbook.cell_value(a1), &CellValue::Number(42.0));
//! ```

pub mod cell;
pub mod error;
pub mod named_range;
pub mod workbook;
pub mod worksheet;

// Re-exports for convenience
pub use cell::{CellAddress, CellCoordinate, CellError, CellRange, CellValue, SharedString, SheetRange};
pub use error::{Error, Result};
pub use named_range::{validate_name, DefinedName, NameCollection, NameScope};
pub use workbook::Workbook;
pub use worksheet::Worksheet;

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Maximum length of a defined name
pub const MAX_NAME_LEN: usize = 255;
