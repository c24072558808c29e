//! Cell-related types and utilities
//!
//! This module contains:
//! - [`CellValue`] - The constant value stored in a cell
//! - [`CellAddress`] - A cell's location within a sheet (e.g., "A1")
//! - [`CellRange`] - A range of cells (e.g., "A1:B10")
//! - [`CellCoordinate`] - A cell's location within the workbook
//! - [`SheetRange`] - A range spanning one or more sheets

mod address;
mod coordinate;
mod value;

pub use address::{CellAddress, CellRange, CellRangeIterator};
pub use coordinate::{CellCoordinate, SheetRange};
pub use value::{CellError, CellValue, SharedString};
