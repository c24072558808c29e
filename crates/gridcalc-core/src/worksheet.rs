//! Worksheet type

use ahash::AHashMap;

use crate::cell::{CellAddress, CellRange, CellValue};
use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};

static EMPTY: CellValue = CellValue::Empty;

/// A single sheet of constant cell values.
///
/// Storage is sparse: only non-empty cells occupy memory.
#[derive(Debug, Clone)]
pub struct Worksheet {
    name: String,
    /// Keyed by (row, col)
    cells: AHashMap<(u32, u16), CellValue>,
    /// Box around every cell set since the sheet was last empty
    extent: Option<CellRange>,
}

impl Worksheet {
    /// Create a new worksheet with the given name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            cells: AHashMap::new(),
            extent: None,
        }
    }

    /// Get the sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    // === Cell Access ===

    /// Get a cell value by address string (e.g., "A1")
    pub fn get_value(&self, address: &str) -> Result<&CellValue> {
        let addr = CellAddress::parse(address)?;
        Ok(self.get_value_at(addr.row, addr.col))
    }

    /// Get a cell value by indices; empty cells read as [`CellValue::Empty`]
    pub fn get_value_at(&self, row: u32, col: u16) -> &CellValue {
        self.cells.get(&(row, col)).unwrap_or(&EMPTY)
    }

    // === Cell Modification ===

    /// Set a cell value by address string
    pub fn set_cell_value<V: Into<CellValue>>(&mut self, address: &str, value: V) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_cell_value_at(addr.row, addr.col, value)
    }

    /// Set a cell value by row and column indices
    ///
    /// Setting [`CellValue::Empty`] removes the cell.
    pub fn set_cell_value_at<V: Into<CellValue>>(
        &mut self,
        row: u32,
        col: u16,
        value: V,
    ) -> Result<()> {
        validate_cell_position(row, col)?;
        match value.into() {
            CellValue::Empty => {
                self.clear_cell_at(row, col);
            }
            value => {
                self.cells.insert((row, col), value);
                let cell = CellRange::from_indices(row, col, row, col);
                self.extent = Some(self.extent.map_or(cell, |extent| extent.union(&cell)));
            }
        }
        Ok(())
    }

    /// Clear a cell by indices
    pub fn clear_cell_at(&mut self, row: u32, col: u16) -> Option<CellValue> {
        let old = self.cells.remove(&(row, col));
        if self.cells.is_empty() {
            self.extent = None;
        }
        old
    }

    // === Range Operations ===

    /// Bounds of the non-empty cells
    ///
    /// Kept up to date as cells are set. Clearing a cell does not shrink it
    /// until the sheet is empty again, so it may cover cleared cells.
    pub fn used_range(&self) -> Option<CellRange> {
        self.extent
    }

    /// Number of non-empty cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Iterate over non-empty cells as ((row, col), value), in no particular order
    pub fn iter(&self) -> impl Iterator<Item = ((u32, u16), &CellValue)> {
        self.cells.iter().map(|(&pos, value)| (pos, value))
    }
}

fn validate_cell_position(row: u32, col: u16) -> Result<()> {
    if row >= MAX_ROWS {
        return Err(Error::RowOutOfBounds(row, MAX_ROWS - 1));
    }
    if col >= MAX_COLS {
        return Err(Error::ColumnOutOfBounds(col as u32, MAX_COLS - 1));
    }
    Ok(())
}
