//! Workbook type - the sheets and defined names formulas resolve against

use crate::cell::{CellCoordinate, CellValue};
use crate::error::{Error, Result};
use crate::named_range::{DefinedName, NameCollection, NameScope};
use crate::worksheet::Worksheet;
use crate::MAX_SHEET_NAME_LEN;

static EMPTY: CellValue = CellValue::Empty;

/// A workbook: an ordered list of worksheets plus the defined names.
#[derive(Debug, Clone)]
pub struct Workbook {
    worksheets: Vec<Worksheet>,
    names: NameCollection,
}

impl Workbook {
    /// Create a new workbook with one worksheet named "Sheet1"
    pub fn new() -> Self {
        Self {
            worksheets: vec![Worksheet::new("Sheet1")],
            names: NameCollection::new(),
        }
    }

    /// Get the number of worksheets
    pub fn sheet_count(&self) -> usize {
        self.worksheets.len()
    }

    pub fn worksheet(&self, index: usize) -> Option<&Worksheet> {
        self.worksheets.get(index)
    }

    pub fn worksheet_mut(&mut self, index: usize) -> Option<&mut Worksheet> {
        self.worksheets.get_mut(index)
    }

    /// Get the index of a worksheet by name (case-insensitive)
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        let lower = name.to_lowercase();
        self.worksheets
            .iter()
            .position(|ws| ws.name().to_lowercase() == lower)
    }

    pub fn sheet_name(&self, index: usize) -> Option<&str> {
        self.worksheets.get(index).map(Worksheet::name)
    }

    /// Add a new worksheet with specified name
    pub fn add_worksheet_with_name(&mut self, name: &str) -> Result<usize> {
        self.validate_sheet_name(name, None)?;
        self.worksheets.push(Worksheet::new(name));
        Ok(self.worksheets.len() - 1)
    }

    /// Remove a worksheet by index
    ///
    /// Names scoped to the sheet go with it; later sheet indices shift down.
    pub fn remove_worksheet(&mut self, index: usize) -> Result<Worksheet> {
        if index >= self.worksheets.len() {
            return Err(Error::SheetOutOfBounds(index, self.worksheets.len()));
        }
        self.names.remove_sheet(index);
        Ok(self.worksheets.remove(index))
    }

    /// Rename a worksheet
    pub fn rename_worksheet(&mut self, index: usize, new_name: &str) -> Result<()> {
        if index >= self.worksheets.len() {
            return Err(Error::SheetOutOfBounds(index, self.worksheets.len()));
        }
        self.validate_sheet_name(new_name, Some(index))?;
        self.worksheets[index].set_name(new_name);
        Ok(())
    }

    // ==================== Cells ====================

    /// Read a constant; anything not stored (including unknown sheets) is empty
    pub fn cell_value(&self, cell: CellCoordinate) -> &CellValue {
        self.worksheets
            .get(cell.sheet)
            .map_or(&EMPTY, |ws| ws.get_value_at(cell.row, cell.col))
    }

    pub fn set_cell_value(&mut self, cell: CellCoordinate, value: CellValue) -> Result<()> {
        let count = self.worksheets.len();
        self.worksheets
            .get_mut(cell.sheet)
            .ok_or(Error::SheetOutOfBounds(cell.sheet, count))?
            .set_cell_value_at(cell.row, cell.col, value)
    }

    // ==================== Defined Names ====================

    /// Define a new name
    ///
    /// # Example
    /// ```
    /// use gridcalc_core::{DefinedName, Workbook};
    ///
    /// let mut wb = Workbook::new();
    /// wb.define_name(DefinedName::workbook_scope("TaxRate", "Sheet1!$B$1")).unwrap();
    /// assert!(wb.get_name("taxrate", 0).is_some());
    /// ```
    pub fn define_name(&mut self, name: DefinedName) -> Result<()> {
        self.check_scope(name.scope)?;
        self.names.define(name)
    }

    /// Define a name, replacing any definition in the same scope
    pub fn define_or_replace_name(&mut self, name: DefinedName) -> Result<Option<DefinedName>> {
        self.check_scope(name.scope)?;
        self.names.define_or_replace(name)
    }

    /// Get a name as seen from `current_sheet` (sheet scope first, then workbook)
    pub fn get_name(&self, name: &str, current_sheet: usize) -> Option<&DefinedName> {
        self.names.get(name, current_sheet)
    }

    pub fn remove_name(&mut self, name: &str, scope: NameScope) -> Option<DefinedName> {
        self.names.remove(name, scope)
    }

    pub fn names(&self) -> &NameCollection {
        &self.names
    }

    fn check_scope(&self, scope: NameScope) -> Result<()> {
        match scope {
            NameScope::Sheet(i) if i >= self.worksheets.len() => {
                Err(Error::SheetOutOfBounds(i, self.worksheets.len()))
            }
            _ => Ok(()),
        }
    }

    /// Validate a sheet name, optionally excluding a sheet from the duplicate check
    fn validate_sheet_name(&self, name: &str, exclude_index: Option<usize>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::InvalidSheetName("Sheet name cannot be empty".into()));
        }
        if name.chars().count() > MAX_SHEET_NAME_LEN {
            return Err(Error::InvalidSheetName(format!(
                "Sheet name too long (max {} characters)",
                MAX_SHEET_NAME_LEN
            )));
        }

        const INVALID_CHARS: &[char] = &[':', '\\', '/', '?', '*', '[', ']'];
        if let Some(c) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
            return Err(Error::InvalidSheetName(format!(
                "Sheet name cannot contain '{}'",
                c
            )));
        }
        if name.starts_with('\'') || name.ends_with('\'') {
            return Err(Error::InvalidSheetName(
                "Sheet name cannot start or end with an apostrophe".into(),
            ));
        }

        match self.sheet_index(name) {
            Some(i) if Some(i) != exclude_index => Err(Error::DuplicateSheetName(name.into())),
            _ => Ok(()),
        }
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}
