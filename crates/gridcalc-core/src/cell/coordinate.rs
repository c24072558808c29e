//! Workbook-level cell coordinates and 3-D ranges

use super::address::{CellAddress, CellRange};
use crate::error::Result;
use std::fmt;

/// A cell's position in the workbook: sheet index, row and column, all 0-based.
///
/// This is the key type for formula cells and dependency edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoordinate {
    pub sheet: usize,
    pub row: u32,
    pub col: u16,
}

impl CellCoordinate {
    pub fn new(sheet: usize, row: u32, col: u16) -> Self {
        Self { sheet, row, col }
    }

    /// Parse an A1-style address on the given sheet
    ///
    /// ```
    /// use gridcalc_core::CellCoordinate;
    ///
    /// let c = CellCoordinate::parse("$C$7", 2).unwrap();
    /// assert_eq!(c, CellCoordinate::new(2, 6, 2));
    /// ```
    pub fn parse(a1: &str, sheet: usize) -> Result<Self> {
        Ok(Self::from_address(sheet, CellAddress::parse(a1)?))
    }

    pub fn from_address(sheet: usize, addr: CellAddress) -> Self {
        Self::new(sheet, addr.row, addr.col)
    }

    /// The relative A1 address of this cell within its sheet
    pub fn address(&self) -> CellAddress {
        CellAddress::new(self.row, self.col)
    }
}

impl fmt::Display for CellCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}", self.sheet, self.address())
    }
}

/// A cell box on a contiguous span of sheets.
///
/// A plain range has `first_sheet == last_sheet`; a 3-D range such as
/// `Sheet1:Sheet3!A1:B2` covers the same box on every sheet in between.
/// The sheet span is normalized like the box itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SheetRange {
    pub first_sheet: usize,
    pub last_sheet: usize,
    pub range: CellRange,
}

impl SheetRange {
    pub fn new(first_sheet: usize, last_sheet: usize, range: CellRange) -> Self {
        Self {
            first_sheet: first_sheet.min(last_sheet),
            last_sheet: first_sheet.max(last_sheet),
            range,
        }
    }

    /// A range on a single sheet
    pub fn on_sheet(sheet: usize, range: CellRange) -> Self {
        Self::new(sheet, sheet, range)
    }

    pub fn is_3d(&self) -> bool {
        self.first_sheet != self.last_sheet
    }

    pub fn sheet_count(&self) -> usize {
        self.last_sheet - self.first_sheet + 1
    }

    pub fn contains(&self, cell: &CellCoordinate) -> bool {
        (self.first_sheet..=self.last_sheet).contains(&cell.sheet)
            && self.range.contains(cell.row, cell.col)
    }

    /// Every cell covered, sheet by sheet, row-major within a sheet
    pub fn coordinates(&self) -> impl Iterator<Item = CellCoordinate> + '_ {
        (self.first_sheet..=self.last_sheet).flat_map(move |sheet| {
            self.range
                .cells()
                .map(move |addr| CellCoordinate::from_address(sheet, addr))
        })
    }

    /// Same cells with the address anchors dropped, used as a map key
    pub fn relative(&self) -> Self {
        Self {
            range: self.range.relative(),
            ..*self
        }
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_3d() {
            write!(f, "[{}:{}]{}", self.first_sheet, self.last_sheet, self.range)
        } else {
            write!(f, "[{}]{}", self.first_sheet, self.range)
        }
    }
}
