//! Values produced during evaluation, with spreadsheet coercion rules

use std::cmp::Ordering;
use std::fmt;

use gridcalc_core::{CellError, CellValue};
use lazy_regex::regex_captures;

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
    /// Empty cell
    Blank,
    /// Range or array constant; only ever passed into functions
    Array(Array),
}

impl FormulaValue {
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, FormulaValue::Blank)
    }

    /// Get the error if this is one
    pub fn error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// First error inside this value, row-major for arrays
    pub fn first_error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            FormulaValue::Array(array) => array.stored().find_map(FormulaValue::first_error),
            _ => None,
        }
    }

    /// Collapse a 1×1 array to its element; larger arrays become `#VALUE!`
    pub fn scalar(self) -> FormulaValue {
        match self {
            FormulaValue::Array(array) if array.height() == 1 && array.width() == 1 => {
                array.get(0, 0).clone()
            }
            FormulaValue::Array(_) => FormulaValue::Error(CellError::Value),
            other => other,
        }
    }

    /// View any value as an array; a scalar becomes a 1×1 array
    pub fn into_array(self) -> Array {
        match self {
            FormulaValue::Array(array) => array,
            scalar => Array::new(vec![vec![scalar]]),
        }
    }

    /// Number coercion: Blank is 0, booleans are 1/0, numeric text is parsed
    pub fn to_number(&self) -> Result<f64, CellError> {
        match self {
            FormulaValue::Number(n) => Ok(*n),
            FormulaValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            FormulaValue::Blank => Ok(0.0),
            FormulaValue::String(s) => parse_number(s).ok_or(CellError::Value),
            FormulaValue::Error(e) => Err(*e),
            FormulaValue::Array(_) => self.clone().scalar().to_number(),
        }
    }

    /// Text coercion: numbers use canonical formatting, Blank is ""
    pub fn to_text(&self) -> Result<String, CellError> {
        match self {
            FormulaValue::String(s) => Ok(s.clone()),
            FormulaValue::Number(n) => Ok(format_number(*n)),
            FormulaValue::Boolean(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
            FormulaValue::Blank => Ok(String::new()),
            FormulaValue::Error(e) => Err(*e),
            FormulaValue::Array(_) => self.clone().scalar().to_text(),
        }
    }

    /// Boolean coercion: numbers are true when non-zero, text must spell TRUE or FALSE
    pub fn to_bool(&self) -> Result<bool, CellError> {
        match self {
            FormulaValue::Boolean(b) => Ok(*b),
            FormulaValue::Number(n) => Ok(*n != 0.0),
            FormulaValue::Blank => Ok(false),
            FormulaValue::String(s) if s.eq_ignore_ascii_case("TRUE") => Ok(true),
            FormulaValue::String(s) if s.eq_ignore_ascii_case("FALSE") => Ok(false),
            FormulaValue::String(_) => Err(CellError::Value),
            FormulaValue::Error(e) => Err(*e),
            FormulaValue::Array(_) => self.clone().scalar().to_bool(),
        }
    }

    /// Ordering used by comparison operators and lookups
    ///
    /// Numbers sort before text, text before booleans. Text compares without
    /// regard to case. Blank takes the type of the other side: 0, "" or FALSE.
    /// Errors and arrays must be handled by the caller.
    pub fn compare(&self, other: &FormulaValue) -> Ordering {
        use FormulaValue::*;

        match (self, other) {
            (Blank, Blank) => Ordering::Equal,
            (Blank, Number(_)) => Number(0.0).compare(other),
            (Blank, String(_)) => String(std::string::String::new()).compare(other),
            (Blank, Boolean(_)) => Boolean(false).compare(other),
            (_, Blank) => other.compare(self).reverse(),
            (Number(a), Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (String(a), String(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (Boolean(a), Boolean(b)) => a.cmp(b),
            _ => type_rank(self).cmp(&type_rank(other)),
        }
    }

    /// Whether two values belong to the same comparison class (number, text, boolean)
    pub(crate) fn same_type(&self, other: &FormulaValue) -> bool {
        type_rank(self) == type_rank(other)
    }
}

fn type_rank(value: &FormulaValue) -> u8 {
    match value {
        FormulaValue::Number(_) | FormulaValue::Blank => 0,
        FormulaValue::String(_) => 1,
        FormulaValue::Boolean(_) => 2,
        FormulaValue::Error(_) => 3,
        FormulaValue::Array(_) => 4,
    }
}

/// Parse numeric text such as `" 1.5e3 "` or `"12%"`
pub fn parse_number(text: &str) -> Option<f64> {
    let (_, body, percent) =
        regex_captures!(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)\s*(%?)\s*$", text)?;
    let n: f64 = body.parse().ok()?;
    let n = if percent.is_empty() { n } else { n / 100.0 };
    n.is_finite().then_some(n)
}

/// Canonical text for a number: at most 15 significant digits, integers
/// without a fraction
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n);
    }
    let rounded: f64 = format!("{:.14e}", n).parse().unwrap_or(n);
    let abs = rounded.abs();
    if abs >= 1e15 || abs < 1e-9 {
        return scientific(rounded);
    }
    format!("{}", rounded)
}

/// `1e20` as `1E+20` and `1.5e-7` as `1.5E-7`
pub(crate) fn scientific(n: f64) -> String {
    let formatted = format!("{:e}", n);
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}E+{}", mantissa, exp),
        Some((mantissa, exp)) => format!("{}E{}", mantissa, exp),
        None => formatted,
    }
}

// === Arrays ===

static BLANK: FormulaValue = FormulaValue::Blank;

/// A rectangle of values
///
/// Positions are stored sparsely and anything not stored reads as Blank,
/// so a reference to a whole column or sheet costs no more than the cells
/// it actually covers.
#[derive(Debug, Clone)]
pub struct Array {
    height: usize,
    width: usize,
    /// Stored positions as (row, col, value), row-major without repeats
    cells: Vec<(usize, usize, FormulaValue)>,
}

impl Array {
    /// Array holding `rows`, as wide as the narrowest row
    pub fn new(rows: Vec<Vec<FormulaValue>>) -> Self {
        let height = rows.len();
        let width = rows.iter().map(Vec::len).min().unwrap_or(0);
        let mut array = Self::blank(height, width);
        for (row, values) in rows.into_iter().enumerate() {
            for (col, value) in values.into_iter().take(width).enumerate() {
                array.push(row, col, value);
            }
        }
        array
    }

    /// Array with nothing stored
    pub const fn blank(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            cells: Vec::new(),
        }
    }

    /// Store a value
    ///
    /// Positions must arrive in row-major order. One outside the array or
    /// out of order is dropped.
    pub fn push(&mut self, row: usize, col: usize, value: FormulaValue) {
        let in_order = self
            .cells
            .last()
            .map_or(true, |&(r, c, _)| (r, c) < (row, col));
        if in_order && row < self.height && col < self.width {
            self.cells.push((row, col, value));
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of positions, stored or not
    pub fn size(&self) -> u64 {
        self.height as u64 * self.width as u64
    }

    /// Number of positions that were never stored
    pub fn unstored(&self) -> u64 {
        self.size() - self.cells.len() as u64
    }

    /// Value at a position; Blank where nothing is stored
    pub fn get(&self, row: usize, col: usize) -> &FormulaValue {
        self.cells
            .binary_search_by(|&(r, c, _)| (r, c).cmp(&(row, col)))
            .map_or(&BLANK, |i| &self.cells[i].2)
    }

    /// Stored values, row-major
    pub fn stored(&self) -> impl Iterator<Item = &FormulaValue> {
        self.cells.iter().map(|(_, _, value)| value)
    }

    /// One row, left to right
    pub fn row(&self, row: usize) -> impl Iterator<Item = &FormulaValue> + '_ {
        (0..self.width).map(move |col| self.get(row, col))
    }

    /// One column, top to bottom
    pub fn column(&self, col: usize) -> impl Iterator<Item = &FormulaValue> + '_ {
        (0..self.height).map(move |row| self.get(row, col))
    }

    /// The part of the array at most `height` × `width` starting at (`row`, `col`)
    pub fn slice(&self, row: usize, col: usize, height: usize, width: usize) -> Array {
        let height = height.min(self.height.saturating_sub(row));
        let width = width.min(self.width.saturating_sub(col));
        let mut result = Array::blank(height, width);
        for (r, c, value) in &self.cells {
            if (row..row + height).contains(r) && (col..col + width).contains(c) {
                result.push(r - row, c - col, value.clone());
            }
        }
        result
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.height == other.height
            && self.width == other.width
            && (0..self.height).all(|row| self.row(row).eq(other.row(row)))
    }
}

impl From<Vec<Vec<FormulaValue>>> for Array {
    fn from(rows: Vec<Vec<FormulaValue>>) -> Self {
        Array::new(rows)
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaValue::Number(n) => f.write_str(&format_number(*n)),
            FormulaValue::String(s) => f.write_str(s),
            FormulaValue::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            FormulaValue::Error(e) => write!(f, "{}", e),
            FormulaValue::Blank => Ok(()),
            FormulaValue::Array(array) => {
                f.write_str("{")?;
                for i in 0..array.height() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    for (j, value) in array.row(i).enumerate() {
                        if j > 0 {
                            f.write_str(",")?;
                        }
                        match value {
                            FormulaValue::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\""))?,
                            other => write!(f, "{}", other)?,
                        }
                    }
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&CellValue> for FormulaValue {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Empty => FormulaValue::Blank,
            CellValue::Number(n) => FormulaValue::Number(*n),
            CellValue::String(s) => FormulaValue::String(s.as_str().to_string()),
            CellValue::Boolean(b) => FormulaValue::Boolean(*b),
            CellValue::Error(e) => FormulaValue::Error(*e),
        }
    }
}

impl From<CellValue> for FormulaValue {
    fn from(value: CellValue) -> Self {
        FormulaValue::from(&value)
    }
}

impl From<FormulaValue> for CellValue {
    fn from(value: FormulaValue) -> Self {
        match value.scalar() {
            FormulaValue::Blank => CellValue::Empty,
            FormulaValue::Number(n) => CellValue::Number(n),
            FormulaValue::String(s) => CellValue::string(s),
            FormulaValue::Boolean(b) => CellValue::Boolean(b),
            FormulaValue::Error(e) => CellValue::Error(e),
            FormulaValue::Array(_) => CellValue::Error(CellError::Value),
        }
    }
}

impl From<f64> for FormulaValue {
    fn from(n: f64) -> Self {
        FormulaValue::Number(n)
    }
}

impl From<bool> for FormulaValue {
    fn from(b: bool) -> Self {
        FormulaValue::Boolean(b)
    }
}

impl From<&str> for FormulaValue {
    fn from(s: &str) -> Self {
        FormulaValue::String(s.to_string())
    }
}

impl From<String> for FormulaValue {
    fn from(s: String) -> Self {
        FormulaValue::String(s)
    }
}

impl From<CellError> for FormulaValue {
    fn from(e: CellError) -> Self {
        FormulaValue::Error(e)
    }
}
