//! Lookup and reference functions

use std::cmp::Ordering;

use gridcalc_core::CellError;

use super::{number_arg, range_arg, ArgKind, FunctionDef};
use crate::value::FormulaValue;

use ArgKind::*;

pub static FUNCTIONS: &[FunctionDef] = &[
    FunctionDef { name: "VLOOKUP", min_args: 3, max_args: Some(4), args: &[Any, Range, Number, Boolean], implementation: fn_vlookup },
    FunctionDef { name: "HLOOKUP", min_args: 3, max_args: Some(4), args: &[Any, Range, Number, Boolean], implementation: fn_hlookup },
    FunctionDef { name: "MATCH", min_args: 2, max_args: Some(3), args: &[Any, Range, Number], implementation: fn_match },
    FunctionDef { name: "INDEX", min_args: 2, max_args: Some(3), args: &[Range, Number, Number], implementation: fn_index },
    FunctionDef { name: "CHOOSE", min_args: 2, max_args: None, args: &[Number, Unchecked], implementation: fn_choose },
    FunctionDef { name: "ROWS", min_args: 1, max_args: Some(1), args: &[Range], implementation: fn_rows },
    FunctionDef { name: "COLUMNS", min_args: 1, max_args: Some(1), args: &[Range], implementation: fn_columns },
];

/// How a lookup key is matched against a vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchMode {
    /// First value equal to the key
    Exact,
    /// Largest value not above the key, vector sorted ascending
    NotAbove,
    /// Smallest value not below the key, vector sorted descending
    NotBelow,
}

/// Position of `key` in `values` under `mode`
///
/// Values of a different type than the key are skipped. Approximate modes
/// stop at the first value past the key, as the vector is assumed sorted.
fn find_position<'a>(
    values: impl Iterator<Item = &'a FormulaValue>,
    key: &FormulaValue,
    mode: MatchMode,
) -> Option<usize> {
    let mut candidate = None;
    for (i, value) in values.enumerate() {
        if value.is_blank() || !value.same_type(key) {
            continue;
        }
        let ordering = value.compare(key);
        match mode {
            MatchMode::Exact if ordering == Ordering::Equal => return Some(i),
            MatchMode::Exact => {}
            MatchMode::NotAbove if ordering != Ordering::Greater => candidate = Some(i),
            MatchMode::NotBelow if ordering != Ordering::Less => candidate = Some(i),
            _ => break,
        }
    }
    candidate
}

fn index_arg(args: &[FormulaValue], index: usize, default: f64) -> i64 {
    number_arg(args, index, default).trunc() as i64
}

fn approximate_mode(args: &[FormulaValue]) -> MatchMode {
    match args.get(3) {
        Some(FormulaValue::Boolean(false)) => MatchMode::Exact,
        _ => MatchMode::NotAbove,
    }
}

fn key_arg(args: &[FormulaValue]) -> FormulaValue {
    args.first().cloned().unwrap_or(FormulaValue::Blank)
}

/// VLOOKUP(lookup_value, table, col_index, [range_lookup])
pub fn fn_vlookup(args: &[FormulaValue]) -> FormulaValue {
    let key = key_arg(args);
    let table = range_arg(args, 1);

    let col = index_arg(args, 2, 0.0);
    if col < 1 {
        return FormulaValue::Error(CellError::Value);
    }
    if col as usize > table.width() {
        return FormulaValue::Error(CellError::Ref);
    }

    match find_position(table.column(0), &key, approximate_mode(args)) {
        Some(row) => table.get(row, col as usize - 1).clone(),
        None => FormulaValue::Error(CellError::Na),
    }
}

/// HLOOKUP(lookup_value, table, row_index, [range_lookup])
pub fn fn_hlookup(args: &[FormulaValue]) -> FormulaValue {
    let key = key_arg(args);
    let table = range_arg(args, 1);

    let row = index_arg(args, 2, 0.0);
    if row < 1 {
        return FormulaValue::Error(CellError::Value);
    }
    if row as usize > table.height() {
        return FormulaValue::Error(CellError::Ref);
    }

    match find_position(table.row(0), &key, approximate_mode(args)) {
        Some(col) => table.get(row as usize - 1, col).clone(),
        None => FormulaValue::Error(CellError::Na),
    }
}

/// MATCH(lookup_value, lookup_vector, [match_type])
///
/// match_type 1 (default) finds the largest value not above the key, 0 an
/// exact match, -1 the smallest value not below the key.
pub fn fn_match(args: &[FormulaValue]) -> FormulaValue {
    let key = key_arg(args);
    let vector = range_arg(args, 1);

    let mode = match index_arg(args, 2, 1.0) {
        0 => MatchMode::Exact,
        t if t > 0 => MatchMode::NotAbove,
        _ => MatchMode::NotBelow,
    };

    let position = if vector.height() == 1 {
        find_position(vector.row(0), &key, mode)
    } else if vector.width() == 1 {
        find_position(vector.column(0), &key, mode)
    } else {
        None
    };

    match position {
        Some(i) => FormulaValue::Number((i + 1) as f64),
        None => FormulaValue::Error(CellError::Na),
    }
}

/// INDEX(array, row_num, [col_num])
///
/// A zero row or column selects the whole column or row. With a single row
/// and no column, the second argument picks the column.
pub fn fn_index(args: &[FormulaValue]) -> FormulaValue {
    let array = range_arg(args, 0);
    let (height, width) = (array.height(), array.width());
    if height == 0 || width == 0 {
        return FormulaValue::Error(CellError::Ref);
    }

    let (row, col) = match args.get(2) {
        None if height == 1 => (1, index_arg(args, 1, 0.0)),
        None => (index_arg(args, 1, 0.0), if width == 1 { 1 } else { 0 }),
        Some(_) => (index_arg(args, 1, 0.0), index_arg(args, 2, 0.0)),
    };

    if row < 0 || col < 0 {
        return FormulaValue::Error(CellError::Value);
    }
    if row as usize > height || col as usize > width {
        return FormulaValue::Error(CellError::Ref);
    }

    match (row as usize, col as usize) {
        (0, 0) => FormulaValue::Array(array.clone()),
        (0, c) => FormulaValue::Array(array.slice(0, c - 1, height, 1)),
        (r, 0) => FormulaValue::Array(array.slice(r - 1, 0, 1, width)),
        (r, c) => array.get(r - 1, c - 1).clone(),
    }
}

/// CHOOSE(index, value1, [value2], ...)
pub fn fn_choose(args: &[FormulaValue]) -> FormulaValue {
    let index = index_arg(args, 0, 0.0);
    if index < 1 || index as usize >= args.len() {
        return FormulaValue::Error(CellError::Value);
    }
    args[index as usize].clone()
}

/// ROWS(array)
pub fn fn_rows(args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::Number(range_arg(args, 0).height() as f64)
}

/// COLUMNS(array)
pub fn fn_columns(args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::Number(range_arg(args, 0).width() as f64)
}
