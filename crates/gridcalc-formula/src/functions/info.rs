//! Information functions
//!
//! These take their argument unchecked, so an error value is inspected
//! rather than propagated. A reference larger than one cell is not a single
//! value and reads as `#VALUE!`.

use gridcalc_core::CellError;

use super::{ArgKind, FunctionDef};
use crate::value::FormulaValue;

use ArgKind::*;

pub static FUNCTIONS: &[FunctionDef] = &[
    FunctionDef { name: "ISERROR", min_args: 1, max_args: Some(1), args: &[Unchecked], implementation: fn_iserror },
    FunctionDef { name: "ISERR", min_args: 1, max_args: Some(1), args: &[Unchecked], implementation: fn_iserr },
    FunctionDef { name: "ISNA", min_args: 1, max_args: Some(1), args: &[Unchecked], implementation: fn_isna },
    FunctionDef { name: "ISBLANK", min_args: 1, max_args: Some(1), args: &[Unchecked], implementation: fn_isblank },
    FunctionDef { name: "ISNUMBER", min_args: 1, max_args: Some(1), args: &[Unchecked], implementation: fn_isnumber },
    FunctionDef { name: "ISTEXT", min_args: 1, max_args: Some(1), args: &[Unchecked], implementation: fn_istext },
    FunctionDef { name: "ISLOGICAL", min_args: 1, max_args: Some(1), args: &[Unchecked], implementation: fn_islogical },
    FunctionDef { name: "NA", min_args: 0, max_args: Some(0), args: &[], implementation: fn_na },
];

fn test_value(args: &[FormulaValue], predicate: impl FnOnce(&FormulaValue) -> bool) -> FormulaValue {
    let value = args.first().cloned().unwrap_or(FormulaValue::Blank).scalar();
    FormulaValue::Boolean(predicate(&value))
}

/// ISERROR(value)
pub fn fn_iserror(args: &[FormulaValue]) -> FormulaValue {
    test_value(args, FormulaValue::is_error)
}

/// ISERR(value): any error except #N/A
pub fn fn_iserr(args: &[FormulaValue]) -> FormulaValue {
    test_value(args, |v| v.is_error() && v.error() != Some(CellError::Na))
}

/// ISNA(value)
pub fn fn_isna(args: &[FormulaValue]) -> FormulaValue {
    test_value(args, |v| v.error() == Some(CellError::Na))
}

/// ISBLANK(value)
pub fn fn_isblank(args: &[FormulaValue]) -> FormulaValue {
    test_value(args, FormulaValue::is_blank)
}

/// ISNUMBER(value)
pub fn fn_isnumber(args: &[FormulaValue]) -> FormulaValue {
    test_value(args, |v| matches!(v, FormulaValue::Number(_)))
}

/// ISTEXT(value)
pub fn fn_istext(args: &[FormulaValue]) -> FormulaValue {
    test_value(args, |v| matches!(v, FormulaValue::String(_)))
}

/// ISLOGICAL(value)
pub fn fn_islogical(args: &[FormulaValue]) -> FormulaValue {
    test_value(args, |v| matches!(v, FormulaValue::Boolean(_)))
}

/// NA()
pub fn fn_na(_args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::Error(CellError::Na)
}
