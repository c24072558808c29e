//! Logical functions

use gridcalc_core::CellError;

use super::{ArgKind, FunctionDef};
use crate::value::FormulaValue;

use ArgKind::*;

pub static FUNCTIONS: &[FunctionDef] = &[
    FunctionDef { name: "IF", min_args: 2, max_args: Some(3), args: &[Boolean, Unchecked], implementation: fn_if },
    FunctionDef { name: "AND", min_args: 1, max_args: None, args: &[Values], implementation: fn_and },
    FunctionDef { name: "OR", min_args: 1, max_args: None, args: &[Values], implementation: fn_or },
    FunctionDef { name: "XOR", min_args: 1, max_args: None, args: &[Values], implementation: fn_xor },
    FunctionDef { name: "NOT", min_args: 1, max_args: Some(1), args: &[Boolean], implementation: fn_not },
    FunctionDef { name: "TRUE", min_args: 0, max_args: Some(0), args: &[], implementation: fn_true },
    FunctionDef { name: "FALSE", min_args: 0, max_args: Some(0), args: &[], implementation: fn_false },
    FunctionDef { name: "IFERROR", min_args: 2, max_args: Some(2), args: &[Unchecked], implementation: fn_iferror },
    FunctionDef { name: "IFNA", min_args: 2, max_args: Some(2), args: &[Unchecked], implementation: fn_ifna },
];

/// IF function
///
/// The condition is already a boolean. A missing else branch yields FALSE.
pub fn fn_if(args: &[FormulaValue]) -> FormulaValue {
    let condition = matches!(args.first(), Some(FormulaValue::Boolean(true)));
    let branch = if condition { args.get(1) } else { args.get(2) };
    branch.cloned().unwrap_or(FormulaValue::Boolean(false))
}

/// Booleans from a `Values` argument list
///
/// Direct text must spell TRUE or FALSE; inside ranges text is skipped.
/// `#VALUE!` when nothing logical was found.
fn collect_bools(args: &[FormulaValue]) -> Result<Vec<bool>, CellError> {
    let mut bools = Vec::new();
    for arg in args {
        match arg {
            FormulaValue::Array(array) => {
                for value in array.stored() {
                    match value {
                        FormulaValue::Boolean(b) => bools.push(*b),
                        FormulaValue::Number(n) => bools.push(*n != 0.0),
                        FormulaValue::Error(e) => return Err(*e),
                        _ => {}
                    }
                }
            }
            FormulaValue::Blank => {}
            scalar => bools.push(scalar.to_bool()?),
        }
    }
    if bools.is_empty() {
        return Err(CellError::Value);
    }
    Ok(bools)
}

fn logical(args: &[FormulaValue], f: impl FnOnce(Vec<bool>) -> bool) -> FormulaValue {
    match collect_bools(args) {
        Ok(bools) => FormulaValue::Boolean(f(bools)),
        Err(e) => FormulaValue::Error(e),
    }
}

/// AND function
pub fn fn_and(args: &[FormulaValue]) -> FormulaValue {
    logical(args, |bools| bools.iter().all(|b| *b))
}

/// OR function
pub fn fn_or(args: &[FormulaValue]) -> FormulaValue {
    logical(args, |bools| bools.iter().any(|b| *b))
}

/// XOR function: true when an odd number of arguments are true
pub fn fn_xor(args: &[FormulaValue]) -> FormulaValue {
    logical(args, |bools| bools.iter().filter(|b| **b).count() % 2 == 1)
}

/// NOT function
pub fn fn_not(args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::Boolean(!matches!(args.first(), Some(FormulaValue::Boolean(true))))
}

/// TRUE()
pub fn fn_true(_args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::Boolean(true)
}

/// FALSE()
pub fn fn_false(_args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::Boolean(false)
}

fn value_error(value: &FormulaValue) -> Option<CellError> {
    value.clone().scalar().error()
}

/// IFERROR(value, value_if_error)
pub fn fn_iferror(args: &[FormulaValue]) -> FormulaValue {
    match args {
        [value, fallback] if value_error(value).is_some() => fallback.clone(),
        [value, _] => value.clone(),
        _ => FormulaValue::Error(CellError::Value),
    }
}

/// IFNA(value, value_if_na)
pub fn fn_ifna(args: &[FormulaValue]) -> FormulaValue {
    match args {
        [value, fallback] if value_error(value) == Some(CellError::Na) => fallback.clone(),
        [value, _] => value.clone(),
        _ => FormulaValue::Error(CellError::Value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_aggregates() {
        let range = FormulaValue::Array(
            vec![vec![
                FormulaValue::Boolean(true),
                FormulaValue::from("text"),
                FormulaValue::Number(0.0),
            ]]
            .into(),
        );
        assert_eq!(fn_and(&[range.clone()]), FormulaValue::Boolean(false));
        assert_eq!(fn_or(&[range.clone()]), FormulaValue::Boolean(true));
        assert_eq!(fn_xor(&[range, FormulaValue::Boolean(true)]), FormulaValue::Boolean(false));
        assert_eq!(
            fn_and(&[FormulaValue::from("maybe")]),
            FormulaValue::Error(CellError::Value)
        );
        assert_eq!(
            fn_or(&[FormulaValue::Array(vec![vec![FormulaValue::Blank]].into())]),
            FormulaValue::Error(CellError::Value)
        );
    }

    #[test]
    fn test_error_fallbacks() {
        let na = FormulaValue::Error(CellError::Na);
        let div0 = FormulaValue::Error(CellError::Div0);
        let zero = FormulaValue::Number(0.0);
        assert_eq!(fn_iferror(&[div0.clone(), zero.clone()]), zero);
        assert_eq!(fn_ifna(&[div0.clone(), zero.clone()]), div0);
        assert_eq!(fn_ifna(&[na, zero.clone()]), zero);
    }
}
