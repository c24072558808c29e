//! Text functions
//!
//! Lengths and positions count characters, not bytes.

use gridcalc_core::CellError;

use super::{number_arg, text_arg, ArgKind, FunctionDef};
use crate::value::{parse_number, FormulaValue};

use ArgKind::*;

/// Longest text a function may produce
pub const MAX_TEXT_LEN: usize = 32_767;

pub static FUNCTIONS: &[FunctionDef] = &[
    FunctionDef { name: "CONCATENATE", min_args: 1, max_args: None, args: &[Text], implementation: fn_concatenate },
    FunctionDef { name: "LEN", min_args: 1, max_args: Some(1), args: &[Text], implementation: fn_len },
    FunctionDef { name: "LEFT", min_args: 1, max_args: Some(2), args: &[Text, Number], implementation: fn_left },
    FunctionDef { name: "RIGHT", min_args: 1, max_args: Some(2), args: &[Text, Number], implementation: fn_right },
    FunctionDef { name: "MID", min_args: 3, max_args: Some(3), args: &[Text, Number, Number], implementation: fn_mid },
    FunctionDef { name: "UPPER", min_args: 1, max_args: Some(1), args: &[Text], implementation: fn_upper },
    FunctionDef { name: "LOWER", min_args: 1, max_args: Some(1), args: &[Text], implementation: fn_lower },
    FunctionDef { name: "TRIM", min_args: 1, max_args: Some(1), args: &[Text], implementation: fn_trim },
    FunctionDef { name: "REPT", min_args: 2, max_args: Some(2), args: &[Text, Number], implementation: fn_rept },
    FunctionDef { name: "EXACT", min_args: 2, max_args: Some(2), args: &[Text], implementation: fn_exact },
    FunctionDef { name: "VALUE", min_args: 1, max_args: Some(1), args: &[Text], implementation: fn_value },
];

fn text_result(s: String) -> FormulaValue {
    if s.chars().count() > MAX_TEXT_LEN {
        FormulaValue::Error(CellError::Value)
    } else {
        FormulaValue::String(s)
    }
}

/// Character count argument; negative counts are `#VALUE!`
fn count_arg(args: &[FormulaValue], index: usize, default: f64) -> Result<usize, CellError> {
    let n = number_arg(args, index, default).trunc();
    if n < 0.0 {
        Err(CellError::Value)
    } else {
        Ok(n.min(usize::MAX as f64) as usize)
    }
}

/// CONCATENATE(text1, [text2], ...)
pub fn fn_concatenate(args: &[FormulaValue]) -> FormulaValue {
    let joined: String = (0..args.len()).map(|i| text_arg(args, i)).collect();
    text_result(joined)
}

/// LEN(text)
pub fn fn_len(args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::Number(text_arg(args, 0).chars().count() as f64)
}

/// LEFT(text, [num_chars])
pub fn fn_left(args: &[FormulaValue]) -> FormulaValue {
    match count_arg(args, 1, 1.0) {
        Ok(count) => FormulaValue::String(text_arg(args, 0).chars().take(count).collect()),
        Err(e) => FormulaValue::Error(e),
    }
}

/// RIGHT(text, [num_chars])
pub fn fn_right(args: &[FormulaValue]) -> FormulaValue {
    match count_arg(args, 1, 1.0) {
        Ok(count) => {
            let text = text_arg(args, 0);
            let skip = text.chars().count().saturating_sub(count);
            FormulaValue::String(text.chars().skip(skip).collect())
        }
        Err(e) => FormulaValue::Error(e),
    }
}

/// MID(text, start_num, num_chars); start_num is 1-based
pub fn fn_mid(args: &[FormulaValue]) -> FormulaValue {
    let start = number_arg(args, 1, 0.0).trunc();
    if start < 1.0 {
        return FormulaValue::Error(CellError::Value);
    }
    match count_arg(args, 2, 0.0) {
        Ok(count) => FormulaValue::String(
            text_arg(args, 0)
                .chars()
                .skip(start as usize - 1)
                .take(count)
                .collect(),
        ),
        Err(e) => FormulaValue::Error(e),
    }
}

/// UPPER(text)
pub fn fn_upper(args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::String(text_arg(args, 0).to_uppercase())
}

/// LOWER(text)
pub fn fn_lower(args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::String(text_arg(args, 0).to_lowercase())
}

/// TRIM(text): strip leading and trailing spaces, collapse inner runs to one
pub fn fn_trim(args: &[FormulaValue]) -> FormulaValue {
    let text = text_arg(args, 0);
    let words: Vec<&str> = text.split(' ').filter(|w| !w.is_empty()).collect();
    FormulaValue::String(words.join(" "))
}

/// REPT(text, times)
pub fn fn_rept(args: &[FormulaValue]) -> FormulaValue {
    let text = text_arg(args, 0);
    match count_arg(args, 1, 0.0) {
        Ok(times) if text.is_empty() || times <= MAX_TEXT_LEN => text_result(text.repeat(times)),
        Ok(_) => FormulaValue::Error(CellError::Value),
        Err(e) => FormulaValue::Error(e),
    }
}

/// EXACT(text1, text2): case-sensitive comparison
pub fn fn_exact(args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::Boolean(text_arg(args, 0) == text_arg(args, 1))
}

/// VALUE(text)
pub fn fn_value(args: &[FormulaValue]) -> FormulaValue {
    match parse_number(&text_arg(args, 0)) {
        Some(n) => FormulaValue::Number(n),
        None => FormulaValue::Error(CellError::Value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> FormulaValue {
        FormulaValue::from(v)
    }

    fn n(v: f64) -> FormulaValue {
        FormulaValue::Number(v)
    }

    #[test]
    fn test_substrings_count_characters() {
        assert_eq!(fn_left(&[s("héllo"), n(2.0)]), s("hé"));
        assert_eq!(fn_right(&[s("héllo"), n(3.0)]), s("llo"));
        assert_eq!(fn_right(&[s("ab"), n(5.0)]), s("ab"));
        assert_eq!(fn_mid(&[s("spreadsheet"), n(7.0), n(20.0)]), s("sheet"));
        assert_eq!(fn_mid(&[s("x"), n(0.0), n(1.0)]), FormulaValue::Error(CellError::Value));
        assert_eq!(fn_left(&[s("x"), n(-1.0)]), FormulaValue::Error(CellError::Value));
        assert_eq!(fn_len(&[s("héllo")]), n(5.0));
    }

    #[test]
    fn test_trim_and_rept() {
        assert_eq!(fn_trim(&[s("  a   b  ")]), s("a b"));
        assert_eq!(fn_rept(&[s("ab"), n(3.0)]), s("ababab"));
        assert_eq!(fn_rept(&[s("ab"), n(20_000.0)]), FormulaValue::Error(CellError::Value));
    }

    #[test]
    fn test_exact_and_value() {
        assert_eq!(fn_exact(&[s("Word"), s("word")]), FormulaValue::Boolean(false));
        assert_eq!(fn_value(&[s(" 12.5 ")]), n(12.5));
        assert_eq!(fn_value(&[s("12x")]), FormulaValue::Error(CellError::Value));
    }
}
