//! Math and aggregate functions

use gridcalc_core::CellError;

use super::{collect_numbers, finite, number_arg, range_arg, ArgKind, FunctionDef};
use crate::value::FormulaValue;

use ArgKind::*;

pub static FUNCTIONS: &[FunctionDef] = &[
    FunctionDef { name: "SUM", min_args: 1, max_args: None, args: &[Values], implementation: fn_sum },
    FunctionDef { name: "PRODUCT", min_args: 1, max_args: None, args: &[Values], implementation: fn_product },
    FunctionDef { name: "AVERAGE", min_args: 1, max_args: None, args: &[Values], implementation: fn_average },
    FunctionDef { name: "MIN", min_args: 1, max_args: None, args: &[Values], implementation: fn_min },
    FunctionDef { name: "MAX", min_args: 1, max_args: None, args: &[Values], implementation: fn_max },
    FunctionDef { name: "COUNT", min_args: 1, max_args: None, args: &[Unchecked], implementation: fn_count },
    FunctionDef { name: "COUNTA", min_args: 1, max_args: None, args: &[Unchecked], implementation: fn_counta },
    FunctionDef { name: "COUNTBLANK", min_args: 1, max_args: Some(1), args: &[Range], implementation: fn_countblank },
    FunctionDef { name: "ABS", min_args: 1, max_args: Some(1), args: &[Number], implementation: fn_abs },
    FunctionDef { name: "INT", min_args: 1, max_args: Some(1), args: &[Number], implementation: fn_int },
    FunctionDef { name: "MOD", min_args: 2, max_args: Some(2), args: &[Number], implementation: fn_mod },
    FunctionDef { name: "POWER", min_args: 2, max_args: Some(2), args: &[Number], implementation: fn_power },
    FunctionDef { name: "SQRT", min_args: 1, max_args: Some(1), args: &[Number], implementation: fn_sqrt },
    FunctionDef { name: "ROUND", min_args: 1, max_args: Some(2), args: &[Number], implementation: fn_round },
    FunctionDef { name: "ROUNDUP", min_args: 1, max_args: Some(2), args: &[Number], implementation: fn_roundup },
    FunctionDef { name: "ROUNDDOWN", min_args: 1, max_args: Some(2), args: &[Number], implementation: fn_rounddown },
    FunctionDef { name: "TRUNC", min_args: 1, max_args: Some(2), args: &[Number], implementation: fn_rounddown },
    FunctionDef { name: "SIGN", min_args: 1, max_args: Some(1), args: &[Number], implementation: fn_sign },
    FunctionDef { name: "PI", min_args: 0, max_args: Some(0), args: &[], implementation: fn_pi },
];

/// Apply `f` to the collected numbers, or return the error that stopped collection
fn aggregate(args: &[FormulaValue], f: impl FnOnce(Vec<f64>) -> FormulaValue) -> FormulaValue {
    match collect_numbers(args) {
        Ok(numbers) => f(numbers),
        Err(e) => FormulaValue::Error(e),
    }
}

/// SUM function
pub fn fn_sum(args: &[FormulaValue]) -> FormulaValue {
    aggregate(args, |numbers| finite(numbers.iter().sum()))
}

/// PRODUCT function; 0 when there is nothing to multiply
pub fn fn_product(args: &[FormulaValue]) -> FormulaValue {
    aggregate(args, |numbers| {
        if numbers.is_empty() {
            FormulaValue::Number(0.0)
        } else {
            finite(numbers.iter().product())
        }
    })
}

/// AVERAGE function
pub fn fn_average(args: &[FormulaValue]) -> FormulaValue {
    aggregate(args, |numbers| {
        if numbers.is_empty() {
            FormulaValue::Error(CellError::Div0)
        } else {
            finite(numbers.iter().sum::<f64>() / numbers.len() as f64)
        }
    })
}

/// MIN function; 0 when there are no numbers
pub fn fn_min(args: &[FormulaValue]) -> FormulaValue {
    aggregate(args, |numbers| {
        FormulaValue::Number(numbers.into_iter().reduce(f64::min).unwrap_or(0.0))
    })
}

/// MAX function; 0 when there are no numbers
pub fn fn_max(args: &[FormulaValue]) -> FormulaValue {
    aggregate(args, |numbers| {
        FormulaValue::Number(numbers.into_iter().reduce(f64::max).unwrap_or(0.0))
    })
}

/// COUNT function
///
/// Direct arguments count when they are numbers, booleans or numeric text;
/// inside ranges only numbers count. Errors are skipped.
pub fn fn_count(args: &[FormulaValue]) -> FormulaValue {
    let count: usize = args
        .iter()
        .map(|arg| match arg {
            FormulaValue::Array(array) => array
                .stored()
                .filter(|v| matches!(v, FormulaValue::Number(_)))
                .count(),
            FormulaValue::Number(_) | FormulaValue::Boolean(_) => 1,
            FormulaValue::String(_) => usize::from(arg.to_number().is_ok()),
            _ => 0,
        })
        .sum();
    FormulaValue::Number(count as f64)
}

/// COUNTA function: everything that is not blank, errors included
pub fn fn_counta(args: &[FormulaValue]) -> FormulaValue {
    let count: usize = args
        .iter()
        .map(|arg| match arg {
            FormulaValue::Array(array) => array.stored().filter(|v| !v.is_blank()).count(),
            FormulaValue::Blank => 0,
            _ => 1,
        })
        .sum();
    FormulaValue::Number(count as f64)
}

/// COUNTBLANK function: blank cells and empty text
pub fn fn_countblank(args: &[FormulaValue]) -> FormulaValue {
    let array = range_arg(args, 0);
    let stored = array
        .stored()
        .filter(|v| match v {
            FormulaValue::Blank => true,
            FormulaValue::String(s) => s.is_empty(),
            _ => false,
        })
        .count() as u64;
    FormulaValue::Number((stored + array.unstored()) as f64)
}

/// ABS function
pub fn fn_abs(args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::Number(number_arg(args, 0, 0.0).abs())
}

/// INT function: round down to the nearest integer
pub fn fn_int(args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::Number(number_arg(args, 0, 0.0).floor())
}

/// MOD function; the result takes the sign of the divisor
pub fn fn_mod(args: &[FormulaValue]) -> FormulaValue {
    let number = number_arg(args, 0, 0.0);
    let divisor = number_arg(args, 1, 0.0);

    if divisor == 0.0 {
        return FormulaValue::Error(CellError::Div0);
    }
    finite(number - divisor * (number / divisor).floor())
}

/// POWER function
pub fn fn_power(args: &[FormulaValue]) -> FormulaValue {
    power(number_arg(args, 0, 0.0), number_arg(args, 1, 0.0))
}

/// Exponentiation shared by `^` and POWER
///
/// `0^0` is `#NUM!`, zero to a negative power is `#DIV/0!`, and a
/// non-finite result (including negative bases with fractional exponents)
/// is `#NUM!`.
pub fn power(base: f64, exponent: f64) -> FormulaValue {
    if base == 0.0 {
        if exponent == 0.0 {
            return FormulaValue::Error(CellError::Num);
        }
        if exponent < 0.0 {
            return FormulaValue::Error(CellError::Div0);
        }
    }
    finite(base.powf(exponent))
}

/// SQRT function
pub fn fn_sqrt(args: &[FormulaValue]) -> FormulaValue {
    let n = number_arg(args, 0, 0.0);
    if n < 0.0 {
        return FormulaValue::Error(CellError::Num);
    }
    FormulaValue::Number(n.sqrt())
}

fn digits_arg(args: &[FormulaValue]) -> i32 {
    number_arg(args, 1, 0.0).trunc().clamp(-308.0, 308.0) as i32
}

/// Scale `n` by `10^digits`, round the scaled value with `round`, and scale back
fn round_with(n: f64, digits: i32, round: impl Fn(f64) -> f64) -> FormulaValue {
    let factor = 10_f64.powi(digits.abs());
    let scaled = if digits >= 0 { n * factor } else { n / factor };
    if !scaled.is_finite() {
        // Rounding beyond the precision of the value leaves it unchanged
        return FormulaValue::Number(n);
    }
    // Strip representation noise such as 2.675 * 100 = 267.49999999999997
    let scaled: f64 = format!("{:.12e}", scaled).parse().unwrap_or(scaled);
    let rounded = round(scaled);
    finite(if digits >= 0 { rounded / factor } else { rounded * factor })
}

/// ROUND function: half away from zero
pub fn fn_round(args: &[FormulaValue]) -> FormulaValue {
    round_with(number_arg(args, 0, 0.0), digits_arg(args), f64::round)
}

/// ROUNDUP function: away from zero
pub fn fn_roundup(args: &[FormulaValue]) -> FormulaValue {
    round_with(number_arg(args, 0, 0.0), digits_arg(args), |x| {
        x.abs().ceil().copysign(x)
    })
}

/// ROUNDDOWN and TRUNC: toward zero
pub fn fn_rounddown(args: &[FormulaValue]) -> FormulaValue {
    round_with(number_arg(args, 0, 0.0), digits_arg(args), f64::trunc)
}

/// SIGN function
pub fn fn_sign(args: &[FormulaValue]) -> FormulaValue {
    let n = number_arg(args, 0, 0.0);
    FormulaValue::Number(if n > 0.0 {
        1.0
    } else if n < 0.0 {
        -1.0
    } else {
        0.0
    })
}

/// PI function
pub fn fn_pi(_args: &[FormulaValue]) -> FormulaValue {
    FormulaValue::Number(std::f64::consts::PI)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Array;

    fn n(v: f64) -> FormulaValue {
        FormulaValue::Number(v)
    }

    #[test]
    fn test_rounding() {
        assert_eq!(fn_round(&[n(2.5)]), n(3.0));
        assert_eq!(fn_round(&[n(-2.5)]), n(-3.0));
        assert_eq!(fn_round(&[n(2.675), n(2.0)]), n(2.68));
        assert_eq!(fn_round(&[n(1234.0), n(-2.0)]), n(1200.0));
        assert_eq!(fn_roundup(&[n(-1.21), n(1.0)]), n(-1.3));
        assert_eq!(fn_rounddown(&[n(1.29), n(1.0)]), n(1.2));
        assert_eq!(fn_rounddown(&[n(-7.9)]), n(-7.0));
    }

    #[test]
    fn test_mod_sign_follows_divisor() {
        assert_eq!(fn_mod(&[n(-3.0), n(2.0)]), n(1.0));
        assert_eq!(fn_mod(&[n(3.0), n(-2.0)]), n(-1.0));
        assert_eq!(fn_mod(&[n(3.0), n(0.0)]), FormulaValue::Error(CellError::Div0));
    }

    #[test]
    fn test_power_edge_cases() {
        assert_eq!(power(2.0, 10.0), n(1024.0));
        assert_eq!(power(0.0, 0.0), FormulaValue::Error(CellError::Num));
        assert_eq!(power(0.0, -1.0), FormulaValue::Error(CellError::Div0));
        assert_eq!(power(-8.0, 0.5), FormulaValue::Error(CellError::Num));
        assert_eq!(power(10.0, 400.0), FormulaValue::Error(CellError::Num));
    }

    #[test]
    fn test_count_family() {
        let range = FormulaValue::Array(
            vec![
                vec![n(1.0), FormulaValue::from("2"), FormulaValue::Blank],
                vec![FormulaValue::Boolean(true), FormulaValue::Error(CellError::Na), FormulaValue::from("")],
            ]
            .into(),
        );
        assert_eq!(fn_count(&[range.clone(), FormulaValue::from("3"), FormulaValue::Boolean(false)]), n(3.0));
        assert_eq!(fn_counta(&[range.clone()]), n(5.0));
        assert_eq!(fn_countblank(&[range]), n(2.0));

        let mut column = Array::blank(1_048_576, 1);
        column.push(3, 0, n(1.0));
        column.push(9, 0, FormulaValue::from(""));
        assert_eq!(fn_countblank(&[FormulaValue::Array(column)]), n(1_048_575.0));
    }
}
