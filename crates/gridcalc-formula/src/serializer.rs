//! Formula serializer
//!
//! Turns an AST back into canonical formula text: a leading `=`, no
//! whitespace, upper-case function names, and parentheses only where the
//! parser would otherwise group differently. Parsing the output yields the
//! same tree.

use std::borrow::Cow;
use std::fmt::Write;

use lazy_regex::regex_is_match;

use crate::ast::{BinaryOperator, FormulaExpr, SheetRef, UnaryOperator};
use crate::value::scientific;
use gridcalc_core::CellAddress;

/// Serialize an AST to formula text
///
/// # Example
/// ```rust
/// use gridcalc_formula::{parse_formula, serialize_formula};
///
/// let ast = parse_formula("= sum( a1 , 'Data'!B2:b3 )").unwrap();
/// assert_eq!(serialize_formula(&ast), "=SUM(A1,Data!B2:B3)");
/// ```
pub fn serialize_formula(expr: &FormulaExpr) -> String {
    let mut out = String::from("=");
    write_expr(&mut out, expr);
    out
}

/// Quote a sheet name for use in a reference when it needs it
pub fn quote_sheet_name(name: &str) -> Cow<'_, str> {
    if needs_quotes(name) {
        Cow::Owned(format!("'{}'", name.replace('\'', "''")))
    } else {
        Cow::Borrowed(name)
    }
}

fn needs_quotes(name: &str) -> bool {
    !regex_is_match!(r"^[\p{L}_][\p{L}\p{N}_.]*$", name)
        || CellAddress::parse(name).is_ok()
        || name.eq_ignore_ascii_case("TRUE")
        || name.eq_ignore_ascii_case("FALSE")
}

fn write_sheet_prefix(out: &mut String, sheet: &Option<SheetRef>) {
    match sheet {
        None => {}
        Some(SheetRef::Single(name)) => {
            out.push_str(&quote_sheet_name(name));
            out.push('!');
        }
        Some(SheetRef::Span(first, last)) => {
            if needs_quotes(first) || needs_quotes(last) {
                let _ = write!(
                    out,
                    "'{}:{}'!",
                    first.replace('\'', "''"),
                    last.replace('\'', "''")
                );
            } else {
                let _ = write!(out, "{}:{}!", first, last);
            }
        }
    }
}

fn write_number(out: &mut String, n: f64) {
    let abs = n.abs();
    if abs != 0.0 && !(1e-5..1e15).contains(&abs) {
        out.push_str(&scientific(n));
    } else {
        let _ = write!(out, "{}", n);
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    out.push_str(&s.replace('"', "\"\""));
    out.push('"');
}

/// Primaries parse on their own without any grouping
fn is_primary(expr: &FormulaExpr) -> bool {
    !matches!(
        expr,
        FormulaExpr::BinaryOp { .. } | FormulaExpr::UnaryOp { .. }
    ) && !matches!(expr, FormulaExpr::Number(n) if *n < 0.0)
}

fn write_grouped(out: &mut String, expr: &FormulaExpr, group: bool) {
    if group {
        out.push('(');
        write_expr(out, expr);
        out.push(')');
    } else {
        write_expr(out, expr);
    }
}

fn write_expr(out: &mut String, expr: &FormulaExpr) {
    match expr {
        FormulaExpr::Number(n) => write_number(out, *n),
        FormulaExpr::String(s) => write_string(out, s),
        FormulaExpr::Boolean(b) => out.push_str(if *b { "TRUE" } else { "FALSE" }),
        FormulaExpr::Error(e) => out.push_str(e.as_str()),

        FormulaExpr::CellRef(r) => {
            write_sheet_prefix(out, &r.sheet);
            out.push_str(&r.address.to_a1_string());
        }
        FormulaExpr::RangeRef(r) => {
            write_sheet_prefix(out, &r.sheet);
            out.push_str(&r.range.to_a1_string());
        }
        FormulaExpr::NameRef(r) => {
            write_sheet_prefix(out, &r.sheet);
            out.push_str(&r.name);
        }

        FormulaExpr::BinaryOp { op, left, right } => {
            let (group_left, group_right) = match op {
                // Operands of ':' are parsed as primaries
                BinaryOperator::Range => (!is_primary(left), !is_primary(right)),
                _ => {
                    let p = op.precedence();
                    (
                        binding(left).map_or(false, |lp| lp < p) || negative_base(*op, left),
                        binding(right).map_or(false, |rp| rp <= p),
                    )
                }
            };
            write_grouped(out, left, group_left);
            out.push_str(op.symbol());
            write_grouped(out, right, group_right);
        }

        FormulaExpr::UnaryOp { op, operand } => match op {
            UnaryOperator::Percent => {
                // Operand is parsed at range level
                let group = match operand.as_ref() {
                    FormulaExpr::BinaryOp { op, .. } => *op != BinaryOperator::Range,
                    FormulaExpr::UnaryOp { op, .. } => *op != UnaryOperator::Percent,
                    FormulaExpr::Number(n) => *n < 0.0,
                    _ => false,
                };
                write_grouped(out, operand, group);
                out.push('%');
            }
            UnaryOperator::Plus | UnaryOperator::Negate => {
                out.push(if *op == UnaryOperator::Plus { '+' } else { '-' });
                let group = matches!(
                    operand.as_ref(),
                    FormulaExpr::BinaryOp { op, .. } if *op != BinaryOperator::Range
                );
                write_grouped(out, operand, group);
            }
        },

        FormulaExpr::Paren(inner) => {
            out.push('(');
            write_expr(out, inner);
            out.push(')');
        }

        FormulaExpr::Function { name, args } => {
            out.push_str(&name.to_uppercase());
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_expr(out, arg);
            }
            out.push(')');
        }

        FormulaExpr::Array(rows) => {
            out.push('{');
            for (i, row) in rows.iter().enumerate() {
                if i > 0 {
                    out.push(';');
                }
                for (j, element) in row.iter().enumerate() {
                    if j > 0 {
                        out.push(',');
                    }
                    write_expr(out, element);
                }
            }
            out.push('}');
        }
    }
}

/// A negative literal raised to a power is written `(-2)^2`, never `-2^2`
fn negative_base(op: BinaryOperator, left: &FormulaExpr) -> bool {
    op == BinaryOperator::Power && matches!(left, FormulaExpr::Number(n) if *n < 0.0)
}

/// Precedence of an infix child, `None` when it cannot be split by an
/// operator of lower precedence
fn binding(expr: &FormulaExpr) -> Option<u8> {
    match expr {
        FormulaExpr::BinaryOp { op, .. } if *op != BinaryOperator::Range => Some(op.precedence()),
        _ => None,
    }
}
