//! Formula Abstract Syntax Tree types

use gridcalc_core::{CellAddress, CellError, CellRange};

/// Formula expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    // === Literals ===
    /// Numeric literal
    Number(f64),
    /// String literal
    String(String),
    /// Boolean literal
    Boolean(bool),
    /// Error literal
    Error(CellError),

    // === References ===
    /// Single cell reference
    CellRef(CellReference),
    /// Range reference
    RangeRef(RangeReference),
    /// Defined name
    NameRef(NameReference),

    // === Operators ===
    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },
    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<FormulaExpr>,
    },
    /// Parenthesized sub-expression, kept so text round-trips
    Paren(Box<FormulaExpr>),

    // === Function call ===
    /// Built-in or user-defined function call; `name` is upper-cased
    Function { name: String, args: Vec<FormulaExpr> },

    // === Array ===
    /// Constant array such as `{1,2;3,4}`, row-major
    Array(Vec<Vec<FormulaExpr>>),
}

/// Sheet qualifier on a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetRef {
    /// `Sheet1!A1`
    Single(String),
    /// `Sheet1:Sheet3!A1`
    Span(String, String),
}

impl SheetRef {
    /// Case-insensitive comparison, matching how sheets are looked up
    pub fn same_sheets(&self, other: &SheetRef) -> bool {
        match (self, other) {
            (SheetRef::Single(a), SheetRef::Single(b)) => same_name(a, b),
            (SheetRef::Span(a1, a2), SheetRef::Span(b1, b2)) => {
                same_name(a1, b1) && same_name(a2, b2)
            }
            _ => false,
        }
    }

    fn rename(&mut self, old: &str, new: &str) {
        let rename_one = |name: &mut String| {
            if same_name(name, old) {
                *name = new.to_string();
            }
        };
        match self {
            SheetRef::Single(name) => rename_one(name),
            SheetRef::Span(first, last) => {
                rename_one(first);
                rename_one(last);
            }
        }
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Cell reference with optional sheet
#[derive(Debug, Clone, PartialEq)]
pub struct CellReference {
    pub sheet: Option<SheetRef>,
    pub address: CellAddress,
}

/// Range reference with optional sheet
#[derive(Debug, Clone, PartialEq)]
pub struct RangeReference {
    pub sheet: Option<SheetRef>,
    pub range: CellRange,
}

/// Defined name with an optional sheet qualifier
///
/// `Sheet2!Rate` only finds a name scoped to Sheet2, and binds it as a
/// formula on that sheet would.
#[derive(Debug, Clone, PartialEq)]
pub struct NameReference {
    pub sheet: Option<SheetRef>,
    pub name: String,
}

impl NameReference {
    /// An unqualified name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            sheet: None,
            name: name.into(),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Text
    Concat,

    // Range (`:` between operands that are not both plain cell references)
    Range,
}

impl BinaryOperator {
    /// Binding strength; higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterEqual => 1,
            BinaryOperator::Concat => 2,
            BinaryOperator::Add | BinaryOperator::Subtract => 3,
            BinaryOperator::Multiply | BinaryOperator::Divide => 4,
            BinaryOperator::Power => 5,
            BinaryOperator::Range => 8,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Power => "^",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Concat => "&",
            BinaryOperator::Range => ":",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Prefix `+`
    Plus,
    /// Prefix `-`
    Negate,
    /// Postfix `%`
    Percent,
}

impl FormulaExpr {
    /// Point every reference to sheet `old` at sheet `new` (case-insensitive)
    pub fn rename_sheet(&mut self, old: &str, new: &str) {
        match self {
            FormulaExpr::CellRef(r) => {
                if let Some(sheet) = r.sheet.as_mut() {
                    sheet.rename(old, new);
                }
            }
            FormulaExpr::RangeRef(r) => {
                if let Some(sheet) = r.sheet.as_mut() {
                    sheet.rename(old, new);
                }
            }
            FormulaExpr::NameRef(r) => {
                if let Some(sheet) = r.sheet.as_mut() {
                    sheet.rename(old, new);
                }
            }
            FormulaExpr::BinaryOp { left, right, .. } => {
                left.rename_sheet(old, new);
                right.rename_sheet(old, new);
            }
            FormulaExpr::UnaryOp { operand, .. } | FormulaExpr::Paren(operand) => {
                operand.rename_sheet(old, new)
            }
            FormulaExpr::Function { args, .. } => {
                args.iter_mut().for_each(|a| a.rename_sheet(old, new))
            }
            FormulaExpr::Array(rows) => rows
                .iter_mut()
                .flatten()
                .for_each(|a| a.rename_sheet(old, new)),
            FormulaExpr::Number(_)
            | FormulaExpr::String(_)
            | FormulaExpr::Boolean(_)
            | FormulaExpr::Error(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_formula;
    use crate::serializer::serialize_formula;

    #[test]
    fn test_rename_sheet() {
        let mut expr =
            parse_formula("=SUM(Data!A1:B2, 'data'!C3, Data:Other!D4, Keep!A1, Data!Rate)").unwrap();
        expr.rename_sheet("DATA", "Q1 Data");
        assert_eq!(
            serialize_formula(&expr),
            "=SUM('Q1 Data'!A1:B2,'Q1 Data'!C3,'Q1 Data:Other'!D4,Keep!A1,'Q1 Data'!Rate)"
        );
    }

    #[test]
    fn test_same_sheets_ignores_case() {
        assert!(SheetRef::Single("Data".into()).same_sheets(&SheetRef::Single("DATA".into())));
        assert!(!SheetRef::Single("A_".into()).same_sheets(&SheetRef::Span("A_".into(), "A_".into())));
    }
}
