//! Formula evaluator
//!
//! Evaluates bound expressions to produce values. Cell contents are pulled
//! through a [`CellValueProvider`] every time they are needed; nothing is
//! cached here.

use gridcalc_core::{CellAddress, CellCoordinate, CellError, CellRange, SheetRange, Workbook};

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::error::EvalError;
use crate::functions::math::power;
use crate::functions::text::MAX_TEXT_LEN;
use crate::functions::{coerce, finite, ArgKind, FunctionDef};
use crate::resolver::{BoundExpr, BoundName};
use crate::value::{Array, FormulaValue};

/// Default limit on nested name and user function expansions
pub const DEFAULT_MAX_EVAL_DEPTH: usize = 256;

/// Source of live cell values
pub trait CellValueProvider {
    /// Current value of a cell; `Blank` when empty
    fn cell_value(&self, cell: CellCoordinate) -> FormulaValue;

    /// Values of a range, row-major. A 3-D range stacks each sheet's block
    /// below the previous one, in sheet order.
    fn range_values(&self, range: &SheetRange) -> Vec<Vec<FormulaValue>> {
        let (start, end) = (range.range.start, range.range.end);
        let mut rows = Vec::with_capacity(range.sheet_count() * range.range.row_count() as usize);
        for sheet in range.first_sheet..=range.last_sheet {
            for row in start.row..=end.row {
                rows.push(
                    (start.col..=end.col)
                        .map(|col| self.cell_value(CellCoordinate::new(sheet, row, col)))
                        .collect(),
                );
            }
        }
        rows
    }

    /// Cells of `area` on `sheet` that hold something, row-major; the
    /// evaluator reads ranges through this
    ///
    /// Cells left out read as Blank. The default visits every cell of the
    /// area, so providers backed by sparse storage should override it.
    fn range_cells(&self, sheet: usize, area: CellRange) -> Result<StoredCells, CellError> {
        Ok(dense_cells(self, sheet, area))
    }
}

/// Non-blank cells of a range with their addresses
pub type StoredCells = Vec<(CellAddress, FormulaValue)>;

/// Read every cell of `area` through [`CellValueProvider::range_values`],
/// keeping the non-blank ones
pub fn dense_cells<P>(provider: &P, sheet: usize, area: CellRange) -> StoredCells
where
    P: CellValueProvider + ?Sized,
{
    provider
        .range_values(&SheetRange::on_sheet(sheet, area))
        .into_iter()
        .flatten()
        .zip(area.cells())
        .filter(|(value, _)| !value.is_blank())
        .map(|(value, addr)| (addr, value))
        .collect()
}

/// Pick the cheaper way to read `area`: every cell of it, or the stored
/// cells of the sheet filtered down to it
///
/// `stored` yields (row, col) of the sheet's stored cells in any order and
/// `stored_count` is its length.
pub fn sparse_cells<P, I>(
    provider: &P,
    sheet: usize,
    area: CellRange,
    stored_count: usize,
    stored: I,
) -> StoredCells
where
    P: CellValueProvider + ?Sized,
    I: Iterator<Item = (u32, u16)>,
{
    if area.cell_count() <= stored_count as u64 {
        return dense_cells(provider, sheet, area);
    }
    let mut positions: Vec<_> = stored.filter(|&(row, col)| area.contains(row, col)).collect();
    positions.sort_unstable();
    positions.dedup();
    positions
        .into_iter()
        .map(|(row, col)| {
            let value = provider.cell_value(CellCoordinate::new(sheet, row, col));
            (CellAddress::new(row, col), value)
        })
        .filter(|(_, value)| !value.is_blank())
        .collect()
}

/// Reads constants straight from a workbook
///
/// Cells on sheets that do not exist read as `#REF!`.
#[derive(Debug, Clone, Copy)]
pub struct WorkbookValues<'a>(pub &'a Workbook);

impl CellValueProvider for WorkbookValues<'_> {
    fn cell_value(&self, cell: CellCoordinate) -> FormulaValue {
        if cell.sheet >= self.0.sheet_count() {
            return FormulaValue::Error(EvalError::InvalidRef.into());
        }
        FormulaValue::from(self.0.cell_value(cell))
    }

    fn range_cells(&self, sheet: usize, area: CellRange) -> Result<StoredCells, CellError> {
        let Some(ws) = self.0.worksheet(sheet) else {
            return Err(EvalError::InvalidRef.into());
        };
        let Some(area) = ws.used_range().and_then(|used| area.intersection(&used)) else {
            return Ok(Vec::new());
        };
        let stored = ws.iter().map(|(position, _)| position);
        Ok(sparse_cells(self, sheet, area, ws.cell_count(), stored))
    }
}

/// Evaluate a bound expression with the default depth limit
pub fn evaluate(expr: &BoundExpr, provider: &dyn CellValueProvider) -> FormulaValue {
    Evaluator::new(provider).evaluate(expr)
}

/// An argument of a user function call
#[derive(Debug, Clone)]
struct Slot {
    value: FormulaValue,
    /// The argument was a single-cell reference
    cell_reference: bool,
}

/// Tree-walking evaluator
pub struct Evaluator<'p> {
    provider: &'p dyn CellValueProvider,
    max_depth: usize,
    depth: usize,
    /// Argument frames of the user functions being evaluated
    frames: Vec<Vec<Slot>>,
}

impl<'p> Evaluator<'p> {
    pub fn new(provider: &'p dyn CellValueProvider) -> Self {
        Self {
            provider,
            max_depth: DEFAULT_MAX_EVAL_DEPTH,
            depth: 0,
            frames: Vec::new(),
        }
    }

    /// Limit how deeply names and user functions may expand
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Evaluate a formula to the single value a cell holds
    ///
    /// A 1×1 result collapses to its element; a larger array is `#VALUE!`.
    pub fn evaluate(&mut self, expr: &BoundExpr) -> FormulaValue {
        self.depth = 0;
        self.frames.clear();
        self.eval(expr).scalar()
    }

    fn eval(&mut self, expr: &BoundExpr) -> FormulaValue {
        match expr {
            BoundExpr::Literal(value) => value.clone(),

            // === References ===
            BoundExpr::Cell(cell) => self.provider.cell_value(*cell),
            BoundExpr::Range(range) => self.range(range),

            BoundExpr::Name(name) => self.expand(name, Vec::new()),
            BoundExpr::Param(slot) => self
                .frames
                .last()
                .and_then(|frame| frame.get(*slot))
                .map_or(FormulaValue::Error(EvalError::InvalidRef.into()), |s| {
                    s.value.clone()
                }),

            // === Operators ===
            BoundExpr::Unary { op, operand } => self.evaluate_unary_op(*op, operand),
            BoundExpr::Binary { op, left, right } => self.evaluate_binary_op(*op, left, right),

            // === Functions ===
            BoundExpr::Call { function, args } => self.evaluate_function(function, args),
            BoundExpr::UserCall { function, args } => {
                let mut slots = Vec::with_capacity(args.len());
                for arg in args {
                    let cell_reference = self.is_cell_reference(arg);
                    slots.push(Slot {
                        value: self.eval(arg),
                        cell_reference,
                    });
                }
                self.expand(function, slots)
            }

            // === Arrays ===
            BoundExpr::Array(rows) => {
                let mut result_rows = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut result_row = Vec::with_capacity(row.len());
                    for expr in row {
                        result_row.push(self.eval(expr).scalar());
                    }
                    result_rows.push(result_row);
                }
                FormulaValue::Array(Array::new(result_rows))
            }
        }
    }

    /// Read a range as an array of its stored cells; a 3-D range stacks
    /// the sheets vertically
    fn range(&self, range: &SheetRange) -> FormulaValue {
        let area = range.range;
        let height = area.row_count() as usize;
        let mut array = Array::blank(height * range.sheet_count(), area.col_count() as usize);

        for (i, sheet) in (range.first_sheet..=range.last_sheet).enumerate() {
            let cells = match self.provider.range_cells(sheet, area) {
                Ok(cells) => cells,
                Err(e) => return FormulaValue::Error(e),
            };
            for (addr, value) in cells {
                array.push(
                    i * height + (addr.row - area.start.row) as usize,
                    (addr.col - area.start.col) as usize,
                    value,
                );
            }
        }
        FormulaValue::Array(array)
    }

    /// Evaluate a name body, with `args` as its parameter frame
    fn expand(&mut self, name: &BoundName, args: Vec<Slot>) -> FormulaValue {
        if self.depth >= self.max_depth {
            tracing::warn!(
                name = %name.name,
                max_depth = self.max_depth,
                "name expansion too deep"
            );
            return FormulaValue::Error(EvalError::StackTooDeep.into());
        }

        self.depth += 1;
        self.frames.push(args);
        let value = self.eval(&name.body);
        self.frames.pop();
        self.depth -= 1;
        value
    }

    /// Whether an argument reads exactly one cell
    fn is_cell_reference(&self, expr: &BoundExpr) -> bool {
        match expr {
            BoundExpr::Param(slot) => self
                .frames
                .last()
                .and_then(|frame| frame.get(*slot))
                .is_some_and(|s| s.cell_reference),
            other => other.is_cell_reference(),
        }
    }

    /// Evaluate a unary operation
    fn evaluate_unary_op(&mut self, op: UnaryOperator, operand: &BoundExpr) -> FormulaValue {
        let value = self.eval(operand).scalar();
        if value.is_error() {
            return value;
        }

        let n = match op {
            UnaryOperator::Plus => return value,
            UnaryOperator::Negate | UnaryOperator::Percent => match value.to_number() {
                Ok(n) => n,
                Err(e) => return FormulaValue::Error(e),
            },
        };
        match op {
            UnaryOperator::Percent => FormulaValue::Number(n / 100.0),
            _ => FormulaValue::Number(-n),
        }
    }

    /// Evaluate a binary operation
    ///
    /// Operands are evaluated left to right and the first error wins.
    fn evaluate_binary_op(
        &mut self,
        op: BinaryOperator,
        left: &BoundExpr,
        right: &BoundExpr,
    ) -> FormulaValue {
        let left_val = self.eval(left).scalar();
        if left_val.is_error() {
            return left_val;
        }
        let right_val = self.eval(right).scalar();
        if right_val.is_error() {
            return right_val;
        }

        match op {
            // Arithmetic operators
            BinaryOperator::Add
            | BinaryOperator::Subtract
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Power => {
                let (l, r) = match (left_val.to_number(), right_val.to_number()) {
                    (Ok(l), Ok(r)) => (l, r),
                    (Err(e), _) | (_, Err(e)) => return FormulaValue::Error(e),
                };
                match op {
                    BinaryOperator::Add => finite(l + r),
                    BinaryOperator::Subtract => finite(l - r),
                    BinaryOperator::Multiply => finite(l * r),
                    BinaryOperator::Divide if r == 0.0 => {
                        FormulaValue::Error(EvalError::DivideByZero.into())
                    }
                    BinaryOperator::Divide => finite(l / r),
                    _ => power(l, r),
                }
            }

            // Concatenation
            BinaryOperator::Concat => match (left_val.to_text(), right_val.to_text()) {
                (Ok(l), Ok(r)) if l.chars().count() + r.chars().count() > MAX_TEXT_LEN => {
                    FormulaValue::Error(EvalError::TypeMismatch.into())
                }
                (Ok(l), Ok(r)) => FormulaValue::String(l + &r),
                (Err(e), _) | (_, Err(e)) => FormulaValue::Error(e),
            },

            // Comparison operators
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterEqual => {
                let ordering = left_val.compare(&right_val);
                FormulaValue::Boolean(match op {
                    BinaryOperator::Equal => ordering.is_eq(),
                    BinaryOperator::NotEqual => ordering.is_ne(),
                    BinaryOperator::LessThan => ordering.is_lt(),
                    BinaryOperator::LessEqual => ordering.is_le(),
                    BinaryOperator::GreaterThan => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }

            // The resolver folds valid ranges away
            BinaryOperator::Range => FormulaValue::Error(EvalError::InvalidRef.into()),
        }
    }

    /// Evaluate a built-in function call
    ///
    /// Arguments are evaluated and coerced left to right; the first one that
    /// fails its coercion ends the call with that error.
    fn evaluate_function(&mut self, function: &FunctionDef, args: &[BoundExpr]) -> FormulaValue {
        let mut evaluated_args = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let kind = function.arg_kind(i);
            let mut value = self.eval(arg);

            // A referenced cell counts as a one-cell range, so aggregates
            // skip its text the way they skip text inside ranges
            if matches!(kind, ArgKind::Values | ArgKind::Unchecked) && self.is_cell_reference(arg) {
                value = FormulaValue::Array(value.into_array());
            }

            match coerce(kind, value) {
                Ok(v) => evaluated_args.push(v),
                Err(e) => return FormulaValue::Error(e),
            }
        }

        tracing::trace!(function = function.name, args = evaluated_args.len(), "calling function");
        (function.implementation)(&evaluated_args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_formula;
    use crate::resolver::Resolver;
    use gridcalc_core::{CellError, CellValue, DefinedName};
    use pretty_assertions::assert_eq;

    fn set(wb: &mut Workbook, sheet: usize, a1: &str, value: impl Into<CellValue>) {
        wb.set_cell_value(CellCoordinate::parse(a1, sheet).unwrap(), value.into())
            .unwrap();
    }

    fn bind(wb: &Workbook, text: &str) -> BoundExpr {
        let ast = parse_formula(text).unwrap();
        Resolver::new(wb, wb, 0).bind(&ast).unwrap().expr
    }

    fn eval_in(wb: &Workbook, text: &str) -> FormulaValue {
        evaluate(&bind(wb, text), &WorkbookValues(wb))
    }

    fn eval(text: &str) -> FormulaValue {
        eval_in(&Workbook::new(), text)
    }

    fn n(v: f64) -> FormulaValue {
        FormulaValue::Number(v)
    }

    fn err(e: CellError) -> FormulaValue {
        FormulaValue::Error(e)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("=1+2*3"), n(7.0));
        assert_eq!(eval("=(1+2)*3"), n(9.0));
        assert_eq!(eval("=10/4"), n(2.5));
        assert_eq!(eval("=-2^2"), n(4.0));
        assert_eq!(eval("=2^3^2"), n(64.0));
        assert_eq!(eval("=50%"), n(0.5));
        assert_eq!(eval("=+\"text\""), FormulaValue::from("text"));
        assert_eq!(eval("=\"4\"*TRUE"), n(4.0));
    }

    #[test]
    fn test_error_propagation() {
        assert_eq!(eval("=1/0"), err(CellError::Div0));
        assert_eq!(eval("=#N/A+1/0"), err(CellError::Na));
        assert_eq!(eval("=\"a\"+1"), err(CellError::Value));
        assert_eq!(eval("=-\"a\""), err(CellError::Value));
        assert_eq!(eval("=0^0"), err(CellError::Num));
        assert_eq!(eval("=10^400"), err(CellError::Num));
        assert_eq!(eval("=\"x\"&#REF!"), err(CellError::Ref));
    }

    #[test]
    fn test_blank_cells() {
        let wb = Workbook::new();
        assert_eq!(eval_in(&wb, "=A1"), FormulaValue::Blank);
        assert_eq!(eval_in(&wb, "=A1+1"), n(1.0));
        assert_eq!(eval_in(&wb, "=A1&\"x\""), FormulaValue::from("x"));
        assert_eq!(eval_in(&wb, "=A1=0"), FormulaValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=A1=\"\""), FormulaValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=A1=FALSE"), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("=\"a\"=\"A\""), FormulaValue::Boolean(true));
        assert_eq!(eval("=1<\"a\""), FormulaValue::Boolean(true));
        assert_eq!(eval("=\"z\"<TRUE"), FormulaValue::Boolean(true));
        assert_eq!(eval("=1=\"1\""), FormulaValue::Boolean(false));
        assert_eq!(eval("=2>=2"), FormulaValue::Boolean(true));
        assert_eq!(eval("=2<>2"), FormulaValue::Boolean(false));
    }

    #[test]
    fn test_concatenation() {
        assert_eq!(eval("=\"n=\"&1.5"), FormulaValue::from("n=1.5"));
        assert_eq!(eval("=TRUE&1"), FormulaValue::from("TRUE1"));
        assert_eq!(eval("=REPT(\"a\",30000)&REPT(\"b\",3000)"), err(CellError::Value));
    }

    #[test]
    fn test_referenced_text_is_skipped_by_aggregates() {
        let mut wb = Workbook::new();
        set(&mut wb, 0, "A1", "3");
        set(&mut wb, 0, "A2", 4.0);

        assert_eq!(eval_in(&wb, "=SUM(A1, 2)"), n(2.0));
        assert_eq!(eval_in(&wb, "=SUM(\"3\", 2)"), n(5.0));
        assert_eq!(eval_in(&wb, "=SUM(A1:A2)"), n(4.0));
        assert_eq!(eval_in(&wb, "=A1+2"), n(5.0));
        assert_eq!(eval_in(&wb, "=COUNT(A1, A2, 7)"), n(2.0));
    }

    #[test]
    fn test_errors_in_ranges_propagate() {
        let mut wb = Workbook::new();
        set(&mut wb, 0, "A1", CellError::Ref);
        set(&mut wb, 0, "B1", 5.0);
        assert_eq!(eval_in(&wb, "=SUM(A1,B1)"), err(CellError::Ref));
        assert_eq!(eval_in(&wb, "=SUM(A1:B1)"), err(CellError::Ref));
        assert_eq!(eval_in(&wb, "=IFERROR(A1, 0)"), n(0.0));
        assert_eq!(eval_in(&wb, "=ISERROR(A1)"), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_range_results() {
        let mut wb = Workbook::new();
        set(&mut wb, 0, "A1", 1.0);
        set(&mut wb, 0, "A2", 2.0);
        set(&mut wb, 0, "B1", 10.0);
        set(&mut wb, 0, "B2", 20.0);

        assert_eq!(eval_in(&wb, "=A1:A2"), err(CellError::Value));
        assert_eq!(eval_in(&wb, "=B2:B2"), n(20.0));
        assert_eq!(eval_in(&wb, "=SUM(INDEX(A1:B2,0,2))"), n(30.0));
        assert_eq!(eval_in(&wb, "=A1:A2+1"), err(CellError::Value));
    }

    #[test]
    fn test_3d_range_stacks_sheets() {
        let mut wb = Workbook::new();
        wb.add_worksheet_with_name("Sheet2").unwrap();
        wb.add_worksheet_with_name("Sheet3").unwrap();
        set(&mut wb, 0, "A1", 1.0);
        set(&mut wb, 1, "A1", 2.0);
        set(&mut wb, 2, "A1", 4.0);

        assert_eq!(eval_in(&wb, "=SUM(Sheet1:Sheet3!A1)"), n(7.0));
        assert_eq!(eval_in(&wb, "=ROWS(Sheet2:Sheet3!A1:A5)"), n(10.0));
        assert_eq!(eval_in(&wb, "=Sheet2!A1*10"), n(20.0));
    }

    #[test]
    fn test_array_constants() {
        assert_eq!(eval("=SUM({1,2;3,4})"), n(10.0));
        assert_eq!(eval("=INDEX({1,2;3,4},2,1)"), n(3.0));
        assert_eq!(eval("={7}"), n(7.0));
        assert_eq!(eval("={1,2}"), err(CellError::Value));
    }

    #[test]
    fn test_names_and_user_functions() {
        let mut wb = Workbook::new();
        set(&mut wb, 0, "A1", 100.0);
        set(&mut wb, 0, "A2", "3");
        wb.define_name(DefinedName::workbook_scope("Rate", "0.05")).unwrap();
        wb.define_name(DefinedName::workbook_scope("Base", "=Sheet1!$A$1")).unwrap();
        wb.define_name(
            DefinedName::workbook_scope("Hyp", "=SQRT(a^2+b^2)").with_parameters(["a", "b"]),
        )
        .unwrap();
        wb.define_name(DefinedName::workbook_scope("Total", "=SUM(x)").with_parameters(["x"]))
            .unwrap();

        assert_eq!(eval_in(&wb, "=A1*Rate"), n(5.0));
        assert_eq!(eval_in(&wb, "=Base+1"), n(101.0));
        assert_eq!(eval_in(&wb, "=Hyp(3,4)"), n(5.0));
        assert_eq!(eval_in(&wb, "=Hyp(Hyp(3,4),12)"), n(13.0));
        // Referenced text stays skipped when passed through a parameter
        assert_eq!(eval_in(&wb, "=Total(A2)"), n(0.0));
        assert_eq!(eval_in(&wb, "=Total(A1:A2)"), n(100.0));
        assert_eq!(eval_in(&wb, "=Total(\"3\")"), n(3.0));
    }

    #[test]
    fn test_expansion_depth_limit() {
        let mut wb = Workbook::new();
        wb.define_name(DefinedName::workbook_scope("Inner", "=2")).unwrap();
        wb.define_name(DefinedName::workbook_scope("Outer", "=Inner+1")).unwrap();

        let expr = bind(&wb, "=Outer");
        let provider = WorkbookValues(&wb);
        assert_eq!(Evaluator::new(&provider).evaluate(&expr), n(3.0));
        assert_eq!(
            Evaluator::new(&provider).with_max_depth(1).evaluate(&expr),
            err(CellError::Num)
        );
    }

    #[test]
    fn test_missing_sheet_reads_as_ref_error() {
        let wb = Workbook::new();
        let expr = BoundExpr::Cell(CellCoordinate::new(3, 0, 0));
        assert_eq!(evaluate(&expr, &WorkbookValues(&wb)), err(CellError::Ref));

        let range = SheetRange::on_sheet(3, CellRange::parse("A1:B2").unwrap());
        let expr = BoundExpr::Range(range);
        assert_eq!(
            evaluate(&expr, &WorkbookValues(&wb)).first_error(),
            Some(CellError::Ref)
        );
    }

    #[test]
    fn test_whole_sheet_ranges_read_only_used_cells() {
        let mut wb = Workbook::new();
        set(&mut wb, 0, "C5", 2.0);
        set(&mut wb, 0, "XFD1048576", 3.0);
        set(&mut wb, 0, "A1", 100.0);
        set(&mut wb, 0, "D9", "text");

        assert_eq!(eval_in(&wb, "=SUM(C1:XFD1048576)"), n(5.0));
        assert_eq!(eval_in(&wb, "=COUNTA(A1:XFD1048576)"), n(4.0));
        assert_eq!(eval_in(&wb, "=ROWS(C1:C1048576)"), n(1_048_576.0));
        assert_eq!(eval_in(&wb, "=COLUMNS(A1:XFD1)"), n(16_384.0));
        assert_eq!(eval_in(&wb, "=COUNTBLANK(C1:C1048576)"), n(1_048_575.0));
        assert_eq!(eval_in(&wb, "=INDEX(C1:C1048576,5)"), n(2.0));
        assert_eq!(eval_in(&wb, "=MATCH(2,C1:C1048576,0)"), n(5.0));
    }
}
