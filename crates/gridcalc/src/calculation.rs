//! Incremental calculation engine
//!
//! The engine owns the workbook's constants and a table of formula cells.
//! Edits mark the affected formula cells Dirty; values are recomputed lazily
//! when read, precedents first, each dirty cell at most once.
//!
//! # Example
//!
//! ```rust
//! use gridcalc::prelude::*;
//!
//! let mut engine = Engine::new();
//! let a1 = CellCoordinate::parse("A1", 0).unwrap();
//! let b1 = CellCoordinate::parse("B1", 0).unwrap();
//!
//! engine.set_value(a1, 5.0).unwrap();
//! engine.set_formula(b1, "=A1+1").unwrap();
//! assert_eq!(engine.get_value(b1), FormulaValue::Number(6.0));
//!
//! engine.set_value(a1, 10.0).unwrap();
//! assert_eq!(engine.cell_state(b1), Some(CellState::Dirty));
//! assert_eq!(engine.get_value(b1), FormulaValue::Number(11.0));
//! ```

use ahash::{AHashMap, AHashSet};
use gridcalc_core::{
    CellCoordinate, CellError, CellRange, CellValue, DefinedName, NameScope, Workbook,
};
use gridcalc_formula::{
    parse_formula_with_options, serialize_formula, sparse_cells, BoundExpr, BoundFormula,
    CellValueProvider, DependencyGraph, Evaluator, FormulaError, FormulaExpr, FormulaValue,
    NameCache, ParseOptions, Resolver, StoredCells, DEFAULT_MAX_EVAL_DEPTH,
};

use crate::error::Result;

/// Options for the calculation engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationOptions {
    /// Maximum nesting of groups, calls and prefix operators in formula text
    pub max_parse_depth: usize,
    /// Maximum expression tree height, counting each operator in a chain
    pub max_parse_height: usize,
    /// Maximum nesting of name and user function expansions
    pub max_eval_depth: usize,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            max_parse_depth: ParseOptions::default().max_depth,
            max_parse_height: ParseOptions::default().max_height,
            max_eval_depth: DEFAULT_MAX_EVAL_DEPTH,
        }
    }
}

/// Statistics from a calculation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalculationStats {
    /// Total number of formula cells
    pub formula_count: usize,
    /// Number of cells calculated
    pub cells_calculated: usize,
    /// Number of cells caught in circular references
    pub circular_references: usize,
    /// Number of formula cells holding an error value
    pub errors: usize,
}

/// Calculation state of a formula cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellState {
    /// Cached value is current
    Clean,
    /// Needs recomputation before its value is used
    Dirty,
    /// Being computed right now
    Evaluating,
    /// Failed to bind or sits on a cycle; the cached value is the error
    Error,
}

/// Formula text parsed but not yet bound to a cell
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFormula {
    text: String,
    expr: FormulaExpr,
}

impl ParsedFormula {
    /// The text as given
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> &FormulaExpr {
        &self.expr
    }
}

/// A formula cell
#[derive(Debug, Clone)]
pub struct FormulaCell {
    pub coordinate: CellCoordinate,
    /// Text as last set, or the canonical text after a sheet rename
    pub text: String,
    /// None when the text did not parse
    pub expr: Option<FormulaExpr>,
    /// None when the formula did not parse or bind
    pub bound: Option<BoundExpr>,
    pub value: FormulaValue,
    pub state: CellState,
    pub error: Option<FormulaError>,
    pub evaluations: u64,
}

/// The recalculation engine
#[derive(Debug)]
pub struct Engine {
    workbook: Workbook,
    formulas: AHashMap<CellCoordinate, FormulaCell>,
    graph: DependencyGraph,
    name_cache: NameCache,
    /// Cells marked `#CYCLE!`, kept until the next structural edit
    cycle_cells: AHashSet<CellCoordinate>,
    options: CalculationOptions,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Values as formulas see them: constants from the workbook, cached
/// results for formula cells
struct EngineValues<'a> {
    workbook: &'a Workbook,
    formulas: &'a AHashMap<CellCoordinate, FormulaCell>,
}

impl CellValueProvider for EngineValues<'_> {
    fn cell_value(&self, cell: CellCoordinate) -> FormulaValue {
        if let Some(formula) = self.formulas.get(&cell) {
            return formula.value.clone();
        }
        if cell.sheet >= self.workbook.sheet_count() {
            return FormulaValue::Error(CellError::Ref);
        }
        FormulaValue::from(self.workbook.cell_value(cell))
    }

    /// Constants and formula cells of the sheet, whichever is cheaper to scan
    fn range_cells(
        &self,
        sheet: usize,
        area: CellRange,
    ) -> std::result::Result<StoredCells, CellError> {
        let Some(ws) = self.workbook.worksheet(sheet) else {
            return Err(CellError::Ref);
        };
        let constants = ws.iter().map(|(position, _)| position);
        let formulas = self
            .formulas
            .keys()
            .filter(|c| c.sheet == sheet)
            .map(|c| (c.row, c.col));
        let count = ws.cell_count() + self.formulas.len();
        Ok(sparse_cells(self, sheet, area, count, constants.chain(formulas)))
    }
}

impl Engine {
    /// Create an engine over a workbook with one sheet named "Sheet1"
    pub fn new() -> Self {
        Self::with_workbook(Workbook::new())
    }

    /// Create an engine over an existing workbook of constants
    pub fn with_workbook(workbook: Workbook) -> Self {
        Self {
            workbook,
            formulas: AHashMap::new(),
            graph: DependencyGraph::new(),
            name_cache: NameCache::new(),
            cycle_cells: AHashSet::new(),
            options: CalculationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CalculationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CalculationOptions {
        &self.options
    }

    /// The workbook holding sheets, names and constants
    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    // === Formulas ===

    /// Parse formula text without attaching it to a cell
    pub fn parse_formula(&self, text: &str) -> Result<ParsedFormula> {
        let expr = self.parse(text)?;
        Ok(ParsedFormula {
            text: text.to_string(),
            expr,
        })
    }

    fn parse(&self, text: &str) -> std::result::Result<FormulaExpr, FormulaError> {
        let options = ParseOptions {
            max_depth: self.options.max_parse_depth,
            max_height: self.options.max_parse_height,
        };
        parse_formula_with_options(text, &options)
    }

    /// Put a formula in a cell
    ///
    /// On failure the cell still becomes a formula cell holding the error
    /// value, and the error is returned.
    pub fn set_formula(&mut self, cell: CellCoordinate, text: &str) -> Result<()> {
        self.check_cell(cell)?;
        match self.parse(text) {
            Ok(expr) => self.bind_formula(
                cell,
                ParsedFormula {
                    text: text.to_string(),
                    expr,
                },
            ),
            Err(error) => {
                self.reset_cycles();
                self.install(cell, text.to_string(), None, Err(error.clone()));
                Err(error.into())
            }
        }
    }

    /// Attach a parsed formula to a cell
    pub fn bind_formula(&mut self, cell: CellCoordinate, parsed: ParsedFormula) -> Result<()> {
        self.check_cell(cell)?;
        self.reset_cycles();
        let result = self.resolve(cell.sheet, &parsed.expr);
        let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
        self.install(cell, parsed.text, Some(parsed.expr), result);
        outcome.map_err(Into::into)
    }

    /// Formula text of a cell
    pub fn formula_text(&self, cell: CellCoordinate) -> Option<&str> {
        self.formulas.get(&cell).map(|f| f.text.as_str())
    }

    /// Formula cell details
    pub fn formula_cell(&self, cell: CellCoordinate) -> Option<&FormulaCell> {
        self.formulas.get(&cell)
    }

    /// Coordinates of all formula cells, sorted
    pub fn formula_cells(&self) -> Vec<CellCoordinate> {
        self.graph.formula_cells()
    }

    // === Values ===

    /// Replace a cell's content with a constant
    pub fn set_value(&mut self, cell: CellCoordinate, value: impl Into<CellValue>) -> Result<()> {
        self.workbook.set_cell_value(cell, value.into())?;
        if self.cycle_cells.contains(&cell) {
            self.reset_cycles();
        }
        if self.formulas.remove(&cell).is_some() {
            self.graph.remove(cell);
            tracing::debug!(?cell, "formula replaced by a constant");
        }
        self.mark_dependents_dirty(cell);
        Ok(())
    }

    /// Empty a cell
    pub fn clear(&mut self, cell: CellCoordinate) -> Result<()> {
        self.set_value(cell, CellValue::Empty)
    }

    /// Mark a cell and everything depending on it Dirty
    pub fn invalidate(&mut self, cell: CellCoordinate) {
        if let Some(formula) = self.formulas.get_mut(&cell) {
            if formula.bound.is_some() {
                formula.state = CellState::Dirty;
                self.cycle_cells.remove(&cell);
            }
        }
        self.mark_dependents_dirty(cell);
    }

    /// Current value of a cell, recomputing it first if it is Dirty
    ///
    /// Empty cells read as `Blank`.
    pub fn get_value(&mut self, cell: CellCoordinate) -> FormulaValue {
        match self.cell_state(cell) {
            Some(CellState::Dirty) => {
                self.recalculate(cell);
            }
            Some(_) => {}
            None => {
                return EngineValues {
                    workbook: &self.workbook,
                    formulas: &self.formulas,
                }
                .cell_value(cell)
            }
        }
        self.formulas
            .get(&cell)
            .map_or(FormulaValue::Blank, |f| f.value.clone())
    }

    /// Recompute every Dirty formula cell
    pub fn calculate(&mut self) -> CalculationStats {
        let mut stats = CalculationStats::default();

        for cell in self.graph.formula_cells() {
            if self.cell_state(cell) == Some(CellState::Dirty) {
                stats.cells_calculated += self.recalculate(cell);
            }
        }

        stats.formula_count = self.formulas.len();
        stats.circular_references = self.cycle_cells.len();
        stats.errors = self
            .formulas
            .values()
            .filter(|f| f.value.is_error())
            .count();

        tracing::debug!(
            formulas = stats.formula_count,
            calculated = stats.cells_calculated,
            errors = stats.errors,
            "calculation finished"
        );
        stats
    }

    // === Instrumentation ===

    /// How many times the cell's formula has been evaluated
    pub fn evaluation_count(&self, cell: CellCoordinate) -> u64 {
        self.formulas.get(&cell).map_or(0, |f| f.evaluations)
    }

    pub fn cell_state(&self, cell: CellCoordinate) -> Option<CellState> {
        self.formulas.get(&cell).map(|f| f.state)
    }

    /// The error recorded when the cell's formula failed to parse or bind
    pub fn cell_error(&self, cell: CellCoordinate) -> Option<&FormulaError> {
        self.formulas.get(&cell).and_then(|f| f.error.as_ref())
    }

    // === Names ===

    /// Define or replace a name
    pub fn define_name(&mut self, name: DefinedName) -> Result<()> {
        let key = name.name.to_lowercase();
        let function = name.is_function();
        self.workbook.define_or_replace_name(name)?;
        tracing::debug!(name = %key, function, "name defined");
        self.names_changed(&key);
        Ok(())
    }

    /// Define a workbook-scoped user function
    pub fn define_function<I, S>(&mut self, name: &str, parameters: I, body: &str) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.define_name(DefinedName::workbook_scope(name, body).with_parameters(parameters))
    }

    /// Remove a name from one scope
    pub fn remove_name(&mut self, name: &str, scope: NameScope) -> Option<DefinedName> {
        let removed = self.workbook.remove_name(name, scope)?;
        tracing::debug!(name = %removed.name, "name removed");
        self.names_changed(&name.to_lowercase());
        Some(removed)
    }

    fn names_changed(&mut self, key: &str) {
        self.name_cache.clear();
        self.reset_cycles();

        let mut affected = self.graph.name_dependents(key);
        affected.extend(
            self.formulas
                .values()
                .filter(|f| f.bound.is_none())
                .map(|f| f.coordinate),
        );
        affected.sort_unstable();
        affected.dedup();

        for cell in affected {
            self.rebind(cell);
        }
    }

    // === Sheets ===

    /// Append a sheet
    pub fn add_sheet(&mut self, name: &str) -> Result<usize> {
        let index = self.workbook.add_worksheet_with_name(name)?;
        tracing::debug!(sheet = name, index, "sheet added");
        self.rebind_all();
        Ok(index)
    }

    /// Rename a sheet; formulas and names that mention it follow the new name
    pub fn rename_sheet(&mut self, index: usize, new_name: &str) -> Result<()> {
        let old_name = self
            .workbook
            .sheet_name(index)
            .ok_or(gridcalc_core::Error::SheetOutOfBounds(
                index,
                self.workbook.sheet_count(),
            ))?
            .to_string();
        self.workbook.rename_worksheet(index, new_name)?;

        for formula in self.formulas.values_mut() {
            if let Some(expr) = formula.expr.as_mut() {
                let before = expr.clone();
                expr.rename_sheet(&old_name, new_name);
                if *expr != before {
                    formula.text = serialize_formula(expr);
                }
            }
        }

        let renamed: Vec<DefinedName> = self
            .workbook
            .names()
            .iter()
            .filter_map(|name| {
                let mut expr = gridcalc_formula::parse_formula(name.expression()).ok()?;
                let before = expr.clone();
                expr.rename_sheet(&old_name, new_name);
                (expr != before).then(|| DefinedName {
                    refers_to: serialize_formula(&expr),
                    ..name.clone()
                })
            })
            .collect();
        for name in renamed {
            self.workbook.define_or_replace_name(name)?;
        }

        tracing::debug!(from = %old_name, to = new_name, "sheet renamed");
        self.rebind_all();
        Ok(())
    }

    /// Remove a sheet with its cells; later sheets move down one index
    pub fn remove_sheet(&mut self, index: usize) -> Result<()> {
        self.workbook.remove_worksheet(index)?;

        let formulas = std::mem::take(&mut self.formulas);
        self.formulas = formulas
            .into_iter()
            .filter(|(cell, _)| cell.sheet != index)
            .map(|(mut cell, mut formula)| {
                if cell.sheet > index {
                    cell.sheet -= 1;
                    formula.coordinate = cell;
                }
                (cell, formula)
            })
            .collect();

        tracing::debug!(index, "sheet removed");
        self.rebind_all();
        Ok(())
    }

    // === Binding ===

    fn check_cell(&self, cell: CellCoordinate) -> Result<()> {
        let count = self.workbook.sheet_count();
        if cell.sheet >= count {
            return Err(gridcalc_core::Error::SheetOutOfBounds(cell.sheet, count).into());
        }
        Ok(())
    }

    fn resolve(
        &mut self,
        sheet: usize,
        expr: &FormulaExpr,
    ) -> std::result::Result<BoundFormula, FormulaError> {
        let cache = std::mem::take(&mut self.name_cache);
        let mut resolver = Resolver::new(&self.workbook, &self.workbook, sheet).with_cache(cache);
        let result = resolver.bind(expr);
        self.name_cache = resolver.into_cache();
        result
    }

    /// Store a formula cell and its edges, then dirty its dependents
    fn install(
        &mut self,
        cell: CellCoordinate,
        text: String,
        expr: Option<FormulaExpr>,
        result: std::result::Result<BoundFormula, FormulaError>,
    ) {
        // A formula cell holds no constant
        if let Some(sheet) = self.workbook.worksheet_mut(cell.sheet) {
            sheet.clear_cell_at(cell.row, cell.col);
        }
        let evaluations = self.evaluation_count(cell);

        let formula = match result {
            Ok(bound) => {
                self.graph.set_precedents(cell, &bound.precedents);
                FormulaCell {
                    coordinate: cell,
                    text,
                    expr,
                    bound: Some(bound.expr),
                    value: FormulaValue::Blank,
                    state: CellState::Dirty,
                    error: None,
                    evaluations,
                }
            }
            Err(error) => {
                tracing::debug!(?cell, %error, "formula failed to bind");
                self.graph.set_precedents(cell, &[]);
                FormulaCell {
                    coordinate: cell,
                    text,
                    expr,
                    bound: None,
                    value: FormulaValue::Error(error.cell_error()),
                    state: CellState::Error,
                    error: Some(error),
                    evaluations,
                }
            }
        };

        self.formulas.insert(cell, formula);
        self.mark_dependents_dirty(cell);
    }

    /// Bind a cell's formula again after names or sheets changed
    fn rebind(&mut self, cell: CellCoordinate) {
        let Some((text, expr)) = self
            .formulas
            .get(&cell)
            .and_then(|f| Some((f.text.clone(), f.expr.clone()?)))
        else {
            return;
        };
        let result = self.resolve(cell.sheet, &expr);
        self.install(cell, text, Some(expr), result);
    }

    fn rebind_all(&mut self) {
        self.name_cache.clear();
        self.cycle_cells.clear();
        self.graph.clear();

        let mut cells: Vec<_> = self.formulas.keys().copied().collect();
        cells.sort_unstable();
        tracing::debug!(count = cells.len(), "rebinding all formulas");

        for cell in cells {
            let parsed = self.formulas.get(&cell).and_then(|f| f.expr.clone());
            match parsed {
                Some(_) => self.rebind(cell),
                // Unparsable text reads nothing
                None => self.graph.set_precedents(cell, &[]),
            }
        }
    }

    // === Dirty tracking ===

    fn mark_dependents_dirty(&mut self, cell: CellCoordinate) {
        for dependent in self.graph.transitive_dependents(cell) {
            if let Some(formula) = self.formulas.get_mut(&dependent) {
                if formula.state == CellState::Clean {
                    formula.state = CellState::Dirty;
                }
            }
        }
    }

    /// Let cells marked `#CYCLE!` compute again
    fn reset_cycles(&mut self) {
        if self.cycle_cells.is_empty() {
            return;
        }
        let cells: Vec<_> = self.cycle_cells.drain().collect();
        for cell in &cells {
            if let Some(formula) = self.formulas.get_mut(cell) {
                if formula.bound.is_some() {
                    formula.state = CellState::Dirty;
                }
            }
        }
        for cell in cells {
            self.mark_dependents_dirty(cell);
        }
    }

    // === Evaluation ===

    /// Bring `target` up to date, computing Dirty precedents first
    ///
    /// Returns the number of cells evaluated. Uses an explicit stack so
    /// long reference chains do not grow the call stack.
    fn recalculate(&mut self, target: CellCoordinate) -> usize {
        let mut evaluated = 0;
        // (cell, precedents already pushed)
        let mut stack = vec![(target, false)];

        while let Some(&(cell, expanded)) = stack.last() {
            if expanded {
                stack.pop();
                if self.cell_state(cell) == Some(CellState::Evaluating) {
                    self.evaluate_cell(cell);
                    evaluated += 1;
                }
                continue;
            }

            if self.cell_state(cell) != Some(CellState::Dirty) {
                stack.pop();
                continue;
            }
            if let Some(formula) = self.formulas.get_mut(&cell) {
                formula.state = CellState::Evaluating;
            }
            if let Some(top) = stack.last_mut() {
                top.1 = true;
            }

            for precedent in self.graph.formula_precedents(cell) {
                match self.cell_state(precedent) {
                    Some(CellState::Dirty) => stack.push((precedent, false)),
                    Some(CellState::Evaluating) => self.mark_cycle(&stack, precedent),
                    _ => {}
                }
            }
        }
        evaluated
    }

    /// `start` is already being evaluated further down the stack, so the
    /// expanded cells from it to the top form a cycle
    fn mark_cycle(&mut self, stack: &[(CellCoordinate, bool)], start: CellCoordinate) {
        let Some(position) = stack.iter().position(|&(c, expanded)| expanded && c == start) else {
            return;
        };
        let members: Vec<CellCoordinate> = stack[position..]
            .iter()
            .filter(|(_, expanded)| *expanded)
            .map(|(c, _)| *c)
            .collect();

        tracing::warn!(cells = ?members, "circular reference");
        for cell in members {
            if let Some(formula) = self.formulas.get_mut(&cell) {
                formula.value = FormulaValue::Error(CellError::Cycle);
                formula.state = CellState::Error;
            }
            self.cycle_cells.insert(cell);
        }
    }

    fn evaluate_cell(&mut self, cell: CellCoordinate) {
        let value = {
            let Some(bound) = self.formulas.get(&cell).and_then(|f| f.bound.as_ref()) else {
                return;
            };
            let provider = EngineValues {
                workbook: &self.workbook,
                formulas: &self.formulas,
            };
            Evaluator::new(&provider)
                .with_max_depth(self.options.max_eval_depth)
                .evaluate(bound)
        };

        tracing::trace!(?cell, ?value, "evaluated");
        if let Some(formula) = self.formulas.get_mut(&cell) {
            formula.value = value;
            formula.state = CellState::Clean;
            formula.evaluations += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn c(a1: &str) -> CellCoordinate {
        CellCoordinate::parse(a1, 0).unwrap()
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let mut engine = Engine::new();
        engine.set_value(c("A1"), 1.0).unwrap();
        for row in 2..=5000 {
            let cell = c(&format!("A{}", row));
            engine
                .set_formula(cell, &format!("=A{}+1", row - 1))
                .unwrap();
        }
        assert_eq!(engine.get_value(c("A5000")), FormulaValue::Number(5000.0));
        assert_eq!(engine.cell_state(c("A2")), Some(CellState::Clean));
    }

    #[test]
    fn test_diamond_evaluates_each_cell_once() {
        let mut engine = Engine::new();
        engine.set_value(c("A1"), 2.0).unwrap();
        engine.set_formula(c("B1"), "=A1*2").unwrap();
        engine.set_formula(c("B2"), "=A1*3").unwrap();
        engine.set_formula(c("C1"), "=B1+B2+SUM(B1:B2)").unwrap();

        assert_eq!(engine.get_value(c("C1")), FormulaValue::Number(20.0));
        for cell in ["B1", "B2", "C1"] {
            assert_eq!(engine.evaluation_count(c(cell)), 1, "{}", cell);
        }

        engine.set_value(c("A1"), 1.0).unwrap();
        let stats = engine.calculate();
        assert_eq!(stats.cells_calculated, 3);
        assert_eq!(engine.get_value(c("C1")), FormulaValue::Number(10.0));
    }

    #[test]
    fn test_cycle_is_stable_until_structural_edit() {
        let mut engine = Engine::new();
        engine.set_formula(c("A1"), "=B1").unwrap();
        engine.set_formula(c("B1"), "=A1").unwrap();
        engine.set_formula(c("C1"), "=A1+1").unwrap();

        let cycle = FormulaValue::Error(CellError::Cycle);
        assert_eq!(engine.get_value(c("C1")), cycle);
        assert_eq!(engine.cell_state(c("A1")), Some(CellState::Error));
        assert_eq!(engine.cell_state(c("B1")), Some(CellState::Error));
        assert_eq!(engine.cell_state(c("C1")), Some(CellState::Clean));

        // Invalidating a dependent does not recompute the cycle
        engine.invalidate(c("C1"));
        assert_eq!(engine.get_value(c("C1")), cycle);
        assert_eq!(engine.evaluation_count(c("A1")), 0);

        // Breaking the cycle with a constant lets everything compute again
        engine.set_value(c("B1"), 4.0).unwrap();
        assert_eq!(engine.get_value(c("A1")), FormulaValue::Number(4.0));
        assert_eq!(engine.get_value(c("C1")), FormulaValue::Number(5.0));
    }

    #[test]
    fn test_self_reference_through_range() {
        let mut engine = Engine::new();
        engine.set_formula(c("A3"), "=SUM(A1:A5)").unwrap();
        assert_eq!(engine.get_value(c("A3")), FormulaValue::Error(CellError::Cycle));
        assert_eq!(engine.calculate().circular_references, 1);
    }

    #[test]
    fn test_failed_formula_is_stored() {
        let mut engine = Engine::new();
        engine.set_formula(c("B1"), "=A1*2").unwrap();
        assert!(engine.set_formula(c("A1"), "=1+").is_err());

        assert_eq!(engine.cell_state(c("A1")), Some(CellState::Error));
        assert_eq!(engine.get_value(c("A1")), FormulaValue::Error(CellError::Name));
        assert_eq!(engine.get_value(c("B1")), FormulaValue::Error(CellError::Name));
        assert_eq!(engine.formula_text(c("A1")), Some("=1+"));
        assert!(matches!(engine.cell_error(c("A1")), Some(FormulaError::Parse(_))));
    }

    #[test]
    fn test_formula_on_missing_sheet_is_rejected() {
        let mut engine = Engine::new();
        let cell = CellCoordinate::new(4, 0, 0);
        assert!(matches!(
            engine.set_formula(cell, "=1"),
            Err(crate::Error::Core(gridcalc_core::Error::SheetOutOfBounds(4, 1)))
        ));
        assert!(engine.formula_cells().is_empty());
    }
}
