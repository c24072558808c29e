//! Reference resolution
//!
//! Binding turns a parsed [`FormulaExpr`] into a [`BoundExpr`]: sheet names
//! become indices, defined names are parsed and bound once and shared,
//! function names become registry entries, and arity is checked. Everything
//! the formula reads is collected as [`Precedent`]s for the dependency graph.
//! Binding never reads cell values.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use gridcalc_core::{CellCoordinate, CellRange, DefinedName, NameScope, SheetRange, Workbook};

use crate::ast::{BinaryOperator, FormulaExpr, SheetRef, UnaryOperator};
use crate::dependency::Precedent;
use crate::error::{FormulaError, FormulaResult, RefError};
use crate::functions::{FunctionDef, FunctionRegistry};
use crate::parser::parse_formula;
use crate::serializer::serialize_formula;
use crate::value::FormulaValue;

/// Sheet lookup used while binding
pub trait SheetDirectory {
    /// Index of a sheet by name (case-insensitive)
    fn sheet_index(&self, name: &str) -> Option<usize>;
    fn sheet_count(&self) -> usize;
}

/// Defined-name lookup used while binding
pub trait NameTable {
    /// Definition visible from `sheet`: sheet scope first, then workbook scope
    fn lookup_name(&self, name: &str, sheet: usize) -> Option<&DefinedName>;

    /// Definition scoped to exactly `sheet`
    fn lookup_sheet_name(&self, name: &str, sheet: usize) -> Option<&DefinedName>;
}

impl SheetDirectory for Workbook {
    fn sheet_index(&self, name: &str) -> Option<usize> {
        Workbook::sheet_index(self, name)
    }

    fn sheet_count(&self) -> usize {
        Workbook::sheet_count(self)
    }
}

impl NameTable for Workbook {
    fn lookup_name(&self, name: &str, sheet: usize) -> Option<&DefinedName> {
        self.get_name(name, sheet)
    }

    fn lookup_sheet_name(&self, name: &str, sheet: usize) -> Option<&DefinedName> {
        self.names().get_exact(name, NameScope::Sheet(sheet))
    }
}

/// A resolved expression, ready for evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    Literal(FormulaValue),
    Cell(CellCoordinate),
    Range(SheetRange),
    /// Parameterless defined name
    Name(Arc<BoundName>),
    /// Argument slot of the enclosing user-defined function
    Param(usize),
    Unary {
        op: UnaryOperator,
        operand: Box<BoundExpr>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    /// Built-in function call
    Call {
        function: &'static FunctionDef,
        args: Vec<BoundExpr>,
    },
    /// Call of a defined name with parameters
    UserCall {
        function: Arc<BoundName>,
        args: Vec<BoundExpr>,
    },
    Array(Vec<Vec<BoundExpr>>),
}

impl BoundExpr {
    /// Whether this reads exactly one cell, directly or through names
    pub fn is_cell_reference(&self) -> bool {
        match self {
            BoundExpr::Cell(_) => true,
            BoundExpr::Name(name) => name.body.is_cell_reference(),
            _ => false,
        }
    }
}

/// A defined name bound for one using sheet
#[derive(Debug, Clone, PartialEq)]
pub struct BoundName {
    /// Name as written in its definition
    pub name: String,
    /// Lower-cased name
    pub key: String,
    /// Number of parameters; zero for a plain name
    pub parameters: usize,
    pub body: BoundExpr,
    /// Everything the body reads
    pub precedents: Vec<Precedent>,
}

/// Bound names keyed by (lower-cased name, using sheet)
///
/// Valid until a name or sheet changes; the owner clears it then.
#[derive(Debug, Clone, Default)]
pub struct NameCache {
    entries: AHashMap<(String, usize), Arc<BoundName>>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The result of binding a formula
#[derive(Debug, Clone, PartialEq)]
pub struct BoundFormula {
    pub expr: BoundExpr,
    /// Deduplicated, in first-use order
    pub precedents: Vec<Precedent>,
}

/// Binds formulas written on one sheet
pub struct Resolver<'a> {
    sheets: &'a dyn SheetDirectory,
    names: &'a dyn NameTable,
    sheet: usize,
    cache: NameCache,
    /// Names whose bodies are being bound, for cycle detection
    in_progress: Vec<String>,
    /// Parameters visible in the body being bound, lower-cased
    params: Vec<String>,
    precedents: Vec<Precedent>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver for formulas on `sheet`
    pub fn new(sheets: &'a dyn SheetDirectory, names: &'a dyn NameTable, sheet: usize) -> Self {
        Self {
            sheets,
            names,
            sheet,
            cache: NameCache::new(),
            in_progress: Vec::new(),
            params: Vec::new(),
            precedents: Vec::new(),
        }
    }

    /// Reuse names bound by an earlier resolver
    pub fn with_cache(mut self, cache: NameCache) -> Self {
        self.cache = cache;
        self
    }

    /// Hand back the name cache for the next resolver
    pub fn into_cache(self) -> NameCache {
        self.cache
    }

    /// Bind a parsed formula
    pub fn bind(&mut self, expr: &FormulaExpr) -> FormulaResult<BoundFormula> {
        self.precedents.clear();
        self.params.clear();
        self.in_progress.clear();

        let expr = self.bind_expr(expr)?;
        Ok(BoundFormula {
            expr,
            precedents: dedup(std::mem::take(&mut self.precedents)),
        })
    }

    fn bind_expr(&mut self, expr: &FormulaExpr) -> FormulaResult<BoundExpr> {
        match expr {
            FormulaExpr::Number(n) => Ok(BoundExpr::Literal(FormulaValue::Number(*n))),
            FormulaExpr::String(s) => Ok(BoundExpr::Literal(FormulaValue::String(s.clone()))),
            FormulaExpr::Boolean(b) => Ok(BoundExpr::Literal(FormulaValue::Boolean(*b))),
            FormulaExpr::Error(e) => Ok(BoundExpr::Literal(FormulaValue::Error(*e))),

            FormulaExpr::CellRef(r) => {
                let (first, last) = self.resolve_sheets(&r.sheet)?;
                if first == last {
                    Ok(self.cell(CellCoordinate::from_address(first, r.address)))
                } else {
                    Ok(self.range(SheetRange::new(first, last, CellRange::single(r.address))))
                }
            }

            FormulaExpr::RangeRef(r) => {
                let (first, last) = self.resolve_sheets(&r.sheet)?;
                Ok(self.range(SheetRange::new(first, last, r.range)))
            }

            FormulaExpr::NameRef(r) => {
                let bound = match &r.sheet {
                    Some(sheet) => self.bind_qualified_name(sheet, &r.name)?,
                    None => {
                        if let Some(slot) = self.param_slot(&r.name) {
                            return Ok(BoundExpr::Param(slot));
                        }
                        self.bind_name(&r.name)?
                    }
                };
                if bound.parameters > 0 {
                    return Err(FormulaError::ArgumentCount {
                        function: bound.name.clone(),
                        expected: bound.parameters.to_string(),
                        actual: 0,
                    });
                }
                Ok(BoundExpr::Name(bound))
            }

            FormulaExpr::BinaryOp {
                op: BinaryOperator::Range,
                left,
                right,
            } => self.bind_range_operator(expr, left, right),

            FormulaExpr::BinaryOp { op, left, right } => Ok(BoundExpr::Binary {
                op: *op,
                left: Box::new(self.bind_expr(left)?),
                right: Box::new(self.bind_expr(right)?),
            }),

            FormulaExpr::UnaryOp { op, operand } => Ok(BoundExpr::Unary {
                op: *op,
                operand: Box::new(self.bind_expr(operand)?),
            }),

            FormulaExpr::Paren(inner) => self.bind_expr(inner),

            FormulaExpr::Function { name, args } => self.bind_call(name, args),

            FormulaExpr::Array(rows) => {
                let rows = rows
                    .iter()
                    .map(|row| row.iter().map(|e| self.bind_expr(e)).collect())
                    .collect::<FormulaResult<_>>()?;
                Ok(BoundExpr::Array(rows))
            }
        }
    }

    fn cell(&mut self, cell: CellCoordinate) -> BoundExpr {
        self.precedents.push(Precedent::Cell(cell));
        BoundExpr::Cell(cell)
    }

    fn range(&mut self, range: SheetRange) -> BoundExpr {
        self.precedents.push(Precedent::Range(range.relative()));
        BoundExpr::Range(range)
    }

    /// Sheet span of a reference; no qualifier means the formula's own sheet
    fn resolve_sheets(&self, sheet: &Option<SheetRef>) -> FormulaResult<(usize, usize)> {
        let index = |name: &str| {
            self.sheets
                .sheet_index(name)
                .ok_or_else(|| FormulaError::from(RefError::UnknownSheet(name.to_string())))
        };
        match sheet {
            None => Ok((self.sheet, self.sheet)),
            Some(SheetRef::Single(name)) => {
                let i = index(name)?;
                Ok((i, i))
            }
            Some(SheetRef::Span(first, last)) => {
                let (a, b) = (index(first)?, index(last)?);
                Ok((a.min(b), a.max(b)))
            }
        }
    }

    /// `:` between operands the parser could not fold into a range
    fn bind_range_operator(
        &mut self,
        expr: &FormulaExpr,
        left: &FormulaExpr,
        right: &FormulaExpr,
    ) -> FormulaResult<BoundExpr> {
        let invalid = || {
            let text = serialize_formula(expr);
            FormulaError::from(RefError::InvalidRange(text.trim_start_matches('=').to_string()))
        };

        let (FormulaExpr::CellRef(start), FormulaExpr::CellRef(end)) = (left, right) else {
            return Err(invalid());
        };
        let (s1, s2) = self.resolve_sheets(&start.sheet)?;
        let (e1, e2) = self.resolve_sheets(&end.sheet)?;
        if s1 != s2 || (s1, s2) != (e1, e2) {
            return Err(invalid());
        }
        Ok(self.range(SheetRange::on_sheet(
            s1,
            CellRange::new(start.address, end.address),
        )))
    }

    fn bind_call(&mut self, name: &str, args: &[FormulaExpr]) -> FormulaResult<BoundExpr> {
        if let Some(function) = FunctionRegistry::global().get(name) {
            function.check_arity(args.len())?;
            let args = self.bind_args(args)?;
            return Ok(BoundExpr::Call { function, args });
        }

        if self.names.lookup_name(name, self.sheet).is_none() {
            return Err(FormulaError::UnknownFunction(name.to_uppercase()));
        }
        let function = self.bind_name(name)?;
        if function.parameters != args.len() {
            return Err(FormulaError::ArgumentCount {
                function: function.name.clone(),
                expected: function.parameters.to_string(),
                actual: args.len(),
            });
        }
        let args = self.bind_args(args)?;
        Ok(BoundExpr::UserCall { function, args })
    }

    fn bind_args(&mut self, args: &[FormulaExpr]) -> FormulaResult<Vec<BoundExpr>> {
        args.iter().map(|arg| self.bind_expr(arg)).collect()
    }

    fn param_slot(&self, name: &str) -> Option<usize> {
        let key = name.to_lowercase();
        self.params.iter().position(|p| *p == key)
    }

    /// Bind `Sheet2!Rate`: the name must be scoped to that sheet and binds
    /// as it would in a formula there
    fn bind_qualified_name(&mut self, sheet: &SheetRef, name: &str) -> FormulaResult<Arc<BoundName>> {
        let SheetRef::Single(sheet_name) = sheet else {
            return Err(RefError::UnknownName(name.to_string()).into());
        };
        let index = self
            .sheets
            .sheet_index(sheet_name)
            .ok_or_else(|| FormulaError::from(RefError::UnknownSheet(sheet_name.clone())))?;
        if self.names.lookup_sheet_name(name, index).is_none() {
            return Err(RefError::UnknownName(format!("{}!{}", sheet_name, name)).into());
        }

        let outer_sheet = std::mem::replace(&mut self.sheet, index);
        let result = self.bind_name(name);
        self.sheet = outer_sheet;
        result
    }

    /// Bind a defined name as seen from this resolver's sheet
    fn bind_name(&mut self, name: &str) -> FormulaResult<Arc<BoundName>> {
        let key = name.to_lowercase();

        if let Some(bound) = self.cache.entries.get(&(key.clone(), self.sheet)) {
            let bound = Arc::clone(bound);
            self.precedents.push(Precedent::Name(key));
            self.precedents.extend(bound.precedents.iter().cloned());
            return Ok(bound);
        }

        let definition = self
            .names
            .lookup_name(name, self.sheet)
            .ok_or_else(|| RefError::UnknownName(name.to_string()))?;
        if self.in_progress.contains(&key) {
            return Err(RefError::CircularName(definition.name.clone()).into());
        }

        let display_name = definition.name.clone();
        let parameter_count = definition.parameters.len();
        let parameters: Vec<String> = definition
            .parameters
            .iter()
            .map(|p| p.to_lowercase())
            .collect();
        let body = parse_formula(definition.expression())?;

        tracing::trace!(name = %display_name, sheet = self.sheet, "binding defined name");

        // The body gets its own precedent list and parameter scope
        self.in_progress.push(key.clone());
        let outer_precedents = std::mem::take(&mut self.precedents);
        let outer_params = std::mem::replace(&mut self.params, parameters);

        let result = self.bind_expr(&body);

        let body_precedents = std::mem::replace(&mut self.precedents, outer_precedents);
        self.params = outer_params;
        self.in_progress.pop();

        let bound = Arc::new(BoundName {
            name: display_name,
            key: key.clone(),
            parameters: parameter_count,
            body: result?,
            precedents: dedup(body_precedents),
        });

        self.cache
            .entries
            .insert((key.clone(), self.sheet), Arc::clone(&bound));
        self.precedents.push(Precedent::Name(key));
        self.precedents.extend(bound.precedents.iter().cloned());
        Ok(bound)
    }
}

fn dedup(precedents: Vec<Precedent>) -> Vec<Precedent> {
    let mut seen = AHashSet::new();
    precedents
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
