//! # gridcalc-formula
//!
//! Formula language for gridcalc.
//!
//! This crate provides:
//! - Tokenizing and parsing (text → [`FormulaExpr`]), and serializing back to text
//! - Reference resolution (AST → [`BoundExpr`]) against sheets and defined names
//! - Evaluation of bound expressions through a [`CellValueProvider`]
//! - Built-in functions with spreadsheet coercion rules
//! - The [`DependencyGraph`] used for incremental recalculation
//!
//! ## Example
//!
//! ```rust
//! use gridcalc_core::{CellCoordinate, Workbook};
//! use gridcalc_formula::{evaluate, parse_formula, FormulaValue, Resolver, WorkbookValues};
//!
//! let mut workbook = Workbook::new();
//! workbook.set_cell_value(CellCoordinate::new(0, 0, 0), 4.0.into()).unwrap();
//!
//! let ast = parse_formula("=SUM(A1, 2) * 10").unwrap();
//! let bound = Resolver::new(&workbook, &workbook, 0).bind(&ast).unwrap();
//! let value = evaluate(&bound.expr, &WorkbookValues(&workbook));
//! assert_eq!(value, FormulaValue::Number(60.0));
//! ```

pub mod ast;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod resolver;
pub mod serializer;
pub mod tokenizer;
pub mod value;

pub use ast::{
    BinaryOperator, CellReference, FormulaExpr, NameReference, RangeReference, SheetRef,
    UnaryOperator,
};
pub use dependency::{DependencyGraph, Precedent};
pub use error::{EvalError, FormulaError, FormulaResult, LexError, ParseError, RefError};
pub use evaluator::{
    dense_cells, evaluate, sparse_cells, CellValueProvider, Evaluator, StoredCells, WorkbookValues,
    DEFAULT_MAX_EVAL_DEPTH,
};
pub use functions::{ArgKind, FunctionDef, FunctionRegistry};
pub use parser::{parse, parse_formula, parse_formula_with_options, ParseOptions};
pub use resolver::{BoundExpr, BoundFormula, BoundName, NameCache, NameTable, Resolver, SheetDirectory};
pub use serializer::serialize_formula;
pub use tokenizer::{tokenize, Token, TokenKind};
pub use value::{Array, FormulaValue};
