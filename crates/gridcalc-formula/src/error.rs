//! Formula error types
//!
//! Two layers live here. [`FormulaError`] covers text that cannot be turned
//! into an evaluable formula (lexing, parsing, binding); it is returned as a
//! `Result`. [`EvalError`] covers failures during evaluation; those never
//! escape as `Err` and instead become a [`CellError`] value that propagates
//! through dependent formulas.

use gridcalc_core::CellError;
use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Formula text could not be split into tokens
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Lex error at position {position}: {reason}")]
pub struct LexError {
    /// Byte offset into the formula text
    pub position: usize,
    pub reason: String,
}

/// Token stream does not form a valid formula
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error at position {position}: {message}")]
pub struct ParseError {
    /// Byte offset into the formula text
    pub position: usize,
    pub message: String,
}

/// A reference could not be bound to the workbook
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefError {
    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),

    #[error("Unknown name: {0}")]
    UnknownName(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// The name refers back to itself, directly or through other names
    #[error("Circular name definition: {0}")]
    CircularName(String),
}

/// Errors that stop a formula from being parsed or bound
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Reference(#[from] RefError),

    /// Unknown function
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },
}

impl FormulaError {
    /// The error value a cell shows when its formula fails this way
    pub fn cell_error(&self) -> CellError {
        match self {
            FormulaError::Lex(_) | FormulaError::Parse(_) | FormulaError::UnknownFunction(_) => {
                CellError::Name
            }
            FormulaError::Reference(RefError::UnknownName(_)) => CellError::Name,
            FormulaError::Reference(RefError::UnknownSheet(_) | RefError::InvalidRange(_)) => {
                CellError::Ref
            }
            FormulaError::Reference(RefError::CircularName(_)) => CellError::Cycle,
            FormulaError::ArgumentCount { .. } => CellError::Value,
        }
    }

    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        FormulaError::Parse(ParseError {
            position,
            message: message.into(),
        })
    }

    pub(crate) fn lex(position: usize, reason: impl Into<String>) -> Self {
        FormulaError::Lex(LexError {
            position,
            reason: reason.into(),
        })
    }
}

/// Failures raised while evaluating a bound formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivideByZero,
    #[error("invalid reference")]
    InvalidRef,
    #[error("unknown name")]
    UnknownName,
    #[error("type mismatch")]
    TypeMismatch,
    #[error("numeric overflow")]
    NumericOverflow,
    #[error("value not available")]
    NotAvailable,
    #[error("circular reference")]
    Cycle,
    #[error("evaluation nested too deeply")]
    StackTooDeep,
}

impl From<EvalError> for CellError {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::DivideByZero => CellError::Div0,
            EvalError::InvalidRef => CellError::Ref,
            EvalError::UnknownName => CellError::Name,
            EvalError::TypeMismatch => CellError::Value,
            EvalError::NumericOverflow | EvalError::StackTooDeep => CellError::Num,
            EvalError::NotAvailable => CellError::Na,
            EvalError::Cycle => CellError::Cycle,
        }
    }
}
