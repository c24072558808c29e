//! Engine error type

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Addressing, sheet or name problem in the workbook
    #[error(transparent)]
    Core(#[from] gridcalc_core::Error),

    /// Formula text that could not be parsed or bound
    #[error(transparent)]
    Formula(#[from] gridcalc_formula::FormulaError),
}
