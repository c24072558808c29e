//! Built-in spreadsheet functions
//!
//! Each module exposes a `FUNCTIONS` table of descriptors. The registry is
//! built once per process and never changes afterwards.

pub mod info;
pub mod logical;
pub mod lookup;
pub mod math;
pub mod text;

use std::sync::OnceLock;

use ahash::AHashMap;
use gridcalc_core::CellError;

use crate::error::{FormulaError, FormulaResult};
use crate::value::{Array, FormulaValue};

/// Function implementation signature
///
/// Arguments arrive already coerced according to the descriptor's
/// [`ArgKind`]s. Failures are returned as error values.
pub type FunctionImpl = fn(&[FormulaValue]) -> FormulaValue;

/// How an argument is prepared before the function body runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Coerced to a number
    Number,
    /// Coerced to text
    Text,
    /// Coerced to a boolean
    Boolean,
    /// Any scalar; an error stops the call
    Any,
    /// Scalars or ranges the function flattens itself. References arrive as
    /// arrays; any error inside them stops the call.
    Values,
    /// A 2-D block; scalars are wrapped as 1×1
    Range,
    /// Passed through untouched; errors do not stop the call
    Unchecked,
}

/// Function definition
#[derive(Debug)]
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Argument kinds by position; the last one repeats
    pub args: &'static [ArgKind],
    /// Implementation
    pub implementation: FunctionImpl,
}

impl FunctionDef {
    /// Kind of the argument at `index`
    pub fn arg_kind(&self, index: usize) -> ArgKind {
        self.args
            .get(index)
            .or_else(|| self.args.last())
            .copied()
            .unwrap_or(ArgKind::Any)
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }

    /// Human readable arity, used in argument count errors
    pub fn arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }

    /// Check an argument count
    pub fn check_arity(&self, count: usize) -> FormulaResult<()> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(FormulaError::ArgumentCount {
                function: self.name.to_string(),
                expected: self.arity(),
                actual: count,
            })
        }
    }
}

impl PartialEq for FunctionDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Prepare an evaluated argument for a parameter of the given kind
///
/// `Err` carries the error value that ends the call.
pub fn coerce(kind: ArgKind, value: FormulaValue) -> Result<FormulaValue, CellError> {
    match kind {
        ArgKind::Number => value.scalar().to_number().map(FormulaValue::Number),
        ArgKind::Text => value.scalar().to_text().map(FormulaValue::String),
        ArgKind::Boolean => value.scalar().to_bool().map(FormulaValue::Boolean),
        ArgKind::Any => match value.scalar() {
            FormulaValue::Error(e) => Err(e),
            other => Ok(other),
        },
        ArgKind::Values => match value.first_error() {
            Some(e) => Err(e),
            None => Ok(value),
        },
        ArgKind::Range => match value {
            FormulaValue::Error(e) => Err(e),
            array @ FormulaValue::Array(_) => Ok(array),
            scalar => Ok(FormulaValue::Array(scalar.into_array())),
        },
        ArgKind::Unchecked => Ok(value),
    }
}

/// Global function registry (lazily initialized)
static REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

/// Function registry
pub struct FunctionRegistry {
    functions: AHashMap<&'static str, &'static FunctionDef>,
}

impl FunctionRegistry {
    /// The process-wide registry of built-in functions
    pub fn global() -> &'static FunctionRegistry {
        REGISTRY.get_or_init(Self::new)
    }

    fn new() -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
        };

        registry.register_all(math::FUNCTIONS);
        registry.register_all(logical::FUNCTIONS);
        registry.register_all(info::FUNCTIONS);
        registry.register_all(lookup::FUNCTIONS);
        registry.register_all(text::FUNCTIONS);

        registry
    }

    fn register_all(&mut self, defs: &'static [FunctionDef]) {
        for def in defs {
            self.functions.insert(def.name, def);
        }
    }

    /// Look up a function by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&'static FunctionDef> {
        self.functions.get(name.to_uppercase().as_str()).copied()
    }

    /// Look up a function by name, failing with `UnknownFunction`
    pub fn lookup(&self, name: &str) -> FormulaResult<&'static FunctionDef> {
        self.get(name)
            .ok_or_else(|| FormulaError::UnknownFunction(name.to_uppercase()))
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered names in alphabetical order
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

// === Helpers shared by the function modules ===

/// Numbers from a `Values` argument list
///
/// Direct scalars are coerced (text that is not numeric is `#VALUE!`);
/// inside arrays only numbers count.
pub(crate) fn collect_numbers(args: &[FormulaValue]) -> Result<Vec<f64>, CellError> {
    let mut numbers = Vec::new();
    for arg in args {
        match arg {
            FormulaValue::Array(array) => {
                for value in array.stored() {
                    match value {
                        FormulaValue::Number(n) => numbers.push(*n),
                        FormulaValue::Error(e) => return Err(*e),
                        _ => {}
                    }
                }
            }
            FormulaValue::Blank => {}
            scalar => numbers.push(scalar.to_number()?),
        }
    }
    Ok(numbers)
}

/// Read a numeric argument that was coerced by [`ArgKind::Number`]
pub(crate) fn number_arg(args: &[FormulaValue], index: usize, default: f64) -> f64 {
    match args.get(index) {
        Some(FormulaValue::Number(n)) => *n,
        Some(other) => other.to_number().unwrap_or(default),
        None => default,
    }
}

/// Read a text argument that was coerced by [`ArgKind::Text`]
pub(crate) fn text_arg(args: &[FormulaValue], index: usize) -> String {
    args.get(index)
        .and_then(|v| v.to_text().ok())
        .unwrap_or_default()
}

static EMPTY: Array = Array::blank(0, 0);

/// An argument that was coerced by [`ArgKind::Range`]
pub(crate) fn range_arg(args: &[FormulaValue], index: usize) -> &Array {
    match args.get(index) {
        Some(FormulaValue::Array(array)) => array,
        _ => &EMPTY,
    }
}

/// Turn a numeric result into a value, mapping non-finite results to `#NUM!`
pub(crate) fn finite(n: f64) -> FormulaValue {
    if n.is_finite() {
        FormulaValue::Number(n)
    } else {
        FormulaValue::Error(CellError::Num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = FunctionRegistry::global();
        assert_eq!(registry.lookup("sum").unwrap().name, "SUM");
        assert_eq!(registry.lookup("Vlookup").unwrap().name, "VLOOKUP");
        assert_eq!(
            registry.lookup("NOPE"),
            Err(FormulaError::UnknownFunction("NOPE".into()))
        );
    }

    #[test]
    fn test_registry_contents() {
        let names = FunctionRegistry::global().names();
        for expected in [
            "SUM", "PRODUCT", "AVERAGE", "COUNT", "COUNTA", "COUNTBLANK", "MIN", "MAX", "ABS",
            "INT", "MOD", "POWER", "SQRT", "ROUND", "ROUNDUP", "ROUNDDOWN", "TRUNC", "SIGN", "PI",
            "IF", "AND", "OR", "NOT", "XOR", "TRUE", "FALSE", "IFERROR", "IFNA", "ISERROR",
            "ISERR", "ISNA", "ISBLANK", "ISNUMBER", "ISTEXT", "ISLOGICAL", "NA", "VLOOKUP",
            "HLOOKUP", "MATCH", "INDEX", "CHOOSE", "ROWS", "COLUMNS", "CONCATENATE", "LEN",
            "LEFT", "RIGHT", "MID", "UPPER", "LOWER", "TRIM", "REPT", "EXACT", "VALUE",
        ] {
            assert!(names.contains(&expected), "{} is not registered", expected);
        }
    }

    #[test]
    fn test_arity_checks() {
        let round = FunctionRegistry::global().lookup("ROUND").unwrap();
        assert!(round.check_arity(1).is_ok());
        assert!(round.check_arity(2).is_ok());
        assert_eq!(
            round.check_arity(3),
            Err(FormulaError::ArgumentCount {
                function: "ROUND".into(),
                expected: "1 to 2".into(),
                actual: 3,
            })
        );
        let sum = FunctionRegistry::global().lookup("SUM").unwrap();
        assert_eq!(sum.arity(), "at least 1");
    }

    #[test]
    fn test_last_arg_kind_repeats() {
        let choose = FunctionRegistry::global().lookup("CHOOSE").unwrap();
        assert_eq!(choose.arg_kind(0), ArgKind::Number);
        assert_eq!(choose.arg_kind(5), ArgKind::Unchecked);
    }

    #[test]
    fn test_coercion_by_kind() {
        assert_eq!(
            coerce(ArgKind::Number, FormulaValue::from("2")),
            Ok(FormulaValue::Number(2.0))
        );
        assert_eq!(
            coerce(ArgKind::Number, FormulaValue::from("x")),
            Err(CellError::Value)
        );
        assert_eq!(
            coerce(ArgKind::Text, FormulaValue::Number(1.5)),
            Ok(FormulaValue::String("1.5".into()))
        );
        let with_error = FormulaValue::Array(vec![vec![FormulaValue::Error(CellError::Na)]].into());
        assert_eq!(coerce(ArgKind::Values, with_error.clone()), Err(CellError::Na));
        assert_eq!(coerce(ArgKind::Unchecked, with_error.clone()), Ok(with_error));
        assert_eq!(
            coerce(ArgKind::Range, FormulaValue::Number(1.0)),
            Ok(FormulaValue::Array(vec![vec![FormulaValue::Number(1.0)]].into()))
        );
    }
}
