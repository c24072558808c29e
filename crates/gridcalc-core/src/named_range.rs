//! Defined names
//!
//! A defined name gives a label to a reference, a constant or a formula so
//! other formulas can use it. Names are case-insensitive and live either in
//! workbook scope or in the scope of one sheet; a sheet-scoped name shadows a
//! workbook-scoped name with the same spelling on that sheet.
//!
//! A name may also declare parameters, in which case it is a user-defined
//! function and is invoked like one:
//!
//! ```text
//! Tax(amount) := amount * Rate
//! =Tax(B2) + Tax(B3)
//! ```

use crate::cell::CellAddress;
use crate::error::{Error, Result};
use crate::MAX_NAME_LEN;
use ahash::AHashMap;
use lazy_regex::regex_is_match;

/// Scope of a defined name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameScope {
    /// Available throughout the workbook (global)
    Workbook,
    /// Scoped to a specific sheet (local)
    Sheet(usize),
}

/// A defined name
#[derive(Debug, Clone, PartialEq)]
pub struct DefinedName {
    /// The name as the user spelled it
    pub name: String,
    pub scope: NameScope,
    /// Formula text the name stands for, with or without a leading `=`
    /// (`Sheet1!$B$1`, `0.05`, `=SUM(Sales)`)
    pub refers_to: String,
    /// Parameter names; non-empty for user-defined functions
    pub parameters: Vec<String>,
}

impl DefinedName {
    pub fn new(name: impl Into<String>, refers_to: impl Into<String>, scope: NameScope) -> Self {
        Self {
            name: name.into(),
            scope,
            refers_to: refers_to.into(),
            parameters: Vec::new(),
        }
    }

    /// Create a workbook-scoped name
    pub fn workbook_scope(name: impl Into<String>, refers_to: impl Into<String>) -> Self {
        Self::new(name, refers_to, NameScope::Workbook)
    }

    /// Create a sheet-scoped name
    pub fn sheet_scope(
        name: impl Into<String>,
        refers_to: impl Into<String>,
        sheet_index: usize,
    ) -> Self {
        Self::new(name, refers_to, NameScope::Sheet(sheet_index))
    }

    /// Turn the name into a user-defined function with these parameters
    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the name takes arguments
    pub fn is_function(&self) -> bool {
        !self.parameters.is_empty()
    }

    /// The refers-to text without a leading `=`
    pub fn expression(&self) -> &str {
        self.refers_to.strip_prefix('=').unwrap_or(&self.refers_to)
    }

    /// Check the name and its parameter list against the naming rules
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        for (i, param) in self.parameters.iter().enumerate() {
            validate_name(param)?;
            if self.parameters[..i]
                .iter()
                .any(|p| p.eq_ignore_ascii_case(param))
            {
                return Err(Error::invalid_name(
                    &self.name,
                    format!("parameter '{}' is declared twice", param),
                ));
            }
        }
        Ok(())
    }
}

/// Check a string against the defined-name rules:
///
/// - starts with a letter, `_` or `\`
/// - continues with letters, digits, `_`, `.` or `\` (so no spaces)
/// - at most 255 characters
/// - does not read as a cell reference in A1 or R1C1 notation
/// - is not a boolean literal
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_name(name, "name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::invalid_name(
            name,
            format!("name is longer than {} characters", MAX_NAME_LEN),
        ));
    }
    if !regex_is_match!(r"^[\p{L}_\\][\p{L}\p{N}_.\\]*$", name) {
        return Err(Error::invalid_name(
            name,
            "must start with a letter, '_' or '\\' and contain only letters, digits, '_', '.' or '\\'",
        ));
    }
    if CellAddress::parse(name).is_ok() {
        return Err(Error::invalid_name(name, "name looks like an A1 cell reference"));
    }
    if regex_is_match!(r"(?i)^(R[0-9]*)?(C[0-9]*)?$", name) {
        return Err(Error::invalid_name(name, "name looks like an R1C1 cell reference"));
    }
    if name.eq_ignore_ascii_case("TRUE") || name.eq_ignore_ascii_case("FALSE") {
        return Err(Error::invalid_name(name, "name is a boolean literal"));
    }
    Ok(())
}

/// Defined names with case-insensitive, scope-aware lookup
#[derive(Debug, Default, Clone)]
pub struct NameCollection {
    /// Keyed by (lowercase name, scope)
    names: AHashMap<(String, NameScope), DefinedName>,
}

impl NameCollection {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str, scope: NameScope) -> (String, NameScope) {
        (name.to_lowercase(), scope)
    }

    /// Define a new name
    ///
    /// Fails if the name breaks the naming rules or already exists in the
    /// same scope.
    pub fn define(&mut self, name: DefinedName) -> Result<()> {
        name.validate()?;
        let key = Self::key(&name.name, name.scope);
        if self.names.contains_key(&key) {
            return Err(Error::DuplicateName(name.name));
        }
        self.names.insert(key, name);
        Ok(())
    }

    /// Define a name, replacing an existing definition in the same scope
    pub fn define_or_replace(&mut self, name: DefinedName) -> Result<Option<DefinedName>> {
        name.validate()?;
        let key = Self::key(&name.name, name.scope);
        Ok(self.names.insert(key, name))
    }

    /// Look up a name as seen from a formula on `current_sheet`
    ///
    /// A name scoped to that sheet wins over a workbook-scoped one.
    pub fn get(&self, name: &str, current_sheet: usize) -> Option<&DefinedName> {
        self.names
            .get(&Self::key(name, NameScope::Sheet(current_sheet)))
            .or_else(|| self.names.get(&Self::key(name, NameScope::Workbook)))
    }

    /// Look up a name in exactly one scope
    pub fn get_exact(&self, name: &str, scope: NameScope) -> Option<&DefinedName> {
        self.names.get(&Self::key(name, scope))
    }

    pub fn remove(&mut self, name: &str, scope: NameScope) -> Option<DefinedName> {
        self.names.remove(&Self::key(name, scope))
    }

    pub fn contains(&self, name: &str, scope: NameScope) -> bool {
        self.names.contains_key(&Self::key(name, scope))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DefinedName> {
        self.names.values()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Drop names scoped to a removed sheet and renumber later sheet scopes
    pub fn remove_sheet(&mut self, sheet_index: usize) {
        let names = std::mem::take(&mut self.names);
        self.names = names
            .into_iter()
            .filter_map(|((key, scope), mut name)| {
                let scope = match scope {
                    NameScope::Sheet(i) if i == sheet_index => return None,
                    NameScope::Sheet(i) if i > sheet_index => NameScope::Sheet(i - 1),
                    other => other,
                };
                name.scope = scope;
                Some(((key, scope), name))
            })
            .collect();
    }
}
