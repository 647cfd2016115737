//! Storage-native row representation.
//!
//! # Responsibility
//! - Carry column/value pairs between mappers, resolvers and the engine.
//! - Keep the value type shared with the underlying SQLite binding.
//!
//! # Invariants
//! - Column order is preserved as written.
//! - Writing an existing column replaces its value instead of duplicating it.

pub use rusqlite::types::Value;

/// One row of engine data: ordered column/value pairs.
///
/// Used in both directions: mappers produce a `Row` from a domain object for
/// writes, and engine queries return result rows in the same shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a column value, consuming and returning the row.
    ///
    /// Chainable, intended for mapper bodies:
    /// `Row::new().with("email", email.clone()).with("age", 42i64)`.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Adds or replaces a column value in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| *name == column) {
            entry.1 = value;
        } else {
            self.entries.push((column, value));
        }
    }

    /// Returns the value stored for `column`, if any.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Returns the number of columns in this row.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether this row has no columns.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Iterates `(column, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}
