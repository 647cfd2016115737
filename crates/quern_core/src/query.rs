//! Structured query descriptions consumed by the execution engine.
//!
//! # Responsibility
//! - Describe raw and structured reads plus insert/update/delete targets.
//! - Keep SQL assembly out of operation code; engines own the translation.
//!
//! # Invariants
//! - A query value never executes anything by itself.
//! - `args`/`where_args` bind positionally, in declaration order.

use rusqlite::types::Value;

/// Free-form SQL with positional bind arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    pub sql: String,
    pub args: Vec<Value>,
}

impl RawQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    /// Appends one bind argument, consuming and returning the query.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }
}

/// Structured read against a single table.
///
/// Unset optional clauses are omitted from the generated SQL. `columns = None`
/// selects all columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub table: String,
    pub distinct: bool,
    pub columns: Option<Vec<String>>,
    pub selection: Option<String>,
    pub args: Vec<Value>,
    pub group_by: Option<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<u32>,
}

impl SelectQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Sets the `WHERE` clause text (without the keyword).
    pub fn selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = Some(selection.into());
        self
    }

    /// Appends one bind argument for the selection.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Insert target table.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub table: String,
}

impl InsertQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

/// Update target: table plus optional `WHERE` clause.
///
/// `where_clause = None` updates every row in the table.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub table: String,
    pub where_clause: Option<String>,
    pub where_args: Vec<Value>,
}

impl UpdateQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
            where_args: Vec::new(),
        }
    }

    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.where_args.push(value.into());
        self
    }
}

/// Delete target: table plus optional `WHERE` clause.
///
/// `where_clause = None` deletes every row in the table.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub table: String,
    pub where_clause: Option<String>,
    pub where_args: Vec<Value>,
}

impl DeleteQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
            where_args: Vec::new(),
        }
    }

    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.where_args.push(value.into());
        self
    }
}
