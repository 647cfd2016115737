//! Execution-engine contract and errors.
//!
//! # Responsibility
//! - Define the object-safe boundary between operations and the relational
//!   engine: queries, writes and the transaction triple.
//! - Own engine-level error classification.
//!
//! # Invariants
//! - Engines never publish change notifications; that is orchestrator work.
//! - `insert` propagates engine rejections as errors, never a sentinel value.
//! - Transactions do not nest on one handle.

use crate::query::{DeleteQuery, InsertQuery, RawQuery, SelectQuery, UpdateQuery};
use crate::row::Row;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod sqlite;

pub use sqlite::SqliteEngine;

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level failure.
#[derive(Debug)]
pub enum EngineError {
    /// Underlying SQLite rejection, including constraint violations.
    Sqlite(rusqlite::Error),
    /// `begin_transaction` was called while a transaction is already open.
    TransactionAlreadyActive,
    /// `set_transaction_successful`/`end_transaction` without an open
    /// transaction.
    NoActiveTransaction,
    /// Structurally invalid request (empty table name, empty row, ...).
    InvalidQuery(String),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::TransactionAlreadyActive => {
                write!(f, "a transaction is already active on this engine handle")
            }
            Self::NoActiveTransaction => {
                write!(f, "no transaction is active on this engine handle")
            }
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::TransactionAlreadyActive
            | Self::NoActiveTransaction
            | Self::InvalidQuery(_) => None,
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Execution boundary over one live relational connection.
///
/// One engine instance wraps one connection for its whole lifetime and is
/// reused across operations. Engines are not designed for concurrent mutation
/// from several threads; callers keep single-writer discipline, mirroring a
/// single-connection relational engine.
///
/// # Contract
/// - `update`/`delete` return affected-row counts; zero is a legitimate
///   outcome, not an error.
/// - `end_transaction` commits when the transaction was marked successful and
///   rolls back otherwise.
pub trait Engine {
    /// Runs free-form SQL and returns all result rows.
    fn raw_query(&self, query: &RawQuery) -> EngineResult<Vec<Row>>;

    /// Runs a structured single-table read and returns all result rows.
    fn query(&self, query: &SelectQuery) -> EngineResult<Vec<Row>>;

    /// Inserts one row and returns the generated row id.
    ///
    /// # Errors
    /// Fails loudly when the engine rejects the row (constraint violation,
    /// unknown table, empty row). No silent sentinel returns.
    fn insert(&self, query: &InsertQuery, row: &Row) -> EngineResult<i64>;

    /// Updates matching rows and returns the affected-row count.
    fn update(&self, query: &UpdateQuery, row: &Row) -> EngineResult<usize>;

    /// Deletes matching rows and returns the affected-row count.
    fn delete(&self, query: &DeleteQuery) -> EngineResult<usize>;

    /// Whether this engine can wrap batches in a transaction.
    fn transactions_supported(&self) -> bool;

    /// Opens a transaction on this handle.
    ///
    /// # Errors
    /// Returns [`EngineError::TransactionAlreadyActive`] when one is open;
    /// transactions are not nested.
    fn begin_transaction(&self) -> EngineResult<()>;

    /// Marks the open transaction as successful so `end_transaction` commits.
    fn set_transaction_successful(&self) -> EngineResult<()>;

    /// Closes the open transaction: commit if marked successful, else
    /// rollback.
    fn end_transaction(&self) -> EngineResult<()>;
}
