//! SQLite-backed execution engine.
//!
//! # Responsibility
//! - Translate query descriptions into SQL against one rusqlite connection.
//! - Track transaction state for the begin/mark-successful/end triple.
//!
//! # Invariants
//! - Connections opened here have `foreign_keys=ON` and a busy timeout.
//! - `end_transaction` always clears transaction state, commit or rollback.
//! - The engine is single-writer; it is deliberately not `Sync`.

use super::{Engine, EngineError, EngineResult};
use crate::query::{DeleteQuery, InsertQuery, RawQuery, SelectQuery, UpdateQuery};
use crate::row::Row;
use log::{debug, error, info};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Statement};
use std::cell::Cell;
use std::path::Path;
use std::time::{Duration, Instant};

/// Execution engine over one live SQLite connection.
pub struct SqliteEngine {
    conn: Connection,
    in_transaction: Cell<bool>,
    transaction_successful: Cell<bool>,
}

impl SqliteEngine {
    /// Opens a SQLite database file and configures it for engine use.
    ///
    /// # Side effects
    /// - Applies connection pragmas and busy timeout.
    /// - Emits `engine_open` logging events with duration and status.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        Self::open_mode("file", Connection::open(path))
    }

    /// Opens an in-memory SQLite database and configures it for engine use.
    ///
    /// # Side effects
    /// - Applies connection pragmas and busy timeout.
    /// - Emits `engine_open` logging events with duration and status.
    pub fn open_in_memory() -> EngineResult<Self> {
        Self::open_mode("memory", Connection::open_in_memory())
    }

    /// Wraps an already-configured connection.
    ///
    /// No pragmas are applied; the caller owns connection configuration and
    /// schema setup. The schema is assumed to be fixed and pre-existing.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            in_transaction: Cell::new(false),
            transaction_successful: Cell::new(false),
        }
    }

    fn open_mode(mode: &'static str, opened: rusqlite::Result<Connection>) -> EngineResult<Self> {
        let started_at = Instant::now();
        info!("event=engine_open module=engine status=start mode={mode}");

        let conn = match opened {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=engine_open module=engine status=error mode={mode} duration_ms={} error_code=open_failed error={err}",
                    started_at.elapsed().as_millis()
                );
                return Err(err.into());
            }
        };

        if let Err(err) = bootstrap_connection(&conn) {
            error!(
                "event=engine_open module=engine status=error mode={mode} duration_ms={} error_code=bootstrap_failed error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(err);
        }

        info!(
            "event=engine_open module=engine status=ok mode={mode} duration_ms={}",
            started_at.elapsed().as_millis()
        );

        Ok(Self::from_connection(conn))
    }

    fn read_rows(&self, statement: &mut Statement<'_>, args: &[Value]) -> EngineResult<Vec<Row>> {
        let column_names: Vec<String> = statement
            .column_names()
            .iter()
            .map(|name| (*name).to_string())
            .collect();

        let mut rows = statement.query(params_from_iter(args.iter()))?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (index, name) in column_names.iter().enumerate() {
                let value: Value = row.get(index)?;
                record.set(name.as_str(), value);
            }
            records.push(record);
        }

        Ok(records)
    }
}

impl Engine for SqliteEngine {
    fn raw_query(&self, query: &RawQuery) -> EngineResult<Vec<Row>> {
        if query.sql.trim().is_empty() {
            return Err(EngineError::InvalidQuery("raw query sql is empty".into()));
        }

        let mut statement = self.conn.prepare(&query.sql)?;
        self.read_rows(&mut statement, &query.args)
    }

    fn query(&self, query: &SelectQuery) -> EngineResult<Vec<Row>> {
        let sql = build_select_sql(query)?;
        debug!("event=engine_query module=engine table={}", query.table);

        let mut statement = self.conn.prepare(&sql)?;
        self.read_rows(&mut statement, &query.args)
    }

    fn insert(&self, query: &InsertQuery, row: &Row) -> EngineResult<i64> {
        require_table(&query.table, "insert")?;
        if row.is_empty() {
            return Err(EngineError::InvalidQuery(format!(
                "insert into `{}` with an empty row",
                query.table
            )));
        }

        let columns: Vec<&str> = row.columns().collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            query.table,
            columns.join(", "),
            placeholders
        );

        self.conn
            .execute(&sql, params_from_iter(row.iter().map(|(_, value)| value)))?;

        Ok(self.conn.last_insert_rowid())
    }

    fn update(&self, query: &UpdateQuery, row: &Row) -> EngineResult<usize> {
        require_table(&query.table, "update")?;
        if row.is_empty() {
            return Err(EngineError::InvalidQuery(format!(
                "update of `{}` with an empty row",
                query.table
            )));
        }

        let assignments = row
            .columns()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("UPDATE {} SET {assignments}", query.table);
        if let Some(clause) = &query.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
        sql.push(';');

        let changed = self.conn.execute(
            &sql,
            params_from_iter(
                row.iter()
                    .map(|(_, value)| value)
                    .chain(query.where_args.iter()),
            ),
        )?;

        Ok(changed)
    }

    fn delete(&self, query: &DeleteQuery) -> EngineResult<usize> {
        require_table(&query.table, "delete")?;

        let mut sql = format!("DELETE FROM {}", query.table);
        if let Some(clause) = &query.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
        sql.push(';');

        let changed = self
            .conn
            .execute(&sql, params_from_iter(query.where_args.iter()))?;

        Ok(changed)
    }

    fn transactions_supported(&self) -> bool {
        true
    }

    fn begin_transaction(&self) -> EngineResult<()> {
        if self.in_transaction.get() {
            return Err(EngineError::TransactionAlreadyActive);
        }

        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.in_transaction.set(true);
        self.transaction_successful.set(false);
        debug!("event=transaction_begin module=engine status=ok");
        Ok(())
    }

    fn set_transaction_successful(&self) -> EngineResult<()> {
        if !self.in_transaction.get() {
            return Err(EngineError::NoActiveTransaction);
        }

        self.transaction_successful.set(true);
        Ok(())
    }

    fn end_transaction(&self) -> EngineResult<()> {
        if !self.in_transaction.get() {
            return Err(EngineError::NoActiveTransaction);
        }

        let commit = self.transaction_successful.get();
        self.in_transaction.set(false);
        self.transaction_successful.set(false);

        if commit {
            self.conn.execute_batch("COMMIT;")?;
            debug!("event=transaction_end module=engine status=ok outcome=commit");
        } else {
            self.conn.execute_batch("ROLLBACK;")?;
            debug!("event=transaction_end module=engine status=ok outcome=rollback");
        }

        Ok(())
    }
}

fn bootstrap_connection(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

fn require_table(table: &str, operation: &str) -> EngineResult<()> {
    if table.trim().is_empty() {
        return Err(EngineError::InvalidQuery(format!(
            "{operation} target table is empty"
        )));
    }
    Ok(())
}

fn build_select_sql(query: &SelectQuery) -> EngineResult<String> {
    require_table(&query.table, "select")?;

    let mut sql = String::from("SELECT ");
    if query.distinct {
        sql.push_str("DISTINCT ");
    }

    match &query.columns {
        Some(columns) if !columns.is_empty() => sql.push_str(&columns.join(", ")),
        _ => sql.push('*'),
    }

    sql.push_str(" FROM ");
    sql.push_str(&query.table);

    if let Some(selection) = &query.selection {
        sql.push_str(" WHERE ");
        sql.push_str(selection);
    }
    if let Some(group_by) = &query.group_by {
        sql.push_str(" GROUP BY ");
        sql.push_str(group_by);
    }
    if let Some(having) = &query.having {
        sql.push_str(" HAVING ");
        sql.push_str(having);
    }
    if let Some(order_by) = &query.order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order_by);
    }
    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ");
        sql.push_str(&limit.to_string());
    }
    sql.push(';');

    Ok(sql)
}
