//! Shared fixtures for quern_core integration tests.

#![allow(dead_code)]

use quern_core::{
    DeleteQuery, DeleteResolver, DeleteResult, Engine, EngineResult, InsertQuery, MapperResult,
    OperationError, OperationResult, PutResolver, PutResult, RawQuery, ResolverError, Row,
    SelectQuery, SqliteEngine, Storage, UpdateQuery, Value,
};
use rusqlite::Connection;
use std::cell::Cell;
use std::collections::HashSet;

#[derive(Debug)]
pub struct User {
    pub id: Option<i64>,
    pub email: String,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: None,
            email: email.into(),
        }
    }
}

pub fn users_engine() -> SqliteEngine {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE
        );",
    )
    .unwrap();
    SqliteEngine::from_connection(conn)
}

pub fn users_storage() -> Storage {
    Storage::new(users_engine())
}

pub fn user_row(user: &User) -> MapperResult<Row> {
    Ok(Row::new().with("email", user.email.clone()))
}

pub fn user_delete_query(user: &User) -> MapperResult<DeleteQuery> {
    Ok(DeleteQuery::table("users")
        .where_clause("email = ?")
        .bind(user.email.clone()))
}

pub fn tables(names: &[&str]) -> HashSet<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

pub fn count_users(storage: &Storage) -> i64 {
    let rows = storage
        .engine()
        .raw_query(&RawQuery::new("SELECT COUNT(*) AS n FROM users"))
        .unwrap();
    match rows[0].get("n") {
        Some(Value::Integer(count)) => *count,
        other => panic!("unexpected count value: {other:?}"),
    }
}

/// Put resolver over the `users` table that counts hook invocations and can
/// fail a chosen perform call.
pub struct CountingPutResolver {
    table: String,
    pub performs: Cell<usize>,
    pub afters: Cell<usize>,
    pub fail_perform_at: Option<usize>,
}

impl CountingPutResolver {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            performs: Cell::new(0),
            afters: Cell::new(0),
            fail_perform_at: None,
        }
    }

    pub fn failing_at(table: &str, call_index: usize) -> Self {
        Self {
            fail_perform_at: Some(call_index),
            ..Self::new(table)
        }
    }
}

impl PutResolver<User> for CountingPutResolver {
    fn perform_put(&self, engine: &dyn Engine, row: Row) -> OperationResult<PutResult> {
        let call = self.performs.get();
        self.performs.set(call + 1);

        if self.fail_perform_at == Some(call) {
            return Err(OperationError::Resolver(ResolverError::new(
                "injected perform failure",
            )));
        }

        let id = engine.insert(&InsertQuery::table(self.table.as_str()), &row)?;
        Ok(PutResult::inserted(id, [self.table.as_str()]))
    }

    fn after_put(&self, object: &mut User, result: &PutResult) -> OperationResult<()> {
        self.afters.set(self.afters.get() + 1);
        object.id = result.inserted_id();
        Ok(())
    }
}

/// Delete resolver that counts perform calls and can fail a chosen one.
pub struct CountingDeleteResolver {
    pub performs: Cell<usize>,
    pub fail_perform_at: Option<usize>,
}

impl CountingDeleteResolver {
    pub fn new() -> Self {
        Self {
            performs: Cell::new(0),
            fail_perform_at: None,
        }
    }

    pub fn failing_at(call_index: usize) -> Self {
        Self {
            performs: Cell::new(0),
            fail_perform_at: Some(call_index),
        }
    }
}

impl DeleteResolver for CountingDeleteResolver {
    fn perform_delete(
        &self,
        engine: &dyn Engine,
        query: &DeleteQuery,
    ) -> OperationResult<DeleteResult> {
        let call = self.performs.get();
        self.performs.set(call + 1);

        if self.fail_perform_at == Some(call) {
            return Err(OperationError::Resolver(ResolverError::new(
                "injected perform failure",
            )));
        }

        let rows_deleted = engine.delete(query)?;
        Ok(DeleteResult::new(rows_deleted, [query.table.as_str()]))
    }
}

/// Engine wrapper that reports no transaction support; everything else
/// delegates to the inner SQLite engine.
pub struct NoTransactionEngine {
    inner: SqliteEngine,
}

impl NoTransactionEngine {
    pub fn new(inner: SqliteEngine) -> Self {
        Self { inner }
    }
}

impl Engine for NoTransactionEngine {
    fn raw_query(&self, query: &RawQuery) -> EngineResult<Vec<Row>> {
        self.inner.raw_query(query)
    }

    fn query(&self, query: &SelectQuery) -> EngineResult<Vec<Row>> {
        self.inner.query(query)
    }

    fn insert(&self, query: &InsertQuery, row: &Row) -> EngineResult<i64> {
        self.inner.insert(query, row)
    }

    fn update(&self, query: &UpdateQuery, row: &Row) -> EngineResult<usize> {
        self.inner.update(query, row)
    }

    fn delete(&self, query: &DeleteQuery) -> EngineResult<usize> {
        self.inner.delete(query)
    }

    fn transactions_supported(&self) -> bool {
        false
    }

    fn begin_transaction(&self) -> EngineResult<()> {
        self.inner.begin_transaction()
    }

    fn set_transaction_successful(&self) -> EngineResult<()> {
        self.inner.set_transaction_successful()
    }

    fn end_transaction(&self) -> EngineResult<()> {
        self.inner.end_transaction()
    }
}
