//! Prepared get operations: raw rows or typed objects.
//!
//! # Responsibility
//! - Resolve a structured or raw query into result rows via a get resolver.
//! - Optionally map each row back to a typed object.
//!
//! # Invariants
//! - Gets never open transactions and never publish notifications.
//! - A returned row sequence is finite and consumed once; re-reading
//!   requires a new prepared get.

use log::{debug, error};
use std::time::Instant;

use super::{Deferred, Mapper, OperationResult};
use crate::engine::Engine;
use crate::query::{RawQuery, SelectQuery};
use crate::row::Row;
use crate::storage::Storage;

static DEFAULT_GET_RESOLVER: DefaultGetResolver = DefaultGetResolver;

/// Where the rows come from: a structured single-table read or raw SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySource {
    Select(SelectQuery),
    Raw(RawQuery),
}

/// Strategy deciding how a query turns into rows.
pub trait GetResolver {
    fn perform_get(&self, engine: &dyn Engine, source: &QuerySource) -> OperationResult<Vec<Row>>;
}

/// Stock resolver: hand the query to the engine unchanged.
pub struct DefaultGetResolver;

impl GetResolver for DefaultGetResolver {
    fn perform_get(&self, engine: &dyn Engine, source: &QuerySource) -> OperationResult<Vec<Row>> {
        let rows = match source {
            QuerySource::Select(query) => engine.query(query)?,
            QuerySource::Raw(query) => engine.raw_query(query)?,
        };
        Ok(rows)
    }
}

/// Finite sequence of result rows, consumed once.
///
/// Not restartable: once iterated, the data is gone; run the query again via
/// a new prepared get to observe fresh state.
pub struct RowIter {
    inner: std::vec::IntoIter<Row>,
}

impl RowIter {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

impl Iterator for RowIter {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.inner.next()
    }
}

/// Entry point returned by [`Storage::get`].
pub struct GetRequest<'a> {
    pub(crate) storage: &'a Storage,
}

impl<'a> GetRequest<'a> {
    /// Reads rows with a structured single-table query.
    pub fn query(self, query: SelectQuery) -> GetBuilder<'a> {
        GetBuilder {
            storage: self.storage,
            source: QuerySource::Select(query),
            resolver: None,
        }
    }

    /// Reads rows with free-form SQL.
    pub fn raw(self, query: RawQuery) -> GetBuilder<'a> {
        GetBuilder {
            storage: self.storage,
            source: QuerySource::Raw(query),
            resolver: None,
        }
    }
}

pub struct GetBuilder<'a> {
    storage: &'a Storage,
    source: QuerySource,
    resolver: Option<&'a dyn GetResolver>,
}

impl<'a> GetBuilder<'a> {
    pub fn with_resolver(mut self, resolver: &'a dyn GetResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Maps each result row to a typed object.
    pub fn map_rows<T>(self, mapper: impl Mapper<Row, T> + 'a) -> TypedGetBuilder<'a, T> {
        TypedGetBuilder {
            storage: self.storage,
            source: self.source,
            resolver: self.resolver,
            mapper: Box::new(mapper),
        }
    }

    /// Finalizes a raw-rows get. The default resolver hands the query to the
    /// engine unchanged.
    pub fn prepare(self) -> PreparedGetRows<'a> {
        PreparedGetRows {
            storage: self.storage,
            source: self.source,
            resolver: self.resolver.unwrap_or(&DEFAULT_GET_RESOLVER),
        }
    }
}

/// A rows get, ready to run.
pub struct PreparedGetRows<'a> {
    storage: &'a Storage,
    source: QuerySource,
    resolver: &'a dyn GetResolver,
}

impl<'a> PreparedGetRows<'a> {
    /// Runs the query on the calling thread.
    pub fn execute(self) -> OperationResult<RowIter> {
        let rows = perform_get(self.storage, &self.source, self.resolver)?;
        Ok(RowIter {
            inner: rows.into_iter(),
        })
    }

    /// Returns the cold form of this get; nothing runs until
    /// [`Deferred::run`].
    pub fn defer(self) -> Deferred<'a, OperationResult<RowIter>> {
        Deferred::new(move || self.execute())
    }
}

pub struct TypedGetBuilder<'a, T> {
    storage: &'a Storage,
    source: QuerySource,
    resolver: Option<&'a dyn GetResolver>,
    mapper: Box<dyn Mapper<Row, T> + 'a>,
}

impl<'a, T> TypedGetBuilder<'a, T> {
    pub fn with_resolver(mut self, resolver: &'a dyn GetResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn prepare(self) -> PreparedGetTyped<'a, T> {
        PreparedGetTyped {
            storage: self.storage,
            source: self.source,
            resolver: self.resolver.unwrap_or(&DEFAULT_GET_RESOLVER),
            mapper: self.mapper,
        }
    }
}

/// A typed get, ready to run.
pub struct PreparedGetTyped<'a, T> {
    storage: &'a Storage,
    source: QuerySource,
    resolver: &'a dyn GetResolver,
    mapper: Box<dyn Mapper<Row, T> + 'a>,
}

impl<'a, T: 'a> PreparedGetTyped<'a, T> {
    /// Runs the query and maps every row on the calling thread.
    pub fn execute(self) -> OperationResult<Vec<T>> {
        let rows = perform_get(self.storage, &self.source, self.resolver)?;

        let mut objects = Vec::with_capacity(rows.len());
        for row in &rows {
            objects.push(self.mapper.map(row)?);
        }
        Ok(objects)
    }

    /// Returns the cold form of this get; nothing runs until
    /// [`Deferred::run`].
    pub fn defer(self) -> Deferred<'a, OperationResult<Vec<T>>> {
        Deferred::new(move || self.execute())
    }
}

fn perform_get(
    storage: &Storage,
    source: &QuerySource,
    resolver: &dyn GetResolver,
) -> OperationResult<Vec<Row>> {
    let started_at = Instant::now();

    match resolver.perform_get(storage.engine(), source) {
        Ok(rows) => {
            debug!(
                "event=get module=operation status=ok rows={} duration_ms={}",
                rows.len(),
                started_at.elapsed().as_millis()
            );
            Ok(rows)
        }
        Err(err) => {
            error!(
                "event=get module=operation status=error duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            Err(err)
        }
    }
}
