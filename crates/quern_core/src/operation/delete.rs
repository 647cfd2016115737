//! Prepared delete operations: single object, collection, or direct query.
//!
//! # Responsibility
//! - Drive the map -> perform -> notify pipeline for deletes.
//! - Apply the put-batch transaction and notification semantics to delete
//!   collections.
//!
//! # Invariants
//! - Zero deleted rows is a success, not an error; the table notification
//!   still fires.
//! - A failure aborts before notification; a transactional batch rolls back
//!   wholesale.

use log::{debug, error};
use std::collections::HashSet;
use std::time::Instant;

use super::{
    ensure_affected_tables, AffectedTables, CollectionResult, Deferred, Mapper, OperationError,
    OperationResult, TransactionPolicy,
};
use crate::engine::Engine;
use crate::query::DeleteQuery;
use crate::storage::Storage;

static DEFAULT_DELETE_RESOLVER: DefaultDeleteResolver = DefaultDeleteResolver;

/// Per-object result mapping for a collection delete.
pub type DeleteCollectionResult = CollectionResult<DeleteResult>;

/// Outcome of one delete: affected-row count plus touched tables, no id.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResult {
    rows_deleted: usize,
    affected_tables: HashSet<String>,
}

impl DeleteResult {
    pub fn new(
        rows_deleted: usize,
        affected_tables: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            rows_deleted,
            affected_tables: affected_tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn rows_deleted(&self) -> usize {
        self.rows_deleted
    }
}

impl AffectedTables for DeleteResult {
    fn affected_tables(&self) -> &HashSet<String> {
        &self.affected_tables
    }
}

/// Strategy deciding how a delete query reaches the engine.
pub trait DeleteResolver {
    fn perform_delete(
        &self,
        engine: &dyn Engine,
        query: &DeleteQuery,
    ) -> OperationResult<DeleteResult>;
}

/// Stock resolver: engine delete, affected tables = the query's table.
pub struct DefaultDeleteResolver;

impl DeleteResolver for DefaultDeleteResolver {
    fn perform_delete(
        &self,
        engine: &dyn Engine,
        query: &DeleteQuery,
    ) -> OperationResult<DeleteResult> {
        let rows_deleted = engine.delete(query)?;
        Ok(DeleteResult::new(rows_deleted, [query.table.as_str()]))
    }
}

/// Entry point returned by [`Storage::delete`].
pub struct DeleteRequest<'a> {
    pub(crate) storage: &'a Storage,
}

impl<'a> DeleteRequest<'a> {
    /// Deletes the rows belonging to a single object.
    pub fn object<T>(self, object: &'a T) -> DeleteObjectBuilder<'a, T> {
        DeleteObjectBuilder {
            storage: self.storage,
            object,
            mapper: None,
            resolver: None,
        }
    }

    /// Deletes the rows belonging to an ordered collection of objects.
    pub fn objects<T>(self, objects: &'a [T]) -> DeleteCollectionBuilder<'a, T> {
        DeleteCollectionBuilder {
            storage: self.storage,
            objects,
            mapper: None,
            resolver: None,
            policy: TransactionPolicy::default(),
        }
    }

    /// Deletes whatever the query matches, without a domain object.
    pub fn by_query(self, query: DeleteQuery) -> DeleteQueryBuilder<'a> {
        DeleteQueryBuilder {
            storage: self.storage,
            query,
            resolver: None,
        }
    }
}

pub struct DeleteObjectBuilder<'a, T> {
    storage: &'a Storage,
    object: &'a T,
    mapper: Option<Box<dyn Mapper<T, DeleteQuery> + 'a>>,
    resolver: Option<&'a dyn DeleteResolver>,
}

impl<'a, T> DeleteObjectBuilder<'a, T> {
    pub fn with_mapper(mut self, mapper: impl Mapper<T, DeleteQuery> + 'a) -> Self {
        self.mapper = Some(Box::new(mapper));
        self
    }

    pub fn with_resolver(mut self, resolver: &'a dyn DeleteResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// # Errors
    /// Returns [`OperationError::Configuration`] when the mapper is unset.
    /// The resolver defaults to [`DefaultDeleteResolver`].
    pub fn prepare(self) -> OperationResult<PreparedDeleteObject<'a, T>> {
        let mapper = self.mapper.ok_or_else(|| {
            OperationError::Configuration("delete prepared without a query mapper".to_string())
        })?;

        Ok(PreparedDeleteObject {
            storage: self.storage,
            object: self.object,
            mapper,
            resolver: self.resolver.unwrap_or(&DEFAULT_DELETE_RESOLVER),
        })
    }
}

/// A single-object delete, ready to run.
pub struct PreparedDeleteObject<'a, T> {
    storage: &'a Storage,
    object: &'a T,
    mapper: Box<dyn Mapper<T, DeleteQuery> + 'a>,
    resolver: &'a dyn DeleteResolver,
}

impl<'a, T> PreparedDeleteObject<'a, T> {
    /// Runs the delete on the calling thread.
    pub fn execute(self) -> OperationResult<DeleteResult> {
        let started_at = Instant::now();
        let result = delete_item(
            self.storage.engine(),
            self.object,
            self.mapper.as_ref(),
            self.resolver,
        );

        match &result {
            Ok(delete_result) => {
                self.storage.notify_changed(delete_result.affected_tables());
                debug!(
                    "event=delete_one module=operation status=ok rows={} duration_ms={}",
                    delete_result.rows_deleted(),
                    started_at.elapsed().as_millis()
                );
            }
            Err(err) => {
                error!(
                    "event=delete_one module=operation status=error duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
            }
        }
        result
    }

    /// Returns the cold form of this delete; nothing runs until
    /// [`Deferred::run`].
    pub fn defer(self) -> Deferred<'a, OperationResult<DeleteResult>> {
        Deferred::new(move || self.execute())
    }
}

pub struct DeleteCollectionBuilder<'a, T> {
    storage: &'a Storage,
    objects: &'a [T],
    mapper: Option<Box<dyn Mapper<T, DeleteQuery> + 'a>>,
    resolver: Option<&'a dyn DeleteResolver>,
    policy: TransactionPolicy,
}

impl<'a, T> DeleteCollectionBuilder<'a, T> {
    pub fn with_mapper(mut self, mapper: impl Mapper<T, DeleteQuery> + 'a) -> Self {
        self.mapper = Some(Box::new(mapper));
        self
    }

    pub fn with_resolver(mut self, resolver: &'a dyn DeleteResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Wraps the batch in one transaction when the engine supports it. This
    /// is the default policy.
    pub fn use_transaction_if_supported(mut self) -> Self {
        self.policy = TransactionPolicy::UseIfSupported;
        self
    }

    /// Executes items independently with per-item notifications; see
    /// [`TransactionPolicy::Never`].
    pub fn without_transaction(mut self) -> Self {
        self.policy = TransactionPolicy::Never;
        self
    }

    /// # Errors
    /// Returns [`OperationError::Configuration`] when the mapper is unset.
    pub fn prepare(self) -> OperationResult<PreparedDeleteCollection<'a, T>> {
        let mapper = self.mapper.ok_or_else(|| {
            OperationError::Configuration("delete prepared without a query mapper".to_string())
        })?;

        Ok(PreparedDeleteCollection {
            storage: self.storage,
            objects: self.objects,
            mapper,
            resolver: self.resolver.unwrap_or(&DEFAULT_DELETE_RESOLVER),
            policy: self.policy,
        })
    }
}

/// A collection delete, ready to run.
pub struct PreparedDeleteCollection<'a, T> {
    storage: &'a Storage,
    objects: &'a [T],
    mapper: Box<dyn Mapper<T, DeleteQuery> + 'a>,
    resolver: &'a dyn DeleteResolver,
    policy: TransactionPolicy,
}

impl<'a, T> PreparedDeleteCollection<'a, T> {
    /// Runs the batch on the calling thread.
    pub fn execute(self) -> OperationResult<DeleteCollectionResult> {
        let started_at = Instant::now();
        let Self {
            storage,
            objects,
            mapper,
            resolver,
            policy,
        } = self;

        let transactional = policy == TransactionPolicy::UseIfSupported
            && storage.engine().transactions_supported();
        let total = objects.len();

        let result = if transactional {
            delete_all_transactional(storage, objects, mapper.as_ref(), resolver)
        } else {
            delete_each(storage, objects, mapper.as_ref(), resolver)
        };

        match &result {
            Ok(collection) => debug!(
                "event=delete_many module=operation status=ok objects={total} failed={} transactional={transactional} duration_ms={}",
                collection.num_failed(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=delete_many module=operation status=error objects={total} transactional={transactional} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    /// Returns the cold form of this batch; nothing runs until
    /// [`Deferred::run`].
    pub fn defer(self) -> Deferred<'a, OperationResult<DeleteCollectionResult>> {
        Deferred::new(move || self.execute())
    }
}

pub struct DeleteQueryBuilder<'a> {
    storage: &'a Storage,
    query: DeleteQuery,
    resolver: Option<&'a dyn DeleteResolver>,
}

impl<'a> DeleteQueryBuilder<'a> {
    pub fn with_resolver(mut self, resolver: &'a dyn DeleteResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn prepare(self) -> PreparedDeleteByQuery<'a> {
        PreparedDeleteByQuery {
            storage: self.storage,
            query: self.query,
            resolver: self.resolver.unwrap_or(&DEFAULT_DELETE_RESOLVER),
        }
    }
}

/// A delete-by-query, ready to run.
pub struct PreparedDeleteByQuery<'a> {
    storage: &'a Storage,
    query: DeleteQuery,
    resolver: &'a dyn DeleteResolver,
}

impl<'a> PreparedDeleteByQuery<'a> {
    /// Runs the delete on the calling thread.
    pub fn execute(self) -> OperationResult<DeleteResult> {
        let started_at = Instant::now();

        let result = self
            .resolver
            .perform_delete(self.storage.engine(), &self.query)
            .and_then(|delete_result| {
                ensure_affected_tables(delete_result.affected_tables())?;
                Ok(delete_result)
            });

        match &result {
            Ok(delete_result) => {
                self.storage.notify_changed(delete_result.affected_tables());
                debug!(
                    "event=delete_by_query module=operation status=ok table={} rows={} duration_ms={}",
                    self.query.table,
                    delete_result.rows_deleted(),
                    started_at.elapsed().as_millis()
                );
            }
            Err(err) => {
                error!(
                    "event=delete_by_query module=operation status=error table={} duration_ms={} error={err}",
                    self.query.table,
                    started_at.elapsed().as_millis()
                );
            }
        }
        result
    }

    /// Returns the cold form of this delete; nothing runs until
    /// [`Deferred::run`].
    pub fn defer(self) -> Deferred<'a, OperationResult<DeleteResult>> {
        Deferred::new(move || self.execute())
    }
}

/// Map -> perform for one object, without notification.
fn delete_item<T>(
    engine: &dyn Engine,
    object: &T,
    mapper: &dyn Mapper<T, DeleteQuery>,
    resolver: &dyn DeleteResolver,
) -> OperationResult<DeleteResult> {
    let query = mapper.map(object)?;
    let result = resolver.perform_delete(engine, &query)?;
    ensure_affected_tables(result.affected_tables())?;
    Ok(result)
}

fn delete_all_transactional<T>(
    storage: &Storage,
    objects: &[T],
    mapper: &dyn Mapper<T, DeleteQuery>,
    resolver: &dyn DeleteResolver,
) -> OperationResult<DeleteCollectionResult> {
    if objects.is_empty() {
        return Ok(CollectionResult::from_entries(Vec::new()));
    }

    let engine = storage.engine();
    engine.begin_transaction()?;

    let mut entries = Vec::with_capacity(objects.len());
    let mut affected = HashSet::new();

    for object in objects {
        match delete_item(engine, object, mapper, resolver) {
            Ok(result) => {
                affected.extend(result.affected_tables().iter().cloned());
                entries.push(Ok(result));
            }
            Err(err) => {
                // Not marked successful, so ending the transaction rolls back
                // everything deleted so far. No notification leaves this path.
                if let Err(end_err) = engine.end_transaction() {
                    error!(
                        "event=transaction_rollback module=operation status=error error={end_err}"
                    );
                }
                return Err(err);
            }
        }
    }

    engine.set_transaction_successful()?;
    engine.end_transaction()?;
    storage.notify_changed(&affected);

    Ok(CollectionResult::from_entries(entries))
}

fn delete_each<T>(
    storage: &Storage,
    objects: &[T],
    mapper: &dyn Mapper<T, DeleteQuery>,
    resolver: &dyn DeleteResolver,
) -> OperationResult<DeleteCollectionResult> {
    let mut entries = Vec::with_capacity(objects.len());

    for object in objects {
        match delete_item(storage.engine(), object, mapper, resolver) {
            Ok(result) => {
                storage.notify_changed(result.affected_tables());
                entries.push(Ok(result));
            }
            // Item-scoped failure: earlier items stay committed and notified,
            // later items still run.
            Err(err) => entries.push(Err(err)),
        }
    }

    Ok(CollectionResult::from_entries(entries))
}
