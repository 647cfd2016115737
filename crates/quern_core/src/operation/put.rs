//! Prepared put operations: single object and collection.
//!
//! # Responsibility
//! - Drive the map -> perform -> after -> notify pipeline for writes.
//! - Decide transaction wrapping for collections and emit exactly one
//!   notification per transaction, or one per item without one.
//!
//! # Invariants
//! - Mapper, resolver perform and after hook each run exactly once per
//!   object.
//! - A failure at any step aborts before notification; a transactional batch
//!   rolls back wholesale and returns no partial results.

use log::{debug, error};
use std::collections::HashSet;
use std::time::Instant;

use super::{
    ensure_affected_tables, AffectedTables, CollectionResult, Deferred, Mapper, OperationError,
    OperationResult, TransactionPolicy,
};
use crate::engine::Engine;
use crate::query::InsertQuery;
use crate::row::Row;
use crate::storage::Storage;

/// Per-object result mapping for a collection put.
pub type PutCollectionResult = CollectionResult<PutResult>;

/// Outcome of one put: an insert with a generated id, or an update with an
/// affected-row count. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum PutResult {
    Inserted {
        id: i64,
        affected_tables: HashSet<String>,
    },
    Updated {
        rows_updated: usize,
        affected_tables: HashSet<String>,
    },
}

impl PutResult {
    pub fn inserted(
        id: i64,
        affected_tables: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::Inserted {
            id,
            affected_tables: affected_tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn updated(
        rows_updated: usize,
        affected_tables: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::Updated {
            rows_updated,
            affected_tables: affected_tables.into_iter().map(Into::into).collect(),
        }
    }

    /// Generated row id when this put inserted.
    pub fn inserted_id(&self) -> Option<i64> {
        match self {
            Self::Inserted { id, .. } => Some(*id),
            Self::Updated { .. } => None,
        }
    }

    /// Affected-row count when this put updated.
    pub fn rows_updated(&self) -> Option<usize> {
        match self {
            Self::Inserted { .. } => None,
            Self::Updated { rows_updated, .. } => Some(*rows_updated),
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, Self::Inserted { .. })
    }
}

impl AffectedTables for PutResult {
    fn affected_tables(&self) -> &HashSet<String> {
        match self {
            Self::Inserted {
                affected_tables, ..
            }
            | Self::Updated {
                affected_tables, ..
            } => affected_tables,
        }
    }
}

/// Strategy for persisting one entity type.
///
/// `perform_put` decides how the mapped row reaches the engine (plain insert,
/// insert-or-update, multi-table write). `after_put` runs exactly once after
/// a successful perform, before notification; typical use is writing the
/// generated id back onto the object.
pub trait PutResolver<T> {
    fn perform_put(&self, engine: &dyn Engine, row: Row) -> OperationResult<PutResult>;

    fn after_put(&self, object: &mut T, result: &PutResult) -> OperationResult<()> {
        let _ = (object, result);
        Ok(())
    }
}

/// Stock resolver: plain insert into one fixed table, no after-hook work.
pub struct InsertResolver {
    query: InsertQuery,
}

impl InsertResolver {
    pub fn into_table(table: impl Into<String>) -> Self {
        Self {
            query: InsertQuery::table(table),
        }
    }
}

impl<T> PutResolver<T> for InsertResolver {
    fn perform_put(&self, engine: &dyn Engine, row: Row) -> OperationResult<PutResult> {
        let id = engine.insert(&self.query, &row)?;
        Ok(PutResult::inserted(id, [self.query.table.as_str()]))
    }
}

/// Entry point returned by [`Storage::put`].
pub struct PutRequest<'a> {
    pub(crate) storage: &'a Storage,
}

impl<'a> PutRequest<'a> {
    /// Puts a single object.
    pub fn object<T>(self, object: &'a mut T) -> PutObjectBuilder<'a, T> {
        PutObjectBuilder {
            storage: self.storage,
            object,
            mapper: None,
            resolver: None,
        }
    }

    /// Puts an ordered collection of objects sharing one mapper and resolver.
    pub fn objects<T>(self, objects: &'a mut [T]) -> PutCollectionBuilder<'a, T> {
        PutCollectionBuilder {
            storage: self.storage,
            objects,
            mapper: None,
            resolver: None,
            policy: TransactionPolicy::default(),
        }
    }
}

pub struct PutObjectBuilder<'a, T> {
    storage: &'a Storage,
    object: &'a mut T,
    mapper: Option<Box<dyn Mapper<T, Row> + 'a>>,
    resolver: Option<&'a dyn PutResolver<T>>,
}

impl<'a, T> PutObjectBuilder<'a, T> {
    pub fn with_mapper(mut self, mapper: impl Mapper<T, Row> + 'a) -> Self {
        self.mapper = Some(Box::new(mapper));
        self
    }

    pub fn with_resolver(mut self, resolver: &'a dyn PutResolver<T>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// # Errors
    /// Returns [`OperationError::Configuration`] when the mapper or resolver
    /// is unset.
    pub fn prepare(self) -> OperationResult<PreparedPutObject<'a, T>> {
        let mapper = self.mapper.ok_or_else(|| {
            OperationError::Configuration("put prepared without a row mapper".to_string())
        })?;
        let resolver = self.resolver.ok_or_else(|| {
            OperationError::Configuration("put prepared without a put resolver".to_string())
        })?;

        Ok(PreparedPutObject {
            storage: self.storage,
            object: self.object,
            mapper,
            resolver,
        })
    }
}

/// A single-object put, ready to run.
pub struct PreparedPutObject<'a, T> {
    storage: &'a Storage,
    object: &'a mut T,
    mapper: Box<dyn Mapper<T, Row> + 'a>,
    resolver: &'a dyn PutResolver<T>,
}

impl<'a, T> PreparedPutObject<'a, T> {
    /// Runs the put on the calling thread.
    pub fn execute(self) -> OperationResult<PutResult> {
        let started_at = Instant::now();
        let Self {
            storage,
            object,
            mapper,
            resolver,
        } = self;

        let result = put_item(storage.engine(), object, mapper.as_ref(), resolver);
        match &result {
            Ok(put_result) => {
                storage.notify_changed(put_result.affected_tables());
                debug!(
                    "event=put_one module=operation status=ok kind={} duration_ms={}",
                    if put_result.was_inserted() { "insert" } else { "update" },
                    started_at.elapsed().as_millis()
                );
            }
            Err(err) => {
                error!(
                    "event=put_one module=operation status=error duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
            }
        }
        result
    }

    /// Returns the cold form of this put; nothing runs until
    /// [`Deferred::run`].
    pub fn defer(self) -> Deferred<'a, OperationResult<PutResult>> {
        Deferred::new(move || self.execute())
    }
}

pub struct PutCollectionBuilder<'a, T> {
    storage: &'a Storage,
    objects: &'a mut [T],
    mapper: Option<Box<dyn Mapper<T, Row> + 'a>>,
    resolver: Option<&'a dyn PutResolver<T>>,
    policy: TransactionPolicy,
}

impl<'a, T> PutCollectionBuilder<'a, T> {
    pub fn with_mapper(mut self, mapper: impl Mapper<T, Row> + 'a) -> Self {
        self.mapper = Some(Box::new(mapper));
        self
    }

    pub fn with_resolver(mut self, resolver: &'a dyn PutResolver<T>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Wraps the batch in one transaction when the engine supports it. This
    /// is the default policy.
    pub fn use_transaction_if_supported(mut self) -> Self {
        self.policy = TransactionPolicy::UseIfSupported;
        self
    }

    /// Executes items independently with per-item notifications.
    ///
    /// See [`TransactionPolicy::Never`] for the weaker guarantees this mode
    /// accepts.
    pub fn without_transaction(mut self) -> Self {
        self.policy = TransactionPolicy::Never;
        self
    }

    /// # Errors
    /// Returns [`OperationError::Configuration`] when the mapper or resolver
    /// is unset.
    pub fn prepare(self) -> OperationResult<PreparedPutCollection<'a, T>> {
        let mapper = self.mapper.ok_or_else(|| {
            OperationError::Configuration("put prepared without a row mapper".to_string())
        })?;
        let resolver = self.resolver.ok_or_else(|| {
            OperationError::Configuration("put prepared without a put resolver".to_string())
        })?;

        Ok(PreparedPutCollection {
            storage: self.storage,
            objects: self.objects,
            mapper,
            resolver,
            policy: self.policy,
        })
    }
}

/// A collection put, ready to run.
pub struct PreparedPutCollection<'a, T> {
    storage: &'a Storage,
    objects: &'a mut [T],
    mapper: Box<dyn Mapper<T, Row> + 'a>,
    resolver: &'a dyn PutResolver<T>,
    policy: TransactionPolicy,
}

impl<'a, T> PreparedPutCollection<'a, T> {
    /// Runs the batch on the calling thread.
    pub fn execute(self) -> OperationResult<PutCollectionResult> {
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
            put_all_transactional(storage, objects, mapper.as_ref(), resolver)
        } else {
            put_each(storage, objects, mapper.as_ref(), resolver)
        };

        match &result {
            Ok(collection) => debug!(
                "event=put_many module=operation status=ok objects={total} failed={} transactional={transactional} duration_ms={}",
                collection.num_failed(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=put_many module=operation status=error objects={total} transactional={transactional} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    /// Returns the cold form of this batch; nothing runs until
    /// [`Deferred::run`].
    pub fn defer(self) -> Deferred<'a, OperationResult<PutCollectionResult>> {
        Deferred::new(move || self.execute())
    }
}

/// Map -> perform -> after for one object, without notification.
fn put_item<T>(
    engine: &dyn Engine,
    object: &mut T,
    mapper: &dyn Mapper<T, Row>,
    resolver: &dyn PutResolver<T>,
) -> OperationResult<PutResult> {
    let row = mapper.map(object)?;
    let result = resolver.perform_put(engine, row)?;
    ensure_affected_tables(result.affected_tables())?;
    resolver.after_put(object, &result)?;
    Ok(result)
}

fn put_all_transactional<T>(
    storage: &Storage,
    objects: &mut [T],
    mapper: &dyn Mapper<T, Row>,
    resolver: &dyn PutResolver<T>,
) -> OperationResult<PutCollectionResult> {
    if objects.is_empty() {
        return Ok(CollectionResult::from_entries(Vec::new()));
    }

    let engine = storage.engine();
    engine.begin_transaction()?;

    let mut entries = Vec::with_capacity(objects.len());
    let mut affected = HashSet::new();

    for object in objects.iter_mut() {
        match put_item(engine, object, mapper, resolver) {
            Ok(result) => {
                affected.extend(result.affected_tables().iter().cloned());
                entries.push(Ok(result));
            }
            Err(err) => {
                // Not marked successful, so ending the transaction rolls back
                // everything written so far. No notification leaves this path.
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

fn put_each<T>(
    storage: &Storage,
    objects: &mut [T],
    mapper: &dyn Mapper<T, Row>,
    resolver: &dyn PutResolver<T>,
) -> OperationResult<PutCollectionResult> {
    let mut entries = Vec::with_capacity(objects.len());

    for object in objects.iter_mut() {
        match put_item(storage.engine(), object, mapper, resolver) {
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
