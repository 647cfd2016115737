//! Contracts shared by the prepared put/get/delete operations.
//!
//! # Responsibility
//! - Define the mapper and error seams between callers and orchestrators.
//! - Provide the transaction policy, deferred execution form and
//!   collection-result shape used by batch operations.
//!
//! # Invariants
//! - A successful write never reports an empty affected-tables set; the
//!   orchestrators reject one before hooks or notifications run.
//! - Failures propagate to the caller unchanged; nothing here retries.

use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::engine::EngineError;

pub mod delete;
pub mod get;
pub mod put;

pub type OperationResult<T> = Result<T, OperationError>;
pub type MapperResult<T> = Result<T, MapperError>;

/// The object could not be converted to its storage representation.
#[derive(Debug)]
pub struct MapperError {
    message: String,
}

impl MapperError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for MapperError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "mapper failure: {}", self.message)
    }
}

impl Error for MapperError {}

/// A resolver's perform/after hook failed on its own terms.
#[derive(Debug)]
pub struct ResolverError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ResolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl Display for ResolverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "resolver failure: {}", self.message)
    }
}

impl Error for ResolverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn Error + 'static))
    }
}

/// Failure of one prepared operation.
#[derive(Debug)]
pub enum OperationError {
    /// Object could not be converted to a row or query.
    Mapper(MapperError),
    /// The storage engine rejected the request.
    Engine(EngineError),
    /// A resolver hook failed.
    Resolver(ResolverError),
    /// The operation was prepared without a required mapper or resolver.
    Configuration(String),
}

impl Display for OperationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mapper(err) => write!(f, "{err}"),
            Self::Engine(err) => write!(f, "engine failure: {err}"),
            Self::Resolver(err) => write!(f, "{err}"),
            Self::Configuration(message) => write!(f, "configuration error: {message}"),
        }
    }
}

impl Error for OperationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Mapper(err) => Some(err),
            Self::Engine(err) => Some(err),
            Self::Resolver(err) => Some(err),
            Self::Configuration(_) => None,
        }
    }
}

impl From<MapperError> for OperationError {
    fn from(value: MapperError) -> Self {
        Self::Mapper(value)
    }
}

impl From<EngineError> for OperationError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<ResolverError> for OperationError {
    fn from(value: ResolverError) -> Self {
        Self::Resolver(value)
    }
}

/// Pure conversion from a source value to its storage-side representation.
///
/// One seam covers all directions: domain object to [`crate::Row`] for puts,
/// domain object to [`crate::DeleteQuery`] for deletes, and [`crate::Row`]
/// back to a typed object for gets. Implemented for free by any
/// `Fn(&T) -> MapperResult<R>` closure.
pub trait Mapper<T, R> {
    fn map(&self, source: &T) -> MapperResult<R>;
}

impl<T, R, F> Mapper<T, R> for F
where
    F: Fn(&T) -> MapperResult<R>,
{
    fn map(&self, source: &T) -> MapperResult<R> {
        self(source)
    }
}

/// How a batch operation relates to engine transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionPolicy {
    /// Wrap the whole batch in one transaction when the engine supports
    /// transactions; single union notification on success.
    #[default]
    UseIfSupported,
    /// Execute items independently with per-item notifications.
    ///
    /// Explicit weaker-guarantee mode: a failed item does not roll back or
    /// stop its siblings; earlier items stay committed and already notified.
    Never,
}

/// A cold, not-yet-started operation.
///
/// Holds the same computation the blocking form runs; nothing happens until
/// [`Deferred::run`]. Dropping a deferred without running it performs no work
/// and sends no notification; running it after the underlying write already
/// happened is impossible since `run` consumes the value.
pub struct Deferred<'a, T> {
    thunk: Box<dyn FnOnce() -> T + 'a>,
}

impl<'a, T> Deferred<'a, T> {
    pub fn new(thunk: impl FnOnce() -> T + 'a) -> Self {
        Self {
            thunk: Box::new(thunk),
        }
    }

    /// Executes the deferred operation on the calling thread.
    pub fn run(self) -> T {
        (self.thunk)()
    }
}

/// Result type that carries an affected-tables set.
pub trait AffectedTables {
    fn affected_tables(&self) -> &HashSet<String>;
}

/// Per-object results of a batch operation.
///
/// Exactly one entry per input object, keyed by input position: `entry(i)`
/// belongs to the i-th object passed to the builder. In non-transactional
/// batches individual entries may be errors while their siblings succeeded.
#[derive(Debug)]
pub struct CollectionResult<R> {
    entries: Vec<OperationResult<R>>,
}

impl<R> CollectionResult<R> {
    pub(crate) fn from_entries(entries: Vec<OperationResult<R>>) -> Self {
        Self { entries }
    }

    /// Returns the result for the i-th input object.
    pub fn entry(&self, index: usize) -> Option<&OperationResult<R>> {
        self.entries.get(index)
    }

    /// Iterates entries in input order.
    pub fn iter(&self) -> impl Iterator<Item = &OperationResult<R>> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<OperationResult<R>> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn num_succeeded(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_ok()).count()
    }

    pub fn num_failed(&self) -> usize {
        self.entries.len() - self.num_succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.num_failed() == 0
    }
}

impl<R: AffectedTables> CollectionResult<R> {
    /// Union of affected tables over the successful entries.
    pub fn affected_tables(&self) -> HashSet<String> {
        let mut tables = HashSet::new();
        for entry in self.entries.iter().flatten() {
            tables.extend(entry.affected_tables().iter().cloned());
        }
        tables
    }
}

/// Rejects a successful write that claims no affected tables.
pub(crate) fn ensure_affected_tables(tables: &HashSet<String>) -> OperationResult<()> {
    if tables.is_empty() {
        return Err(OperationError::Resolver(ResolverError::new(
            "successful write reported an empty affected-tables set",
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CollectionResult, Deferred, OperationError, ResolverError};
    use std::cell::Cell;

    #[test]
    fn deferred_runs_nothing_until_run() {
        let started = Cell::new(false);
        let deferred = Deferred::new(|| {
            started.set(true);
            21 * 2
        });

        assert!(!started.get());
        assert_eq!(deferred.run(), 42);
        assert!(started.get());
    }

    #[test]
    fn dropped_deferred_never_executes() {
        let started = Cell::new(false);
        drop(Deferred::new(|| started.set(true)));
        assert!(!started.get());
    }

    #[test]
    fn collection_result_counts_mixed_entries() {
        let result: CollectionResult<u32> = CollectionResult::from_entries(vec![
            Ok(1),
            Err(OperationError::Resolver(ResolverError::new("boom"))),
            Ok(3),
        ]);

        assert_eq!(result.len(), 3);
        assert_eq!(result.num_succeeded(), 2);
        assert_eq!(result.num_failed(), 1);
        assert!(!result.all_succeeded());
        assert!(matches!(result.entry(1), Some(Err(_))));
    }
}
