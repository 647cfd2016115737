//! Storage facade: engine handle plus change notification bus.
//!
//! # Responsibility
//! - Own the live engine and the bus for its table-change notifications.
//! - Hand out prepared put/get/delete builders and table watches.
//!
//! # Invariants
//! - One `Storage` wraps one engine connection for its whole lifetime.
//! - Callers serialize engine access (single-writer discipline); only bus
//!   subscribers may live on other threads.

use std::collections::HashSet;
use std::sync::Arc;

use crate::bus::{ChangeBus, TableWatch};
use crate::engine::Engine;
use crate::operation::delete::DeleteRequest;
use crate::operation::get::GetRequest;
use crate::operation::put::PutRequest;

/// Entry point for typed data access over one relational engine.
///
/// ```no_run
/// # use quern_core::{Row, Storage, SqliteEngine, InsertResolver, MapperResult};
/// let storage = Storage::new(SqliteEngine::open_in_memory().unwrap());
/// let resolver = InsertResolver::into_table("users");
///
/// let mut email = "picard@example.com".to_string();
/// let result = storage
///     .put()
///     .object(&mut email)
///     .with_mapper(|email: &String| -> MapperResult<Row> {
///         Ok(Row::new().with("email", email.clone()))
///     })
///     .with_resolver(&resolver)
///     .prepare()
///     .unwrap()
///     .execute()
///     .unwrap();
/// assert!(result.was_inserted());
/// ```
pub struct Storage {
    engine: Box<dyn Engine>,
    bus: Arc<ChangeBus>,
}

impl Storage {
    /// Wraps an engine. The engine's connection stays owned by this storage
    /// until it is dropped.
    pub fn new(engine: impl Engine + 'static) -> Self {
        Self {
            engine: Box::new(engine),
            bus: Arc::new(ChangeBus::new()),
        }
    }

    /// Starts a put operation.
    pub fn put(&self) -> PutRequest<'_> {
        PutRequest { storage: self }
    }

    /// Starts a get operation.
    pub fn get(&self) -> GetRequest<'_> {
        GetRequest { storage: self }
    }

    /// Starts a delete operation.
    pub fn delete(&self) -> DeleteRequest<'_> {
        DeleteRequest { storage: self }
    }

    /// Subscribes to mutations touching any of the given tables.
    ///
    /// The watch receives the affected-table set of every future committed
    /// mutation that intersects `tables`, in publish order, until dropped.
    pub fn watch(&self, tables: impl IntoIterator<Item = impl Into<String>>) -> TableWatch {
        self.bus
            .subscribe(tables.into_iter().map(Into::into).collect())
    }

    /// The execution engine behind this storage.
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Publishes a change notification for the given tables.
    ///
    /// Prepared operations call this themselves; it is public for callers
    /// driving bespoke multi-table writes through [`Storage::engine`].
    pub fn notify_changed(&self, affected_tables: &HashSet<String>) {
        self.bus.publish(affected_tables);
    }
}
