//! Transactional data-access layer over a relational engine.
//!
//! `quern_core` exposes typed put/get/delete operations, batches multiple
//! writes into one transaction when the engine supports it, and publishes
//! change notifications per affected table so observers can react to
//! mutations. The relational engine, the object-to-row mappings and the
//! per-entity resolvers are caller-supplied seams; this crate owns the
//! operation pipeline (resolve -> map -> execute -> notify) and its
//! transaction and notification semantics.

pub mod bus;
pub mod engine;
pub mod logging;
pub mod operation;
pub mod query;
pub mod row;
pub mod storage;

pub use bus::{ChangeBus, TableWatch};
pub use engine::{Engine, EngineError, EngineResult, SqliteEngine};
pub use logging::{default_log_level, init_logging, logging_status};
pub use operation::delete::{
    DefaultDeleteResolver, DeleteCollectionResult, DeleteResolver, DeleteResult,
};
pub use operation::get::{DefaultGetResolver, GetResolver, QuerySource, RowIter};
pub use operation::put::{
    InsertResolver, PutCollectionResult, PutResolver, PutResult,
};
pub use operation::{
    AffectedTables, CollectionResult, Deferred, Mapper, MapperError, MapperResult,
    OperationError, OperationResult, ResolverError, TransactionPolicy,
};
pub use query::{DeleteQuery, InsertQuery, RawQuery, SelectQuery, UpdateQuery};
pub use row::{Row, Value};
pub use storage::Storage;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
