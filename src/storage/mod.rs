//! Persistent state for the monitoring engine
//!
//! This module provides a trait-based abstraction over the store that keeps
//! checks, probe results, incidents and the alert delivery log.
//!
//! ## Design
//!
//! - **Trait-based**: [`Storage`] allows swapping implementations; the
//!   engine never names a concrete store
//! - **Async**: all operations are async for compatibility with the tokio
//!   workers
//! - **Single shared handle**: one `Arc<dyn Storage>` is shared by the
//!   scheduler, the state machine and the alert dispatcher
//!
//! ## Implementations
//!
//! - [`sqlite::SqliteStorage`]: embedded store, WAL mode, cascade deletes
//! - [`memory::MemoryStorage`]: map-backed store for tests and dry runs

pub mod backend;
pub mod error;
pub mod memory;
pub mod models;
pub mod sqlite;

pub use backend::Storage;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;
pub use models::{
    AlertRecord, Check, CheckInput, CheckResult, CheckStats, HourlyAggregate, Incident, Verdict,
};
pub use sqlite::SqliteStorage;
