//! Batchwork - best-effort unit of work for stores without multi-row transactions
//!
//! Batchwork defers Add/Update/Delete writes against a backing store until an
//! explicit completion point, runs them in the order they were scheduled, and
//! attempts to undo applied writes if a later one fails.
//!
//! # Quick Start
//!
//! ```ignore
//! use batchwork::{MemoryStore, UnitOfWork};
//!
//! let customers = Arc::new(MemoryStore::<Customer>::new());
//! let uow = UnitOfWork::new();
//! uow.register_store_for::<Customer, _>(Arc::clone(&customers))?;
//!
//! // Nothing is written until complete
//! let added = uow.register_add(Customer::new(1, "Ann"))?;
//! added.set(CustomerChange::Email("ann@example.com".into()));
//!
//! let report = uow.complete()?;
//! ```
//!
//! # Guarantees
//!
//! Writes run strictly one at a time, in scheduling order: adds and deletes
//! at registration, updates at the first edit of a tracked entity. Any number
//! of edits to one entity produce a single update with the final values.
//! Compensation is best effort; atomicity is not provided.
//!
//! # Architecture
//!
//! - `batchwork-core`: entity model, change tracker, store writer trait
//! - `batchwork-engine`: registry, pending queue, undo log, unit of work
//! - `batchwork-storage`: in-memory store writer

pub use batchwork_core::{
    track, ChangeEvent, ChangeObserver, Entity, EntityId, IntoTracked, Keyed, StoreError,
    StoreResult, StoreWriter, Tracked, TrackingStatus, UnitOfWorkId, WriteOp,
};
pub use batchwork_engine::{
    ActionDescriptor, CompensationReport, CompletionReport, PendingOperations, Result,
    UnitOfWork, UnitOfWorkConfig, UnitOfWorkError, UnitOfWorkState, WriterRegistry,
};
pub use batchwork_storage::MemoryStore;
