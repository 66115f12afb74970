//! Unit of work engine for Batchwork
//!
//! This crate coordinates deferred writes against stores that offer no
//! multi-row transactions:
//! - UnitOfWork: Registration, edit coalescing and ordered completion
//! - WriterRegistry: Entity type to store writer routing
//! - Pending queue: Scheduled writes in execution order
//! - Undo log: Best-effort compensation of applied writes
//! - UnitOfWorkConfig: `batchwork.toml` settings
//!
//! The engine guarantees ordered execution and attempts rollback. It does not
//! guarantee atomicity.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod bookkeeping;
pub mod config;
pub mod error;
pub mod pending;
pub mod registry;
pub mod undo;
pub mod unit_of_work;

pub use config::{UnitOfWorkConfig, CONFIG_FILE_NAME};
pub use error::{Result, UnitOfWorkError};
pub use pending::{ActionDescriptor, PendingOperations};
pub use registry::{BindingId, WriterBinding, WriterRegistry};
pub use undo::{CompensationFailure, CompensationReport, Compensator, UndoLog};
pub use unit_of_work::{CompletionReport, UnitOfWork, UnitOfWorkState};
