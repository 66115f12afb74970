//! Error types for the unit of work
//!
//! | Category | Variants | Raised |
//! |----------|----------|--------|
//! | Configuration | `WriterNotRegistered`, `Config` | At the offending call |
//! | Misuse | `InvalidState`, `ForeignBinding`, `TrackedElsewhere` | At the offending call |
//! | Capacity | `QueueLimitExceeded` | At registration |
//! | Execution | `ExecutionFailed` | From `complete` |
//!
//! Configuration and misuse errors are programmer errors and surface
//! synchronously. An execution failure is the single aggregate outcome of a
//! failed `complete`: which action failed, how much was abandoned, and what
//! compensation achieved.

use crate::pending::ActionDescriptor;
use crate::undo::CompensationReport;
use crate::unit_of_work::UnitOfWorkState;
use batchwork_core::{EntityId, ObservedElsewhere, StoreError};
use thiserror::Error;

/// Result type alias for unit of work operations
pub type Result<T> = std::result::Result<T, UnitOfWorkError>;

/// Unit of work errors
#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    /// No store writer is registered for the entity type
    #[error("no store writer registered for entity type {entity_type}")]
    WriterNotRegistered {
        /// Entity type name
        entity_type: &'static str,
    },

    /// The unit of work is not open for the requested operation
    #[error("cannot {operation}: unit of work is {state}")]
    InvalidState {
        /// State the unit of work is in
        state: UnitOfWorkState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// The entity is already tracked with a writer that has since been replaced
    #[error("entity {entity} ({entity_type}) is already tracked under a different store writer binding")]
    ForeignBinding {
        /// Tracking identity of the entity
        entity: EntityId,
        /// Entity type name
        entity_type: &'static str,
    },

    /// The entity is observed by another unit of work
    #[error(transparent)]
    TrackedElsewhere(#[from] ObservedElsewhere),

    /// The pending queue reached its configured limit
    #[error("pending action limit of {limit} reached")]
    QueueLimitExceeded {
        /// Configured limit
        limit: usize,
    },

    /// A store write failed during `complete`
    #[error("{action} failed in {label}: {source}; {abandoned} pending action(s) abandoned, {compensation}")]
    ExecutionFailed {
        /// Label of the unit of work
        label: String,
        /// The write that failed
        action: ActionDescriptor,
        /// Error returned by the store writer
        #[source]
        source: StoreError,
        /// Queued actions that never ran
        abandoned: usize,
        /// Result of walking the undo log
        compensation: CompensationReport,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl UnitOfWorkError {
    /// Whether this error is a programmer error rather than a store failure
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            UnitOfWorkError::WriterNotRegistered { .. }
                | UnitOfWorkError::InvalidState { .. }
                | UnitOfWorkError::ForeignBinding { .. }
                | UnitOfWorkError::TrackedElsewhere(_)
        )
    }

    /// Compensation outcome, if this is an execution failure
    pub fn compensation(&self) -> Option<&CompensationReport> {
        match self {
            UnitOfWorkError::ExecutionFailed { compensation, .. } => Some(compensation),
            _ => None,
        }
    }
}
