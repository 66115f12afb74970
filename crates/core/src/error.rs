//! Error types for store writers
//!
//! A [`StoreError`] is what a store writer returns when its single write
//! against the backing store fails. The unit of work never inspects it beyond
//! logging and reporting; it only needs to know that the write did not land.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Boxed error source carried by [`StoreError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for store writer operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Which store write an operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    /// Insert a new entity
    Add,
    /// Replace an existing entity
    Update,
    /// Remove an entity
    Delete,
}

impl WriteOp {
    /// The write that approximately reverses this one
    ///
    /// An add is undone by a delete and vice versa. An update is undone by
    /// another update carrying the pre-edit original.
    pub fn inverse(self) -> WriteOp {
        match self {
            WriteOp::Add => WriteOp::Delete,
            WriteOp::Update => WriteOp::Update,
            WriteOp::Delete => WriteOp::Add,
        }
    }

    /// Lowercase name, used in log fields and messages
    pub fn as_str(self) -> &'static str {
        match self {
            WriteOp::Add => "add",
            WriteOp::Update => "update",
            WriteOp::Delete => "delete",
        }
    }
}

impl std::fmt::Display for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single store write
#[derive(Debug, Error)]
#[error("Store write failed: {message}")]
pub struct StoreError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl StoreError {
    /// Create a store error from a message
    pub fn new(message: impl Into<String>) -> Self {
        StoreError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a store error wrapping an underlying client error
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StoreError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The entity already exists in the store
    pub fn already_exists(entity_type: &str) -> Self {
        Self::new(format!("{} is already present", entity_type))
    }

    /// Human-readable failure message, without the source chain
    pub fn message(&self) -> &str {
        &self.message
    }
}
