//! Store writer abstraction
//!
//! This module defines the only capability the unit of work consumes from its
//! environment. A store writer performs exactly one write per call against
//! the backing store and owns whatever client or connection that requires;
//! the unit of work holds no storage-level locks of its own.

use crate::entity::Entity;
use crate::error::{StoreResult, WriteOp};
use std::sync::Arc;

/// Write capability for one entity type
///
/// Thread safety: writers are registered through a shared registry and may
/// be handed out to several units of work, so they must be Send + Sync.
///
/// # Examples
///
/// ```
/// use batchwork_core::{Entity, StoreResult, StoreWriter};
///
/// #[derive(Clone)]
/// struct Row(u32);
///
/// impl Entity for Row {
///     type Change = ();
///     fn field_of(_: &()) -> &'static str { "row" }
///     fn apply(&mut self, _: ()) {}
/// }
///
/// struct NullWriter;
///
/// impl StoreWriter<Row> for NullWriter {
///     fn add(&self, _: &Row) -> StoreResult<()> { Ok(()) }
///     fn update(&self, _: &Row) -> StoreResult<()> { Ok(()) }
///     fn delete(&self, _: &Row) -> StoreResult<()> { Ok(()) }
/// }
/// ```
pub trait StoreWriter<E: Entity>: Send + Sync {
    /// Add a new entity to the store
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects or fails the write.
    fn add(&self, entity: &E) -> StoreResult<()>;

    /// Replace an entity in the store
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects or fails the write.
    fn update(&self, entity: &E) -> StoreResult<()>;

    /// Delete an entity from the store
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects or fails the write.
    fn delete(&self, entity: &E) -> StoreResult<()>;

    /// Dispatch a write by operation
    ///
    /// # Errors
    ///
    /// Propagates the error of the underlying write.
    fn write(&self, op: WriteOp, entity: &E) -> StoreResult<()> {
        match op {
            WriteOp::Add => self.add(entity),
            WriteOp::Update => self.update(entity),
            WriteOp::Delete => self.delete(entity),
        }
    }
}

impl<E: Entity, W: StoreWriter<E> + ?Sized> StoreWriter<E> for Arc<W> {
    fn add(&self, entity: &E) -> StoreResult<()> {
        (**self).add(entity)
    }

    fn update(&self, entity: &E) -> StoreResult<()> {
        (**self).update(entity)
    }

    fn delete(&self, entity: &E) -> StoreResult<()> {
        (**self).delete(entity)
    }
}
