//! Per-entity bookkeeping
//!
//! One record per tracked entity, keyed by tracking identity rather than by
//! logical key. The record owns the unit of work's handle to the entity and
//! the writer binding it was registered under, and drives the edit state
//! machine that coalesces edits into a single update:
//!
//! ```text
//!            edit (enqueue Flush{g+1})
//!   Clean ────────────────────────────► Dirty{g+1}
//!     ▲                                    │ edit (coalesced, nothing queued)
//!     │                                    ▼
//!     └──── Flush{g+1} dequeued ──────── Dirty{g+1}
//! ```
//!
//! A dequeued flush whose generation is no longer current is stale and does
//! nothing.

use crate::pending::ActionDescriptor;
use crate::registry::{BindingId, WriterBinding};
use crate::undo::Compensator;
use batchwork_core::{Entity, EntityId, StoreResult, Tracked, UnitOfWorkId};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Bookkeeping table of a unit of work
pub(crate) type BookKeepingTable = FxHashMap<EntityId, BookKeeping>;

/// Edit state of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EditState {
    /// No edits since the entity was registered or last flushed
    Clean,
    /// Edits are pending; a flush carrying `generation` is queued
    Dirty { generation: u64 },
}

/// Bookkeeping record for one tracked entity
pub(crate) struct BookKeeping {
    /// Observed edits, including coalesced ones
    pub(crate) edit_count: u64,
    state: EditState,
    generation: u64,
    pub(crate) record: Arc<dyn TrackedRecord>,
}

impl BookKeeping {
    pub(crate) fn new(record: Arc<dyn TrackedRecord>) -> Self {
        BookKeeping {
            edit_count: 0,
            state: EditState::Clean,
            generation: 0,
            record,
        }
    }

    /// Count an edit
    ///
    /// Returns the generation of a flush to enqueue when this edit ends a
    /// clean period, `None` when it coalesces into an already-queued flush.
    pub(crate) fn record_edit(&mut self) -> Option<u64> {
        self.edit_count += 1;
        match self.state {
            EditState::Clean => {
                self.generation += 1;
                self.state = EditState::Dirty {
                    generation: self.generation,
                };
                Some(self.generation)
            }
            EditState::Dirty { .. } => None,
        }
    }

    /// Claim the queued flush for `generation`
    ///
    /// Returns true and moves to clean if `generation` is current.
    pub(crate) fn take_if_current(&mut self, generation: u64) -> bool {
        match self.state {
            EditState::Dirty { generation: current } if current == generation => {
                self.state = EditState::Clean;
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> EditState {
        self.state
    }
}

/// Type-erased view of a tracked entity and its writer binding
pub(crate) trait TrackedRecord: Send + Sync {
    /// Tracking identity
    fn entity(&self) -> EntityId;

    /// Entity type name
    fn entity_type(&self) -> &'static str;

    /// Writer binding the entity was registered under
    fn binding(&self) -> BindingId;

    /// Write net edits with `update`, returning the compensator
    ///
    /// Returns `Ok(None)` when there is nothing to write. The observer owned
    /// by `owner` is detached before the write.
    fn flush(
        &self,
        owner: UnitOfWorkId,
        descriptor: ActionDescriptor,
    ) -> StoreResult<Option<Compensator>>;

    /// Stop observing the entity
    fn release(&self, owner: UnitOfWorkId);

    /// Whether `owner` currently observes the entity
    fn is_observed_by(&self, owner: UnitOfWorkId) -> bool;
}

/// Bookkeeping for an entity of type `E`
pub(crate) struct EntityRecord<E: Entity> {
    tracked: Tracked<E>,
    binding: WriterBinding<E>,
}

impl<E: Entity> EntityRecord<E> {
    pub(crate) fn new(tracked: Tracked<E>, binding: WriterBinding<E>) -> Self {
        EntityRecord { tracked, binding }
    }
}

impl<E: Entity> TrackedRecord for EntityRecord<E> {
    fn entity(&self) -> EntityId {
        self.tracked.id()
    }

    fn entity_type(&self) -> &'static str {
        E::type_name()
    }

    fn binding(&self) -> BindingId {
        self.binding.id()
    }

    fn flush(
        &self,
        owner: UnitOfWorkId,
        descriptor: ActionDescriptor,
    ) -> StoreResult<Option<Compensator>> {
        if !self.tracked.is_changed() {
            return Ok(None);
        }

        let original = self.tracked.original();
        self.tracked.detach(owner);

        self.binding.writer().update(&self.tracked.current())?;
        self.tracked.accept_changes();

        let writer = Arc::clone(self.binding.writer());
        Ok(Some(Compensator::new(descriptor, move || {
            writer.update(&original)
        })))
    }

    fn release(&self, owner: UnitOfWorkId) {
        self.tracked.detach(owner);
    }

    fn is_observed_by(&self, owner: UnitOfWorkId) -> bool {
        self.tracked.observer_owner() == Some(owner)
    }
}
