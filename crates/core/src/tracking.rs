//! Change tracking for entities
//!
//! A [`Tracked`] handle wraps an entity value so that every field write is
//! observable. Writes go through [`Tracked::set`], which records the change in
//! a per-field delta on top of an immutable baseline:
//!
//! ```text
//! baseline (as first tracked)  +  delta { field -> latest change }
//!        │                               │
//!        └── original() ──┐              │
//!                         └── current() ─┘  (baseline with delta replayed)
//!
//! accept_changes(): baseline := current(), delta := {}
//! ```
//!
//! # Observation
//!
//! At most one [`ChangeObserver`] is attached at a time, tagged with the
//! [`UnitOfWorkId`] that installed it. Each field write fires exactly one
//! [`ChangeEvent`] carrying the field name. The tracker also reports its own
//! status transitions (see [`TRACKING_FIELDS`]); observers that schedule work
//! must ignore those, or accepting changes would schedule more work.
//!
//! Observers are invoked after the handle's internal lock is released, so an
//! observer may read the entity it is notified about.

use crate::entity::Entity;
use crate::types::{EntityId, UnitOfWorkId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

// ============================================================================
// Tracker metadata fields
// ============================================================================

/// Fired when the handle moves between unchanged and changed
pub const IS_CHANGED: &str = "is_changed";
/// Fired when the tracking status is reset by accepting or rejecting changes
pub const TRACKING_STATUS: &str = "tracking_status";
/// Fired when the set of changed fields is cleared
pub const CHANGED_FIELDS: &str = "changed_fields";

/// Names the tracker itself reports changes under
///
/// Entity fields must not use these names; their writes would be treated as
/// tracker bookkeeping by the unit of work.
pub const TRACKING_FIELDS: &[&str] = &[IS_CHANGED, TRACKING_STATUS, CHANGED_FIELDS];

/// Whether a change event refers to tracker metadata rather than entity data
pub fn is_tracking_field(field: &str) -> bool {
    TRACKING_FIELDS.contains(&field)
}

// ============================================================================
// Events and observers
// ============================================================================

/// A single observed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Entity that was written
    pub entity: EntityId,
    /// Field name, or one of [`TRACKING_FIELDS`]
    pub field: &'static str,
}

impl ChangeEvent {
    /// Create a change event
    pub fn new(entity: EntityId, field: &'static str) -> Self {
        ChangeEvent { entity, field }
    }

    /// Whether this event refers to tracker metadata
    pub fn is_tracking_event(&self) -> bool {
        is_tracking_field(self.field)
    }
}

/// Receiver of change events for a tracked entity
pub trait ChangeObserver: Send + Sync {
    /// Called once per write, after the write is recorded
    fn on_change(&self, event: ChangeEvent);
}

/// Tracking status of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    /// No pending edits since tracking began or changes were last accepted
    Unchanged,
    /// At least one field has a pending edit
    Changed,
}

/// Result of attaching an observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The observer was installed
    Attached,
    /// The same owner already observes this entity; nothing was installed
    AlreadyAttached,
}

/// Attaching failed because another unit of work observes the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("entity {entity} is already observed by unit of work {owner}")]
pub struct ObservedElsewhere {
    /// Entity that was being attached to
    pub entity: EntityId,
    /// Unit of work currently observing it
    pub owner: UnitOfWorkId,
}

struct Attachment {
    owner: UnitOfWorkId,
    observer: Arc<dyn ChangeObserver>,
}

// ============================================================================
// Tracked handle
// ============================================================================

struct TrackState<E: Entity> {
    baseline: E,
    delta: BTreeMap<&'static str, E::Change>,
    attachment: Option<Attachment>,
}

struct TrackedInner<E: Entity> {
    id: EntityId,
    state: Mutex<TrackState<E>>,
}

/// Change-observing handle to an entity
///
/// Cloning the handle shares the tracked entity; all clones have the same
/// [`EntityId`] and see the same edits.
pub struct Tracked<E: Entity> {
    inner: Arc<TrackedInner<E>>,
}

impl<E: Entity> Clone for Tracked<E> {
    fn clone(&self) -> Self {
        Tracked {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity> Tracked<E> {
    /// Wrap an entity for change tracking
    ///
    /// The value becomes the baseline and the original snapshot.
    pub fn track(entity: E) -> Self {
        Tracked {
            inner: Arc::new(TrackedInner {
                id: EntityId::new(),
                state: Mutex::new(TrackState {
                    baseline: entity,
                    delta: BTreeMap::new(),
                    attachment: None,
                }),
            }),
        }
    }

    /// Tracking identity of this entity
    pub fn id(&self) -> EntityId {
        self.inner.id
    }

    /// Whether two handles refer to the same tracked entity
    pub fn same_entity(&self, other: &Tracked<E>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Record a field write and notify the observer, if any
    pub fn set(&self, change: E::Change) {
        let field = E::field_of(&change);
        let (observer, became_changed) = {
            let mut state = self.inner.state.lock();
            let was_changed = !state.delta.is_empty();
            state.delta.insert(field, change);
            (state.observer(), !was_changed)
        };

        if let Some(observer) = observer {
            observer.on_change(ChangeEvent::new(self.id(), field));
            if became_changed {
                observer.on_change(ChangeEvent::new(self.id(), IS_CHANGED));
            }
        }
    }

    /// Entity with all pending edits applied, as a plain value
    pub fn current(&self) -> E {
        let state = self.inner.state.lock();
        let mut value = state.baseline.clone();
        for change in state.delta.values() {
            value.apply(change.clone());
        }
        value
    }

    /// Entity as of tracking start or the last accepted changeset
    pub fn original(&self) -> E {
        self.inner.state.lock().baseline.clone()
    }

    /// Seal pending edits into a new baseline
    ///
    /// Further edits start a fresh delta. Does nothing when unchanged.
    pub fn accept_changes(&self) {
        let observer = {
            let mut state = self.inner.state.lock();
            if state.delta.is_empty() {
                return;
            }
            let delta = std::mem::take(&mut state.delta);
            for change in delta.into_values() {
                state.baseline.apply(change);
            }
            state.observer()
        };

        trace!(target: "batchwork::tracking", entity = %self.id(), "Changes accepted");
        self.notify_reset(observer);
    }

    /// Discard pending edits, keeping the baseline
    pub fn reject_changes(&self) {
        let observer = {
            let mut state = self.inner.state.lock();
            if state.delta.is_empty() {
                return;
            }
            state.delta.clear();
            state.observer()
        };

        trace!(target: "batchwork::tracking", entity = %self.id(), "Changes rejected");
        self.notify_reset(observer);
    }

    /// Whether any field has a pending edit
    pub fn is_changed(&self) -> bool {
        !self.inner.state.lock().delta.is_empty()
    }

    /// Current tracking status
    pub fn status(&self) -> TrackingStatus {
        if self.is_changed() {
            TrackingStatus::Changed
        } else {
            TrackingStatus::Unchanged
        }
    }

    /// Names of fields with pending edits, in replay order
    pub fn changed_fields(&self) -> Vec<&'static str> {
        self.inner.state.lock().delta.keys().copied().collect()
    }

    /// Install an observer owned by `owner`
    ///
    /// Idempotent for the same owner: the existing observer is kept.
    ///
    /// # Errors
    ///
    /// Returns [`ObservedElsewhere`] if a different owner is attached.
    pub fn attach(
        &self,
        owner: UnitOfWorkId,
        observer: Arc<dyn ChangeObserver>,
    ) -> Result<AttachOutcome, ObservedElsewhere> {
        let mut state = self.inner.state.lock();
        match &state.attachment {
            Some(existing) if existing.owner == owner => Ok(AttachOutcome::AlreadyAttached),
            Some(existing) => Err(ObservedElsewhere {
                entity: self.inner.id,
                owner: existing.owner,
            }),
            None => {
                state.attachment = Some(Attachment { owner, observer });
                Ok(AttachOutcome::Attached)
            }
        }
    }

    /// Remove the observer if `owner` installed it
    ///
    /// Returns true if an observer was removed.
    pub fn detach(&self, owner: UnitOfWorkId) -> bool {
        let mut state = self.inner.state.lock();
        match &state.attachment {
            Some(existing) if existing.owner == owner => {
                state.attachment = None;
                true
            }
            _ => false,
        }
    }

    /// Owner of the attached observer, if any
    pub fn observer_owner(&self) -> Option<UnitOfWorkId> {
        self.inner.state.lock().attachment.as_ref().map(|a| a.owner)
    }

    /// Whether any observer is attached
    pub fn is_observed(&self) -> bool {
        self.inner.state.lock().attachment.is_some()
    }

    fn notify_reset(&self, observer: Option<Arc<dyn ChangeObserver>>) {
        if let Some(observer) = observer {
            for field in TRACKING_FIELDS {
                observer.on_change(ChangeEvent::new(self.id(), *field));
            }
        }
    }
}

impl<E: Entity> TrackState<E> {
    fn observer(&self) -> Option<Arc<dyn ChangeObserver>> {
        self.attachment.as_ref().map(|a| Arc::clone(&a.observer))
    }
}

impl<E: Entity + fmt::Debug> fmt::Debug for Tracked<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Tracked")
            .field("id", &self.inner.id)
            .field("baseline", &state.baseline)
            .field("changed_fields", &state.delta.keys().collect::<Vec<_>>())
            .field("observed", &state.attachment.is_some())
            .finish()
    }
}

impl<E: Entity> From<E> for Tracked<E> {
    fn from(entity: E) -> Self {
        Tracked::track(entity)
    }
}

// ============================================================================
// Idempotent tracking
// ============================================================================

/// Values that can be turned into a tracked handle
///
/// Plain entities are wrapped; handles that are already tracked pass through
/// unchanged, keeping their identity.
pub trait IntoTracked {
    /// The entity type being tracked
    type Entity: Entity;

    /// Wrap, or return the existing handle
    fn into_tracked(self) -> Tracked<Self::Entity>;
}

impl<E: Entity> IntoTracked for E {
    type Entity = E;

    fn into_tracked(self) -> Tracked<E> {
        Tracked::track(self)
    }
}

impl<E: Entity> IntoTracked for Tracked<E> {
    type Entity = E;

    fn into_tracked(self) -> Tracked<E> {
        self
    }
}

/// Track a value, returning an already-tracked handle unchanged
pub fn track<T: IntoTracked>(value: T) -> Tracked<T::Entity> {
    value.into_tracked()
}
