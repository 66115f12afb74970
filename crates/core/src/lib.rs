//! Core types and traits for Batchwork
//!
//! This crate defines the foundational pieces the unit of work is built on:
//! - Entity: Field-level edit model for values registered with a unit of work
//! - Keyed: Logical key of an entity, used by stores
//! - Tracked: Change-observing handle with current/original snapshots
//! - ChangeObserver: Receiver of per-field change events
//! - StoreWriter: Add/Update/Delete capability for one entity type
//! - EntityId / UnitOfWorkId: Identity types
//! - StoreError: Failure of a single store write

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entity;
pub mod error;
pub mod tracking;
pub mod traits;
pub mod types;

pub use entity::{Entity, Keyed};
pub use error::{BoxError, StoreError, StoreResult, WriteOp};
pub use tracking::{
    is_tracking_field, track, AttachOutcome, ChangeEvent, ChangeObserver, IntoTracked,
    ObservedElsewhere, Tracked, TrackingStatus, TRACKING_FIELDS,
};
pub use traits::StoreWriter;
pub use types::{EntityId, UnitOfWorkId};
