//! Entity model
//!
//! The engine never reaches into an entity's fields by name at runtime.
//! Instead each entity type names its own field-level edit type
//! ([`Entity::Change`]): one variant per settable field, carrying the new
//! value. A tracked entity records these edits as a delta keyed by field name
//! and replays them over its baseline on demand.
//!
//! # Example
//!
//! ```
//! use batchwork_core::Entity;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Customer {
//!     id: String,
//!     name: String,
//! }
//!
//! #[derive(Debug, Clone)]
//! enum CustomerChange {
//!     Name(String),
//! }
//!
//! impl Entity for Customer {
//!     type Change = CustomerChange;
//!
//!     fn field_of(change: &CustomerChange) -> &'static str {
//!         match change {
//!             CustomerChange::Name(_) => "name",
//!         }
//!     }
//!
//!     fn apply(&mut self, change: CustomerChange) {
//!         match change {
//!             CustomerChange::Name(name) => self.name = name,
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::hash::Hash;

/// A value that can be registered with a unit of work
///
/// `apply` must only touch the field that `field_of` names for the change;
/// the tracker keeps at most one pending change per field and replays them
/// in field-name order.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Field-level edit: one variant per settable field
    type Change: Clone + fmt::Debug + Send + Sync + 'static;

    /// Name of the field a change writes to
    fn field_of(change: &Self::Change) -> &'static str;

    /// Write a change into this value
    fn apply(&mut self, change: Self::Change);

    /// Type name used in log events and error messages
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// An entity with a logical key
///
/// The key identifies the stored row; it is not the tracking identity
/// (see [`EntityId`](crate::EntityId)).
pub trait Keyed {
    /// Logical key type
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Logical key of this entity
    fn key(&self) -> Self::Key;
}
