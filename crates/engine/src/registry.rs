//! Store writer registry
//!
//! Routes a generically-typed entity to the writer registered for its type,
//! without the unit of work knowing every entity type at compile time. Lookup
//! is by runtime type identity; a missing writer is a programmer error and is
//! reported at the registration call that needed it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = Arc::new(WriterRegistry::new());
//!
//! // Repositories register their writers during startup, possibly concurrently
//! registry.register(customer_table_writer);
//! registry.register(order_table_writer);
//!
//! // Units of work share the registry
//! let uow = UnitOfWork::with_registry(Arc::clone(&registry), config);
//! ```
//!
//! Each registration gets a fresh [`BindingId`]. Re-registering a type
//! overwrites the previous writer; actions scheduled afterwards use the new
//! one, actions already scheduled keep the writer they captured.

use batchwork_core::{Entity, StoreWriter};
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Identity of one writer registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl BindingId {
    /// Raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding-{}", self.0)
    }
}

/// A registered writer together with its binding identity
pub struct WriterBinding<E: Entity> {
    id: BindingId,
    writer: Arc<dyn StoreWriter<E>>,
}

impl<E: Entity> WriterBinding<E> {
    /// Binding identity
    pub fn id(&self) -> BindingId {
        self.id
    }

    /// The writer
    pub fn writer(&self) -> &Arc<dyn StoreWriter<E>> {
        &self.writer
    }
}

impl<E: Entity> Clone for WriterBinding<E> {
    fn clone(&self) -> Self {
        WriterBinding {
            id: self.id,
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<E: Entity> fmt::Debug for WriterBinding<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterBinding")
            .field("id", &self.id)
            .field("entity_type", &E::type_name())
            .finish()
    }
}

struct RegisteredWriter {
    entity_type: &'static str,
    /// Holds a `WriterBinding<E>` for the keyed type
    binding: Box<dyn Any + Send + Sync>,
}

/// Concurrency-safe map from entity type to store writer
pub struct WriterRegistry {
    writers: DashMap<TypeId, RegisteredWriter>,
    next_binding: AtomicU64,
}

impl WriterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        WriterRegistry {
            writers: DashMap::new(),
            next_binding: AtomicU64::new(1),
        }
    }

    /// Register the writer for entity type `E`, replacing any previous one
    pub fn register<E: Entity>(&self, writer: Arc<dyn StoreWriter<E>>) -> BindingId {
        let id = BindingId(self.next_binding.fetch_add(1, Ordering::Relaxed));
        let entry = RegisteredWriter {
            entity_type: E::type_name(),
            binding: Box::new(WriterBinding { id, writer }),
        };

        let replaced = self.writers.insert(TypeId::of::<E>(), entry).is_some();
        debug!(
            target: "batchwork::uow",
            entity_type = E::type_name(),
            binding = %id,
            replaced,
            "Store writer registered"
        );
        id
    }

    /// Current binding for entity type `E`
    pub fn get<E: Entity>(&self) -> Option<WriterBinding<E>> {
        self.writers
            .get(&TypeId::of::<E>())
            .and_then(|entry| entry.binding.downcast_ref::<WriterBinding<E>>().cloned())
    }

    /// Remove the writer for entity type `E`
    ///
    /// Returns true if a writer was registered.
    pub fn unregister<E: Entity>(&self) -> bool {
        self.writers.remove(&TypeId::of::<E>()).is_some()
    }

    /// Check if a writer is registered for entity type `E`
    pub fn contains<E: Entity>(&self) -> bool {
        self.writers.contains_key(&TypeId::of::<E>())
    }

    /// Number of registered entity types
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Check if no writers are registered
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Names of all registered entity types, sorted
    pub fn entity_types(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.writers.iter().map(|e| e.entity_type).collect();
        names.sort_unstable();
        names
    }
}

impl Default for WriterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WriterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterRegistry")
            .field("entity_types", &self.entity_types())
            .finish()
    }
}
