//! In-memory keyed store
//!
//! `MemoryStore` behaves like a single table of a partitioned key-value
//! service: rows are addressed by the entity's logical key and each write
//! touches exactly one row.
//!
//! | Write | Key present | Key absent |
//! |-------|-------------|------------|
//! | add | error | insert |
//! | update | replace | insert |
//! | delete | remove | no-op |
//!
//! Reads are lock-free via DashMap. Values are cloned in and out, so callers
//! never share state with the stored rows.
//!
//! # Fault injection
//!
//! [`MemoryStore::fail_next`] arms a one-shot failure for the next write of a
//! given kind, which is how tests drive a unit of work into compensation.

use batchwork_core::{Entity, Keyed, StoreError, StoreResult, StoreWriter, WriteOp};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Keyed in-memory table for entity type `E`
pub struct MemoryStore<E: Entity + Keyed> {
    rows: DashMap<E::Key, E>,
    /// Armed one-shot failures, consumed in arming order per write kind
    faults: Mutex<Vec<WriteOp>>,
    writes: AtomicU64,
}

impl<E: Entity + Keyed> MemoryStore<E> {
    /// Create an empty store
    pub fn new() -> Self {
        MemoryStore {
            rows: DashMap::new(),
            faults: Mutex::new(Vec::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Create a store holding `entities`, replacing rows with equal keys
    pub fn with_entities(entities: impl IntoIterator<Item = E>) -> Self {
        let store = Self::new();
        for entity in entities {
            store.rows.insert(entity.key(), entity);
        }
        store
    }

    /// Row stored under `key`
    pub fn get(&self, key: &E::Key) -> Option<E> {
        self.rows.get(key).map(|row| row.value().clone())
    }

    /// Check if a row is stored under `key`
    pub fn contains(&self, key: &E::Key) -> bool {
        self.rows.contains_key(key)
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All stored rows, in no particular order
    pub fn entities(&self) -> Vec<E> {
        self.rows.iter().map(|row| row.value().clone()).collect()
    }

    /// Successful writes performed since creation
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Make the next `op` write fail without touching any row
    ///
    /// Arming the same kind several times fails that many consecutive writes.
    pub fn fail_next(&self, op: WriteOp) {
        self.faults.lock().push(op);
    }

    /// Disarm all pending failures
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    fn take_fault(&self, op: WriteOp) -> StoreResult<()> {
        let mut faults = self.faults.lock();
        if let Some(pos) = faults.iter().position(|armed| *armed == op) {
            faults.remove(pos);
            return Err(StoreError::new(format!(
                "injected {} failure for {}",
                op,
                E::type_name()
            )));
        }
        Ok(())
    }

    fn wrote(&self, op: WriteOp, key: &E::Key) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        trace!(target: "batchwork::storage", op = op.as_str(), key = ?key, "Row written");
    }
}

impl<E: Entity + Keyed> StoreWriter<E> for MemoryStore<E> {
    fn add(&self, entity: &E) -> StoreResult<()> {
        self.take_fault(WriteOp::Add)?;
        let key = entity.key();
        match self.rows.entry(key.clone()) {
            Entry::Occupied(_) => {
                Err(StoreError::already_exists(E::type_name()))
            }
            Entry::Vacant(slot) => {
                slot.insert(entity.clone());
                self.wrote(WriteOp::Add, &key);
                Ok(())
            }
        }
    }

    fn update(&self, entity: &E) -> StoreResult<()> {
        self.take_fault(WriteOp::Update)?;
        let key = entity.key();
        self.rows.insert(key.clone(), entity.clone());
        self.wrote(WriteOp::Update, &key);
        Ok(())
    }

    fn delete(&self, entity: &E) -> StoreResult<()> {
        self.take_fault(WriteOp::Delete)?;
        let key = entity.key();
        if self.rows.remove(&key).is_some() {
            self.wrote(WriteOp::Delete, &key);
        }
        Ok(())
    }
}

impl<E: Entity + Keyed> Default for MemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity + Keyed> fmt::Debug for MemoryStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entity_type", &E::type_name())
            .field("rows", &self.rows.len())
            .field("armed_faults", &self.faults.lock().len())
            .finish()
    }
}
