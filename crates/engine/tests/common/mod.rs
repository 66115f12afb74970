//! Shared fixtures for unit of work integration tests

#![allow(dead_code)]

use batchwork_core::{Entity, Keyed, StoreError, StoreResult, StoreWriter, WriteOp};
use parking_lot::Mutex;
use std::sync::Arc;

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: u32,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub enum CustomerChange {
    Name(String),
    Email(String),
}

impl Entity for Customer {
    type Change = CustomerChange;

    fn field_of(change: &CustomerChange) -> &'static str {
        match change {
            CustomerChange::Name(_) => "name",
            CustomerChange::Email(_) => "email",
        }
    }

    fn apply(&mut self, change: CustomerChange) {
        match change {
            CustomerChange::Name(v) => self.name = v,
            CustomerChange::Email(v) => self.email = v,
        }
    }

    fn type_name() -> &'static str {
        "Customer"
    }
}

impl Keyed for Customer {
    type Key = u32;

    fn key(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: u32,
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct SetTotal(pub u64);

impl Entity for Order {
    type Change = SetTotal;

    fn field_of(_: &SetTotal) -> &'static str {
        "total"
    }

    fn apply(&mut self, change: SetTotal) {
        self.total = change.0;
    }

    fn type_name() -> &'static str {
        "Order"
    }
}

impl Keyed for Order {
    type Key = u32;

    fn key(&self) -> u32 {
        self.id
    }
}

pub fn customer(id: u32, name: &str) -> Customer {
    Customer {
        id,
        name: name.to_string(),
        email: format!("{}@example.com", id),
    }
}

pub fn order(id: u32, total: u64) -> Order {
    Order { id, total }
}

// ============================================================================
// Recording writer
// ============================================================================

/// Row summary written to the call log
pub trait Describe {
    fn row_id(&self) -> u32;
    fn detail(&self) -> String;
}

impl Describe for Customer {
    fn row_id(&self) -> u32 {
        self.id
    }
    fn detail(&self) -> String {
        self.name.clone()
    }
}

impl Describe for Order {
    fn row_id(&self) -> u32 {
        self.id
    }
    fn detail(&self) -> String {
        self.total.to_string()
    }
}

/// One observed store write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub writer: &'static str,
    pub entity_type: &'static str,
    pub op: WriteOp,
    pub id: u32,
    pub detail: String,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Writer that appends every call to a shared log and can refuse chosen writes
pub struct RecordingWriter {
    name: &'static str,
    log: CallLog,
    refuse: Mutex<Vec<(WriteOp, u32)>>,
}

impl RecordingWriter {
    pub fn new(name: &'static str, log: &CallLog) -> Arc<Self> {
        Arc::new(RecordingWriter {
            name,
            log: Arc::clone(log),
            refuse: Mutex::new(Vec::new()),
        })
    }

    /// Fail every `op` write of row `id`
    pub fn refuse(&self, op: WriteOp, id: u32) {
        self.refuse.lock().push((op, id));
    }

    fn record<E: Entity + Describe>(&self, op: WriteOp, entity: &E) -> StoreResult<()> {
        if self.refuse.lock().contains(&(op, entity.row_id())) {
            return Err(StoreError::new(format!(
                "{} refused {} of {} {}",
                self.name,
                op,
                E::type_name(),
                entity.row_id()
            )));
        }
        self.log.lock().push(Call {
            writer: self.name,
            entity_type: E::type_name(),
            op,
            id: entity.row_id(),
            detail: entity.detail(),
        });
        Ok(())
    }
}

impl<E: Entity + Describe> StoreWriter<E> for RecordingWriter {
    fn add(&self, entity: &E) -> StoreResult<()> {
        self.record(WriteOp::Add, entity)
    }

    fn update(&self, entity: &E) -> StoreResult<()> {
        self.record(WriteOp::Update, entity)
    }

    fn delete(&self, entity: &E) -> StoreResult<()> {
        self.record(WriteOp::Delete, entity)
    }
}

/// `(op, id, detail)` view of a call log
pub fn ops(log: &CallLog) -> Vec<(WriteOp, u32, String)> {
    log.lock()
        .iter()
        .map(|c| (c.op, c.id, c.detail.clone()))
        .collect()
}

pub fn op(op: WriteOp, id: u32, detail: &str) -> (WriteOp, u32, String) {
    (op, id, detail.to_string())
}
