//! Unit of work coordinator
//!
//! This module provides the `UnitOfWork` struct that orchestrates:
//! - Store writer lookup through the shared `WriterRegistry`
//! - Change observation of registered entities
//! - The pending action queue, filled at registration and on first edit
//! - Ordered execution with best-effort compensation in `complete`
//!
//! ## Lifecycle
//!
//! ```text
//! Open ──complete()──► Completing ──► Completed
//!   │                       └───────► Failed
//!   └──────────dispose()/drop──────────────────► Disposed
//! ```
//!
//! Only `dispose` is accepted once a unit of work has left `Open`, and it is
//! idempotent.
//!
//! ## Example
//!
//! ```ignore
//! use batchwork_engine::UnitOfWork;
//!
//! let uow = UnitOfWork::new();
//! uow.register_store_for::<Customer, _>(customer_table)?;
//!
//! let [customer] = uow.register_for_updates(fetched)?.try_into().unwrap();
//! customer.set(CustomerChange::Name("B".into()));   // queues one update
//! customer.set(CustomerChange::Email(email));       // coalesced into it
//!
//! uow.register_delete(stale_customer)?;
//! let report = uow.complete()?;
//! ```
//!
//! ## Locking
//!
//! The work state lock is always taken before any tracked entity's lock.
//! Change events are delivered after the tracked lock is released, and store
//! writers are called with no lock held, so writers and observers may touch
//! the entities freely.

use crate::bookkeeping::{BookKeeping, BookKeepingTable, EntityRecord};
use crate::config::UnitOfWorkConfig;
use crate::error::{Result, UnitOfWorkError};
use crate::pending::{ActionDescriptor, ActionStep, PendingOperations, PendingQueue};
use crate::registry::{BindingId, WriterBinding, WriterRegistry};
use crate::undo::{CompensationReport, Compensator, UndoLog};
use batchwork_core::{
    ChangeEvent, ChangeObserver, Entity, IntoTracked, StoreError, StoreResult, StoreWriter,
    Tracked, UnitOfWorkId, WriteOp,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitOfWorkState {
    /// Accepting registrations
    Open,
    /// `complete` is draining the queue
    Completing,
    /// Every queued write succeeded
    Completed,
    /// A queued write failed; compensation has run
    Failed,
    /// Tracking state released
    Disposed,
}

impl UnitOfWorkState {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfWorkState::Open => "open",
            UnitOfWorkState::Completing => "completing",
            UnitOfWorkState::Completed => "completed",
            UnitOfWorkState::Failed => "failed",
            UnitOfWorkState::Disposed => "disposed",
        }
    }

    /// Whether `complete` has finished, successfully or not
    pub fn is_finished(&self) -> bool {
        matches!(self, UnitOfWorkState::Completed | UnitOfWorkState::Failed)
    }
}

impl fmt::Display for UnitOfWorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful `complete`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionReport {
    /// Adds written
    pub adds: usize,
    /// Updates written
    pub updates: usize,
    /// Deletes written
    pub deletes: usize,
    /// Queued updates that found nothing left to write
    pub skipped: usize,
    /// Edits observed, including those rolled up into another update
    pub edits_observed: u64,
    /// Time spent draining the queue
    pub elapsed: Duration,
}

impl CompletionReport {
    /// Total store writes performed
    pub fn total(&self) -> usize {
        self.adds + self.updates + self.deletes
    }
}

struct WorkState {
    state: UnitOfWorkState,
    queue: PendingQueue,
    bookkeeping: BookKeepingTable,
    edits_observed: u64,
}

impl WorkState {
    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.state == UnitOfWorkState::Open {
            Ok(())
        } else {
            Err(UnitOfWorkError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }

    fn observe_edit(&mut self, event: ChangeEvent) {
        let Some(bk) = self.bookkeeping.get_mut(&event.entity) else {
            return;
        };
        self.edits_observed += 1;

        match bk.record_edit() {
            Some(generation) => {
                let descriptor = self.queue.push(
                    WriteOp::Update,
                    bk.record.entity_type(),
                    event.entity,
                    ActionStep::Flush { generation },
                );
                debug!(
                    target: "batchwork::uow",
                    action = %descriptor,
                    field = event.field,
                    "Update queued on first edit"
                );
            }
            None => {
                trace!(
                    target: "batchwork::uow",
                    entity = %event.entity,
                    field = event.field,
                    edits = bk.edit_count,
                    "Edit coalesced into queued update"
                );
            }
        }
    }

    /// Detach observers, drop originals and abandon queued actions
    fn release(&mut self, owner: UnitOfWorkId) -> usize {
        for (_, bk) in self.bookkeeping.drain() {
            bk.record.release(owner);
        }
        self.queue.clear()
    }
}

/// Observer installed on every entity a unit of work tracks
struct EditObserver {
    work: Weak<Mutex<WorkState>>,
}

impl ChangeObserver for EditObserver {
    fn on_change(&self, event: ChangeEvent) {
        if event.is_tracking_event() {
            return;
        }
        if let Some(work) = self.work.upgrade() {
            work.lock().observe_edit(event);
        }
    }
}

// ============================================================================
// Unit of work
// ============================================================================

/// Best-effort unit of work
///
/// Defers every store write until [`complete`](Self::complete), runs them in
/// the order they were scheduled, and attempts to undo applied writes if a
/// later one fails. This is not a transaction: other readers see each write
/// as it lands, and compensation can itself fail.
///
/// Intended for a single flow of control. Methods take `&self`, but
/// registrations from several threads interleave in lock order rather than in
/// any order the caller can rely on.
pub struct UnitOfWork {
    id: UnitOfWorkId,
    config: UnitOfWorkConfig,
    registry: Arc<WriterRegistry>,
    work: Arc<Mutex<WorkState>>,
    observer: Arc<dyn ChangeObserver>,
}

impl UnitOfWork {
    /// Create a unit of work with default configuration and its own registry
    pub fn new() -> Self {
        Self::build(Arc::new(WriterRegistry::new()), UnitOfWorkConfig::default())
    }

    /// Create a unit of work with the given configuration
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn with_config(config: UnitOfWorkConfig) -> Result<Self> {
        Self::with_registry(Arc::new(WriterRegistry::new()), config)
    }

    /// Create a unit of work that resolves writers from a shared registry
    ///
    /// Writers registered through [`register_store_for`](Self::register_store_for)
    /// go to the shared registry as well.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn with_registry(registry: Arc<WriterRegistry>, config: UnitOfWorkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(registry, config))
    }

    fn build(registry: Arc<WriterRegistry>, config: UnitOfWorkConfig) -> Self {
        let work = Arc::new(Mutex::new(WorkState {
            state: UnitOfWorkState::Open,
            queue: PendingQueue::new(),
            bookkeeping: BookKeepingTable::default(),
            edits_observed: 0,
        }));
        let observer = Arc::new(EditObserver {
            work: Arc::downgrade(&work),
        });
        let id = UnitOfWorkId::new();

        debug!(target: "batchwork::uow", uow = %id, label = %config.label, "Unit of work opened");
        UnitOfWork {
            id,
            config,
            registry,
            work,
            observer,
        }
    }

    /// Identity of this unit of work
    pub fn id(&self) -> UnitOfWorkId {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> UnitOfWorkState {
        self.work.lock().state
    }

    /// Configuration in effect
    pub fn config(&self) -> &UnitOfWorkConfig {
        &self.config
    }

    /// Writer registry used for lookups
    pub fn registry(&self) -> &Arc<WriterRegistry> {
        &self.registry
    }

    /// Summary of queued actions and tracked entities
    pub fn pending(&self) -> PendingOperations {
        let work = self.work.lock();
        let mut summary = work.queue.summary();
        summary.tracked = work
            .bookkeeping
            .values()
            .filter(|bk| bk.record.is_observed_by(self.id))
            .count();
        summary
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register the store writer for entity type `E`
    ///
    /// Must precede any `register_*` call for `E`. Re-registering replaces
    /// the writer; actions scheduled afterwards use the new one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the unit of work is not open.
    pub fn register_store_for<E, W>(&self, writer: W) -> Result<BindingId>
    where
        E: Entity,
        W: StoreWriter<E> + 'static,
    {
        self.work.lock().ensure_open("register a store writer")?;
        Ok(self.registry.register::<E>(Arc::new(writer)))
    }

    /// Schedule an add of `entity` and track it for edits
    ///
    /// The add writes the entity as it is now. Edits made through the returned
    /// handle are tracked like any other and queue their own update, which
    /// runs after the add.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState`, `WriterNotRegistered`, `QueueLimitExceeded`,
    /// or a misuse error if the entity is tracked under another binding or by
    /// another unit of work.
    pub fn register_add<T>(&self, entity: T) -> Result<Tracked<T::Entity>>
    where
        T: IntoTracked,
    {
        self.schedule_add(entity.into_tracked())
    }

    fn schedule_add<E: Entity>(&self, tracked: Tracked<E>) -> Result<Tracked<E>> {
        let mut work = self.work.lock();
        work.ensure_open("register an add")?;
        let binding = self.binding_for::<E>()?;
        self.check_capacity(&work)?;
        self.track(&mut work, &tracked, &binding)?;

        let snapshot = tracked.current();
        let writer = Arc::clone(binding.writer());
        let step = move |descriptor: ActionDescriptor| -> StoreResult<Option<Compensator>> {
            writer.add(&snapshot)?;
            Ok(Some(Compensator::new(descriptor, move || {
                writer.delete(&snapshot)
            })))
        };

        let descriptor = work.queue.push(
            WriteOp::Add,
            E::type_name(),
            tracked.id(),
            ActionStep::Write(Box::new(step)),
        );
        debug!(target: "batchwork::uow", uow = %self.id, action = %descriptor, "Add queued");
        Ok(tracked)
    }

    /// Track `entities` for edits
    ///
    /// Nothing is queued here. The first edit to an entity after it was last
    /// flushed queues one update; later edits roll up into it. Registering an
    /// entity this unit of work already tracks is a no-op for that entity.
    ///
    /// Entities before a failing one stay registered.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState`, `WriterNotRegistered`, or a misuse error if an
    /// entity is tracked under another binding or by another unit of work.
    pub fn register_for_updates<E, I>(&self, entities: I) -> Result<Vec<Tracked<E>>>
    where
        E: Entity,
        I: IntoIterator,
        I::Item: IntoTracked<Entity = E>,
    {
        let candidates: Vec<Tracked<E>> =
            entities.into_iter().map(IntoTracked::into_tracked).collect();

        let mut work = self.work.lock();
        work.ensure_open("register for updates")?;
        let binding = self.binding_for::<E>()?;

        let mut registered = Vec::with_capacity(candidates.len());
        for tracked in candidates {
            self.track(&mut work, &tracked, &binding)?;
            registered.push(tracked);
        }

        debug!(
            target: "batchwork::uow",
            uow = %self.id,
            entity_type = E::type_name(),
            count = registered.len(),
            "Entities registered for updates"
        );
        Ok(registered)
    }

    /// Schedule a delete of `entity`
    ///
    /// The entity is written as it is now. If this unit of work observes it,
    /// observation stops; an update already queued for it still runs, in
    /// order, before the delete.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState`, `WriterNotRegistered`, `QueueLimitExceeded`, or
    /// `ForeignBinding` if the entity is tracked under another binding.
    pub fn register_delete<T>(&self, entity: T) -> Result<()>
    where
        T: IntoTracked,
    {
        self.schedule_delete(entity.into_tracked())
    }

    fn schedule_delete<E: Entity>(&self, tracked: Tracked<E>) -> Result<()> {
        let mut work = self.work.lock();
        work.ensure_open("register a delete")?;
        let binding = self.binding_for::<E>()?;
        self.check_capacity(&work)?;

        if let Some(bk) = work.bookkeeping.get(&tracked.id()) {
            if bk.record.binding() != binding.id() {
                return Err(UnitOfWorkError::ForeignBinding {
                    entity: tracked.id(),
                    entity_type: E::type_name(),
                });
            }
        }
        tracked.detach(self.id);

        let snapshot = tracked.current();
        let writer = Arc::clone(binding.writer());
        let step = move |descriptor: ActionDescriptor| -> StoreResult<Option<Compensator>> {
            writer.delete(&snapshot)?;
            Ok(Some(Compensator::new(descriptor, move || {
                writer.add(&snapshot)
            })))
        };

        let descriptor = work.queue.push(
            WriteOp::Delete,
            E::type_name(),
            tracked.id(),
            ActionStep::Write(Box::new(step)),
        );
        debug!(target: "batchwork::uow", uow = %self.id, action = %descriptor, "Delete queued");
        Ok(())
    }

    fn binding_for<E: Entity>(&self) -> Result<WriterBinding<E>> {
        self.registry
            .get::<E>()
            .ok_or(UnitOfWorkError::WriterNotRegistered {
                entity_type: E::type_name(),
            })
    }

    fn check_capacity(&self, work: &WorkState) -> Result<()> {
        match self.config.max_pending_actions {
            Some(limit) if work.queue.len() >= limit => {
                Err(UnitOfWorkError::QueueLimitExceeded { limit })
            }
            _ => Ok(()),
        }
    }

    /// Create or reuse bookkeeping for `tracked` and observe it
    fn track<E: Entity>(
        &self,
        work: &mut WorkState,
        tracked: &Tracked<E>,
        binding: &WriterBinding<E>,
    ) -> Result<()> {
        if let Some(bk) = work.bookkeeping.get(&tracked.id()) {
            if bk.record.binding() != binding.id() {
                return Err(UnitOfWorkError::ForeignBinding {
                    entity: tracked.id(),
                    entity_type: E::type_name(),
                });
            }
            tracked.attach(self.id, Arc::clone(&self.observer))?;
            return Ok(());
        }

        tracked.attach(self.id, Arc::clone(&self.observer))?;
        let record = EntityRecord::new(tracked.clone(), binding.clone());
        work.bookkeeping
            .insert(tracked.id(), BookKeeping::new(Arc::new(record)));
        trace!(target: "batchwork::tracking", uow = %self.id, entity = %tracked.id(), "Entity tracked");
        Ok(())
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Run every queued write in scheduling order
    ///
    /// Writes run one at a time with no lock held. On success all observers
    /// are detached and the undo log is discarded. On the first failing write
    /// the rest of the queue is abandoned and, unless disabled by
    /// configuration, every applied write is compensated newest first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the unit of work is not open, and
    /// `ExecutionFailed` if a store write fails.
    pub fn complete(&self) -> Result<CompletionReport> {
        {
            let mut work = self.work.lock();
            work.ensure_open("complete")?;
            work.state = UnitOfWorkState::Completing;
        }

        let started = Instant::now();
        let mut report = CompletionReport::default();
        let mut undo = UndoLog::new();

        loop {
            let Some(action) = self.work.lock().queue.pop() else {
                break;
            };
            let descriptor = action.descriptor;

            let outcome = match action.step {
                ActionStep::Write(step) => step(descriptor),
                ActionStep::Flush { generation } => {
                    let record = {
                        let mut work = self.work.lock();
                        match work.bookkeeping.get_mut(&descriptor.entity) {
                            Some(bk) => bk
                                .take_if_current(generation)
                                .then(|| Arc::clone(&bk.record)),
                            None => None,
                        }
                    };
                    match record {
                        Some(record) => {
                            debug_assert_eq!(record.entity(), descriptor.entity);
                            record.flush(self.id, descriptor)
                        }
                        None => Ok(None),
                    }
                }
            };

            match outcome {
                Ok(Some(compensator)) => {
                    match descriptor.op {
                        WriteOp::Add => report.adds += 1,
                        WriteOp::Update => report.updates += 1,
                        WriteOp::Delete => report.deletes += 1,
                    }
                    undo.push(compensator);
                }
                Ok(None) => {
                    report.skipped += 1;
                    trace!(target: "batchwork::uow", action = %descriptor, "Nothing to write");
                }
                Err(source) => return Err(self.fail(descriptor, source, undo)),
            }
        }

        undo.discard();
        report.elapsed = started.elapsed();
        {
            let mut work = self.work.lock();
            report.edits_observed = work.edits_observed;
            work.release(self.id);
            work.state = UnitOfWorkState::Completed;
        }

        info!(
            target: "batchwork::uow",
            uow = %self.id,
            label = %self.config.label,
            adds = report.adds,
            updates = report.updates,
            deletes = report.deletes,
            skipped = report.skipped,
            edits = report.edits_observed,
            elapsed_us = report.elapsed.as_micros() as u64,
            "Unit of work completed"
        );
        Ok(report)
    }

    fn fail(&self, action: ActionDescriptor, source: StoreError, undo: UndoLog) -> UnitOfWorkError {
        let abandoned = self.work.lock().queue.clear();
        warn!(
            target: "batchwork::uow",
            uow = %self.id,
            label = %self.config.label,
            action = %action,
            error = %source,
            abandoned,
            applied = undo.len(),
            "Store write failed"
        );

        let compensation = if self.config.compensate_on_failure {
            undo.compensate()
        } else {
            CompensationReport::skipped(undo.len())
        };

        {
            let mut work = self.work.lock();
            work.release(self.id);
            work.state = UnitOfWorkState::Failed;
        }

        warn!(
            target: "batchwork::uow",
            uow = %self.id,
            label = %self.config.label,
            compensation = %compensation,
            "Unit of work failed"
        );
        UnitOfWorkError::ExecutionFailed {
            label: self.config.label.clone(),
            action,
            source,
            abandoned,
            compensation,
        }
    }

    // ========================================================================
    // Disposal
    // ========================================================================

    /// Release tracking state without running queued actions
    ///
    /// Detaches every observer. Idempotent.
    pub fn dispose(&self) {
        let mut work = self.work.lock();
        if work.state == UnitOfWorkState::Disposed {
            return;
        }
        let abandoned = work.release(self.id);
        let previous = std::mem::replace(&mut work.state, UnitOfWorkState::Disposed);
        if abandoned > 0 {
            debug!(
                target: "batchwork::uow",
                uow = %self.id,
                from = %previous,
                abandoned,
                "Unit of work disposed with queued actions"
            );
        }
    }
}

impl Default for UnitOfWork {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let work = self.work.lock();
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("label", &self.config.label)
            .field("state", &work.state)
            .field("queued", &work.queue.len())
            .field("tracked", &work.bookkeeping.len())
            .finish()
    }
}
