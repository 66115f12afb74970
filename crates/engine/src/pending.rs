//! Pending action queue
//!
//! Every store write a unit of work will perform is queued here at the moment
//! it is scheduled: adds and deletes at registration, updates at the first
//! observed edit after the entity was last flushed. `complete` drains the
//! queue strictly front to back, one action at a time. The backing store
//! offers no ordering guarantee across rows, so this queue order is the only
//! ordering there is.

use crate::undo::Compensator;
use batchwork_core::{EntityId, StoreResult, WriteOp};
use std::collections::VecDeque;
use std::fmt;

/// Description of a scheduled store write
///
/// Carried into logs, compensation reports and execution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionDescriptor {
    /// Position in scheduling order, starting at 1
    pub sequence: u64,
    /// Store write performed
    pub op: WriteOp,
    /// Entity type name
    pub entity_type: &'static str,
    /// Tracking identity of the entity
    pub entity: EntityId,
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "action #{} ({} {} {})",
            self.sequence, self.op, self.entity_type, self.entity
        )
    }
}

/// Deferred write with its compensator
///
/// Runs the write described by the descriptor it is given and, on success,
/// returns the action that approximately reverses it.
pub(crate) type WriteStep =
    Box<dyn FnOnce(ActionDescriptor) -> StoreResult<Option<Compensator>> + Send>;

/// What a pending action does when dequeued
pub(crate) enum ActionStep {
    /// Run a captured write
    Write(WriteStep),
    /// Flush coalesced edits of a tracked entity, if `generation` is still current
    Flush {
        /// Generation the entity was in when this action was queued
        generation: u64,
    },
}

/// One queued action
pub(crate) struct PendingAction {
    pub(crate) descriptor: ActionDescriptor,
    pub(crate) step: ActionStep,
}

/// Summary of queued work, before completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingOperations {
    /// Queued adds
    pub adds: usize,
    /// Queued updates (one per dirty tracked entity)
    pub updates: usize,
    /// Queued deletes
    pub deletes: usize,
    /// Entities currently tracked for edits
    pub tracked: usize,
}

impl PendingOperations {
    /// Total number of queued actions
    pub fn total(&self) -> usize {
        self.adds + self.updates + self.deletes
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// FIFO queue of pending actions
pub(crate) struct PendingQueue {
    actions: VecDeque<PendingAction>,
    next_sequence: u64,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        PendingQueue {
            actions: VecDeque::new(),
            next_sequence: 1,
        }
    }

    /// Append an action, assigning its sequence number
    pub(crate) fn push(
        &mut self,
        op: WriteOp,
        entity_type: &'static str,
        entity: EntityId,
        step: ActionStep,
    ) -> ActionDescriptor {
        let descriptor = ActionDescriptor {
            sequence: self.next_sequence,
            op,
            entity_type,
            entity,
        };
        self.next_sequence += 1;
        self.actions.push_back(PendingAction { descriptor, step });
        descriptor
    }

    pub(crate) fn pop(&mut self) -> Option<PendingAction> {
        self.actions.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.actions.len()
    }

    /// Drop every queued action, returning how many were dropped
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.actions.len();
        self.actions.clear();
        dropped
    }

    /// Count queued actions by write kind
    pub(crate) fn summary(&self) -> PendingOperations {
        let mut summary = PendingOperations::default();
        for action in &self.actions {
            match action.descriptor.op {
                WriteOp::Add => summary.adds += 1,
                WriteOp::Update => summary.updates += 1,
                WriteOp::Delete => summary.deletes += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> ActionStep {
        ActionStep::Write(Box::new(|_| Ok(None)))
    }

    #[test]
    fn test_queue_is_fifo_with_increasing_sequence() {
        let mut queue = PendingQueue::new();
        let a = EntityId::new();
        let b = EntityId::new();

        let first = queue.push(WriteOp::Delete, "T", a, noop());
        let second = queue.push(WriteOp::Add, "T", b, noop());
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);

        assert_eq!(queue.pop().unwrap().descriptor, first);
        assert_eq!(queue.pop().unwrap().descriptor, second);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_sequence_survives_clear() {
        let mut queue = PendingQueue::new();
        queue.push(WriteOp::Add, "T", EntityId::new(), noop());
        queue.push(WriteOp::Add, "T", EntityId::new(), noop());
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.len(), 0);

        let next = queue.push(WriteOp::Add, "T", EntityId::new(), noop());
        assert_eq!(next.sequence, 3);
    }

    #[test]
    fn test_summary_counts_by_op() {
        let mut queue = PendingQueue::new();
        queue.push(WriteOp::Add, "T", EntityId::new(), noop());
        queue.push(
            WriteOp::Update,
            "T",
            EntityId::new(),
            ActionStep::Flush { generation: 1 },
        );
        queue.push(WriteOp::Delete, "T", EntityId::new(), noop());
        queue.push(WriteOp::Delete, "T", EntityId::new(), noop());

        let summary = queue.summary();
        assert_eq!(summary.adds, 1);
        assert_eq!(summary.updates, 1);
        assert_eq!(summary.deletes, 2);
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_empty());
    }

    #[test]
    fn test_descriptor_display() {
        let entity = EntityId::new();
        let d = ActionDescriptor {
            sequence: 4,
            op: WriteOp::Update,
            entity_type: "Customer",
            entity,
        };
        let text = d.to_string();
        assert!(text.contains("#4"));
        assert!(text.contains("update Customer"));
        assert!(text.contains(&entity.to_string()));
    }
}
