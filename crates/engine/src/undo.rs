//! Undo log for best-effort compensation
//!
//! Each forward write that actually lands in the store appends its
//! compensator here. If a later write in the same `complete` fails, the log is
//! walked newest-first and every compensator is attempted once:
//!
//! ```text
//! forward:  add(A) ✓   delete(D) ✓   update(U) ✓   add(B) ✗
//! undo:                                 update(U₀) ← delete(D→add) ← add(A→delete)
//! ```
//!
//! This does not provide transactional semantics. A compensator that fails
//! (or panics) is recorded in the [`CompensationReport`] and the walk moves on;
//! nothing is retried.

use crate::pending::ActionDescriptor;
use batchwork_core::{StoreError, StoreResult};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// Approximate reversal of one applied write
pub struct Compensator {
    forward: ActionDescriptor,
    undo: Box<dyn FnOnce() -> StoreResult<()> + Send>,
}

impl Compensator {
    /// Create a compensator for the applied write `forward`
    pub fn new(
        forward: ActionDescriptor,
        undo: impl FnOnce() -> StoreResult<()> + Send + 'static,
    ) -> Self {
        Compensator {
            forward,
            undo: Box::new(undo),
        }
    }

    /// The forward write this compensates
    pub fn forward(&self) -> &ActionDescriptor {
        &self.forward
    }

    fn run(self) -> StoreResult<()> {
        let undo = self.undo;
        match catch_unwind(AssertUnwindSafe(undo)) {
            Ok(result) => result,
            Err(_) => Err(StoreError::new("compensator panicked")),
        }
    }
}

impl fmt::Debug for Compensator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compensator")
            .field("forward", &self.forward)
            .finish_non_exhaustive()
    }
}

/// A compensator that did not succeed
#[derive(Debug)]
pub struct CompensationFailure {
    /// Forward write that could not be undone
    pub action: ActionDescriptor,
    /// Why the compensating write failed
    pub error: StoreError,
}

/// Outcome of walking the undo log
#[derive(Debug, Default)]
pub struct CompensationReport {
    /// Compensators attempted
    pub attempted: usize,
    /// Compensators that succeeded
    pub succeeded: usize,
    /// Compensators that failed, in the order they were attempted
    pub failures: Vec<CompensationFailure>,
    /// Applied writes left uncompensated because compensation is disabled
    pub skipped: usize,
}

impl CompensationReport {
    /// Report for a log that was not walked
    pub fn skipped(applied: usize) -> Self {
        CompensationReport {
            skipped: applied,
            ..Default::default()
        }
    }

    /// Whether every applied write was successfully compensated
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0
    }
}

impl fmt::Display for CompensationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped > 0 {
            return write!(f, "compensation skipped for {} applied write(s)", self.skipped);
        }
        write!(
            f,
            "compensated {}/{} applied write(s)",
            self.succeeded, self.attempted
        )?;
        if !self.failures.is_empty() {
            write!(f, ", {} compensation failure(s)", self.failures.len())?;
        }
        Ok(())
    }
}

/// Append-only log of compensators for applied writes
#[derive(Debug, Default)]
pub struct UndoLog {
    entries: Vec<Compensator>,
}

impl UndoLog {
    /// Create an empty log
    pub fn new() -> Self {
        UndoLog {
            entries: Vec::new(),
        }
    }

    /// Record the compensator of a write that was applied
    pub fn push(&mut self, compensator: Compensator) {
        self.entries.push(compensator);
    }

    /// Number of recorded compensators
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget all compensators (the batch succeeded)
    pub fn discard(&mut self) {
        self.entries.clear();
    }

    /// Attempt every compensator, newest first
    pub fn compensate(mut self) -> CompensationReport {
        let mut report = CompensationReport::default();

        while let Some(compensator) = self.entries.pop() {
            let forward = *compensator.forward();
            report.attempted += 1;
            match compensator.run() {
                Ok(()) => {
                    report.succeeded += 1;
                    debug!(target: "batchwork::uow", action = %forward, "Write compensated");
                }
                Err(error) => {
                    warn!(target: "batchwork::uow", action = %forward, error = %error, "Compensation failed");
                    report.failures.push(CompensationFailure {
                        action: forward,
                        error,
                    });
                }
            }
        }

        report
    }
}
