//! Fault-tolerant lifecycle sweeps.
//!
//! Each worker walks its own thread's instances, calls one hook on each, and
//! returns what happened as a [`ThreadSweep`]. A failing hook is recorded
//! and the walk continues with the next instance. The caller reduces the
//! per-thread results after the join.

use crate::{ElementFault, Node, NodeFault, SweepFaults, SweepPhase};
use tracing::warn;

/// Outcome of one thread's share of a sweep.
#[derive(Debug, Default)]
pub(crate) struct ThreadSweep {
    pub processed: usize,
    pub succeeded: usize,
    /// Succeeded instances that are not frozen.
    pub active: usize,
    pub faults: Vec<NodeFault>,
}

impl ThreadSweep {
    /// Record the outcome of one hook call. Returns whether it succeeded.
    pub fn record(
        &mut self,
        phase: SweepPhase,
        node: &Node,
        outcome: Result<(), ElementFault>,
    ) -> bool {
        self.processed += 1;
        match outcome {
            Ok(()) => {
                self.succeeded += 1;
                if !node.is_frozen() {
                    self.active += 1;
                }
                true
            }
            Err(fault) => {
                warn!(
                    phase = %phase,
                    gid = %node.gid(),
                    vp = %node.vp(),
                    error = %fault,
                    "Element hook faulted"
                );
                self.faults.push(NodeFault {
                    gid: node.gid(),
                    vp: node.vp(),
                    fault,
                });
                false
            }
        }
    }
}

/// Combined result of a sweep over every thread of this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    phase: SweepPhase,
    processed: usize,
    succeeded: usize,
    active: usize,
    faults: SweepFaults,
}

impl SweepReport {
    pub(crate) fn reduce(phase: SweepPhase, threads: Vec<ThreadSweep>) -> Self {
        let mut processed = 0;
        let mut succeeded = 0;
        let mut active = 0;
        let mut faults = Vec::new();
        for thread in threads {
            processed += thread.processed;
            succeeded += thread.succeeded;
            active += thread.active;
            faults.extend(thread.faults);
        }
        Self {
            phase,
            processed,
            succeeded,
            active,
            faults: SweepFaults::new(phase, faults),
        }
    }

    pub fn phase(&self) -> SweepPhase {
        self.phase
    }

    /// Instances whose hook was called.
    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Succeeded instances that are not frozen.
    pub fn active(&self) -> usize {
        self.active
    }

    pub fn faults(&self) -> &SweepFaults {
        &self.faults
    }

    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    /// The faults, if there were any.
    pub fn into_faults(self) -> Option<SweepFaults> {
        (!self.faults.is_empty()).then_some(self.faults)
    }
}
