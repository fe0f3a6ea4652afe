//! Registry error types.

use crate::NodeState;
use gridkernel_collective::CollectiveError;
use gridkernel_placement::ConfigError;
use gridkernel_types::{Gid, LocalId, ModelId, ThreadIndex, Vp};
use std::fmt;
use thiserror::Error;

/// Errors raised by an element's property interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("bad property: {0}")]
    BadProperty(String),

    #[error("unaccessed properties: {}", .0.join(", "))]
    UnknownProperty(Vec<String>),

    #[error("property '{key}' must be {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

/// A fault raised by one element's lifecycle hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ElementFault(pub String);

impl ElementFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One element that faulted during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFault {
    pub gid: Gid,
    pub vp: Vp,
    pub fault: ElementFault,
}

impl fmt::Display for NodeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GID {} on VP {}: {}", self.gid, self.vp, self.fault)
    }
}

/// Lifecycle phase a sweep runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepPhase {
    Prepare,
    InitState,
    Finalize,
    PostRunCleanup,
}

impl SweepPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SweepPhase::Prepare => "prepare",
            SweepPhase::InitState => "init_state",
            SweepPhase::Finalize => "finalize",
            SweepPhase::PostRunCleanup => "post_run_cleanup",
        }
    }
}

impl fmt::Display for SweepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every fault recorded by one sweep, ordered by GID then VP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFaults {
    phase: SweepPhase,
    faults: Vec<NodeFault>,
}

impl SweepFaults {
    pub(crate) fn new(phase: SweepPhase, mut faults: Vec<NodeFault>) -> Self {
        faults.sort_by_key(|f| (f.gid, f.vp.thread, f.vp.rank));
        Self { phase, faults }
    }

    pub fn phase(&self) -> SweepPhase {
        self.phase
    }

    pub fn faults(&self) -> &[NodeFault] {
        &self.faults
    }

    /// Distinct GIDs that faulted, ascending.
    pub fn gids(&self) -> Vec<Gid> {
        let mut gids: Vec<Gid> = self.faults.iter().map(|f| f.gid).collect();
        gids.dedup();
        gids
    }

    pub fn len(&self) -> usize {
        self.faults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }
}

impl fmt::Display for SweepFaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} element(s) faulted during {}: ",
            self.faults.len(),
            self.phase
        )?;
        for (i, fault) in self.faults.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{fault}")?;
        }
        Ok(())
    }
}

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("unknown model id {0}")]
    UnknownModelId(ModelId),

    #[error("model '{0}' is already registered")]
    DuplicateModel(String),

    #[error("GID {0} does not name an existing element")]
    UnknownElement(Gid),

    #[error("GID {gid} is not hosted on thread {thread}")]
    NotLocal { gid: Gid, thread: ThreadIndex },

    #[error("GID {0} is not a replicated element")]
    NotReplicated(Gid),

    #[error("thread {thread} out of range for {threads} threads per process")]
    InvalidThread { thread: ThreadIndex, threads: usize },

    #[error("local id {local_id} out of range for {len} hosted elements")]
    OutOfRange { local_id: LocalId, len: usize },

    #[error("thread-local ids are stale; call ensure_valid_thread_local_ids first")]
    StaleThreadLocalIds,

    #[error("cannot create {0} elements")]
    InvalidCount(u64),

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error("property '{key}' of GID {gid} cannot be written in state {state}")]
    IllegalPropertyWrite {
        gid: Gid,
        key: String,
        state: NodeState,
    },

    #[error("{0}")]
    LifecycleFaults(SweepFaults),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Collective(#[from] CollectiveError),
}
