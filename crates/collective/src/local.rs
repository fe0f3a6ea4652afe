//! Single-process collective.

use crate::{Collective, CollectiveError, Gathered};
use gridkernel_types::Rank;

/// Collective for a grid with exactly one process.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCollective;

impl LocalCollective {
    pub fn new() -> Self {
        Self
    }
}

impl Collective for LocalCollective {
    fn rank(&self) -> Rank {
        Rank(0)
    }

    fn num_processes(&self) -> usize {
        1
    }

    fn all_gather(&self, local: &[u8]) -> Result<Gathered, CollectiveError> {
        Gathered::new(local.to_vec(), vec![0])
    }

    fn abort(&self, reason: &str) {
        tracing::error!(reason, "Collective aborted");
    }
}
