//! Consistent-view configuration.

use serde::{Deserialize, Serialize};

/// What to do when two ranks report different payloads for one GID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Fail the gather with [`ViewError::Conflict`](crate::ViewError::Conflict).
    #[default]
    Reject,
    /// Keep the payload from the lowest contributing rank and log the conflict.
    LowestRankWins,
}

/// Configuration for [`ConsistentView`](crate::ConsistentView).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub conflict_policy: ConflictPolicy,
}

impl ViewConfig {
    pub fn with_conflict_policy(conflict_policy: ConflictPolicy) -> Self {
        Self { conflict_policy }
    }
}
