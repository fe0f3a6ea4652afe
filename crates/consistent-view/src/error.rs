//! Errors from building a consistent view.

use gridkernel_collective::CollectiveError;
use gridkernel_types::{Gid, Rank};
use thiserror::Error;

/// Errors that can occur while gathering or canonicalizing records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error(transparent)]
    Collective(#[from] CollectiveError),

    /// A participant encoded records with a different layout.
    #[error("rank {rank} sent {found}-byte records, expected {expected}")]
    RecordSizeMismatch {
        rank: Rank,
        expected: usize,
        found: usize,
    },

    #[error("malformed contribution from rank {rank}: {reason}")]
    MalformedContribution { rank: Rank, reason: String },

    /// Two ranks reported different payloads for the same GID.
    #[error("GID {gid} has conflicting payloads from ranks {first} and {second}")]
    Conflict { gid: Gid, first: Rank, second: Rank },

    #[error("{0} records exceed the contribution limit")]
    TooManyRecords(usize),
}

impl ViewError {
    /// Whether the error means participants disagree on the protocol itself.
    ///
    /// Protocol violations abort the collective group.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ViewError::RecordSizeMismatch { .. }
                | ViewError::MalformedContribution { .. }
                | ViewError::Collective(CollectiveError::MalformedDisplacements(_))
        )
    }
}
