//! Collective communication contract.
//!
//! This crate defines the [`Collective`] trait the consistent-view protocol is
//! written against, plus two transport-free implementations:
//!
//! - [`LocalCollective`]: a one-process grid; the gather is the identity
//! - [`MemoryCollective`]: a group of in-process participants, one per rank,
//!   meeting at a shared barrier (used to exercise multi-process behavior in tests)
//!
//! A real deployment plugs an MPI-style transport in behind the same trait.
//!
//! # Contract
//!
//! `all_gather` blocks until every participant has contributed, then returns
//! the rank-ordered concatenation of all contributions together with a
//! displacement table. Zero-length contributions are legal and always
//! represented. There is no timeout.

mod gathered;
mod local;
mod memory;

pub use gathered::Gathered;
pub use local::LocalCollective;
pub use memory::MemoryCollective;

use gridkernel_types::Rank;
use thiserror::Error;

/// Errors from a collective operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectiveError {
    #[error("malformed displacement table: {0}")]
    MalformedDisplacements(String),

    #[error("collective aborted: {0}")]
    Aborted(String),
}

/// A blocking all-gather among a fixed set of processes.
pub trait Collective: Send + Sync {
    /// Rank of the calling participant.
    fn rank(&self) -> Rank;

    /// Number of participants.
    fn num_processes(&self) -> usize;

    /// Exchange `local` with every participant.
    fn all_gather(&self, local: &[u8]) -> Result<Gathered, CollectiveError>;

    /// Tear the group down after a protocol violation.
    ///
    /// Pending and future collectives on every participant fail. Not retried.
    fn abort(&self, reason: &str);

    /// Whether `flag` is set on any participant.
    fn any_true(&self, flag: bool) -> Result<bool, CollectiveError> {
        let gathered = self.all_gather(&[u8::from(flag)])?;
        let any = gathered
            .contributions()
            .any(|(_, bytes)| bytes.iter().any(|b| *b != 0));
        Ok(any)
    }
}
