//! Synchronous inline dispatch for deterministic runs.
//!
//! [`SyncDispatch`] processes every partition on the calling thread,
//! in partition order.

use gridkernel_dispatch::Dispatch;

/// Synchronous dispatch that runs partitions inline.
///
/// Used by tests and single-threaded runs for deterministic execution.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncDispatch;

impl SyncDispatch {
    pub fn new() -> Self {
        Self
    }
}

impl Dispatch for SyncDispatch {
    fn parallelism(&self) -> usize {
        1
    }

    fn map_partitions_mut<T, R>(
        &self,
        partitions: &mut [T],
        f: impl Fn(usize, &mut T) -> R + Send + Sync,
    ) -> Vec<R>
    where
        T: Send,
        R: Send,
    {
        partitions
            .iter_mut()
            .enumerate()
            .map(|(i, p)| f(i, p))
            .collect()
    }

    fn map_partitions<T, R>(
        &self,
        partitions: &[T],
        f: impl Fn(usize, &T) -> R + Send + Sync,
    ) -> Vec<R>
    where
        T: Sync,
        R: Send,
    {
        partitions.iter().enumerate().map(|(i, p)| f(i, p)).collect()
    }
}
