//! Dispatch trait for fork-join sweeps over per-thread partitions.
//!
//! This crate defines the [`Dispatch`] trait used by the element registry to
//! run lifecycle sweeps. Each worker thread owns one partition (its local
//! element store); a sweep hands every partition to one worker, waits for all
//! of them at a join barrier, and returns the per-partition results in
//! partition order:
//!
//! - [`SyncDispatch`](https://docs.rs/gridkernel-dispatch-sync) runs partitions inline, in order (deterministic tests)
//! - [`PooledDispatch`](https://docs.rs/gridkernel-dispatch-pooled) uses a rayon thread pool (production)
//!
//! Workers never share mutable state during a sweep. Anything a worker needs
//! to report (a count, a list of faults) travels back as its return value and
//! is reduced by the caller after the join.

/// Trait for running one closure per partition, potentially in parallel.
pub trait Dispatch: Send + Sync {
    /// Number of partitions this dispatcher can work on concurrently.
    fn parallelism(&self) -> usize;

    /// Apply `f` to every partition with exclusive access, then join.
    ///
    /// `f` receives the partition index and the partition. The result vector
    /// is in partition order regardless of completion order.
    ///
    /// This is a **blocking** call: it returns when all partitions are processed.
    fn map_partitions_mut<T, R>(
        &self,
        partitions: &mut [T],
        f: impl Fn(usize, &mut T) -> R + Send + Sync,
    ) -> Vec<R>
    where
        T: Send,
        R: Send;

    /// Apply `f` to every partition with shared access, then join.
    ///
    /// Same semantics as `map_partitions_mut` for read-only sweeps.
    fn map_partitions<T, R>(
        &self,
        partitions: &[T],
        f: impl Fn(usize, &T) -> R + Send + Sync,
    ) -> Vec<R>
    where
        T: Sync,
        R: Send;
}
