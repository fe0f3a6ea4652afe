//! Rayon thread pool dispatch for production runs.
//!
//! This module provides [`PooledDispatch`] which runs per-thread sweeps on a
//! dedicated rayon pool sized to the number of worker threads of the process.
//!
//! # Example
//!
//! ```no_run
//! use gridkernel_dispatch_pooled::{PooledDispatch, ThreadPoolConfig};
//!
//! // One pool thread per available core
//! let dispatch = PooledDispatch::new(ThreadPoolConfig::auto()).unwrap();
//!
//! // Or match the grid's threads-per-process
//! let config = ThreadPoolConfig::builder()
//!     .worker_threads(4)
//!     .build()
//!     .unwrap();
//! let dispatch = PooledDispatch::new(config).unwrap();
//! ```

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

use gridkernel_dispatch::Dispatch;

/// Errors from thread pool configuration.
#[derive(Debug, Error)]
pub enum ThreadPoolError {
    #[error("Failed to build rayon thread pool: {0}")]
    RayonBuildError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration for the sweep thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of pool threads. Usually the grid's threads-per-process.
    pub worker_threads: usize,

    /// Stack size for pool threads (bytes). Default: 4MB.
    pub stack_size: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self::auto()
    }
}

impl ThreadPoolConfig {
    /// One pool thread per available core.
    pub fn auto() -> Self {
        let available = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(4);

        Self::for_threads(available)
    }

    /// Pool sized for an explicit number of worker threads.
    pub fn for_threads(worker_threads: usize) -> Self {
        Self {
            worker_threads,
            stack_size: 4 * 1024 * 1024,
        }
    }

    /// Create a minimal configuration for testing (1 thread).
    pub fn minimal() -> Self {
        Self::for_threads(1)
    }

    /// Create a builder for custom configuration.
    pub fn builder() -> ThreadPoolConfigBuilder {
        ThreadPoolConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ThreadPoolError> {
        if self.worker_threads == 0 {
            return Err(ThreadPoolError::InvalidConfig(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.stack_size < 64 * 1024 {
            return Err(ThreadPoolError::InvalidConfig(format!(
                "stack_size of {} bytes is below the 64KiB minimum",
                self.stack_size
            )));
        }
        Ok(())
    }
}

/// Builder for ThreadPoolConfig.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfigBuilder {
    config: ThreadPoolConfig,
}

impl ThreadPoolConfigBuilder {
    /// Create a new builder with auto-detected defaults.
    pub fn new() -> Self {
        Self {
            config: ThreadPoolConfig::auto(),
        }
    }

    /// Set the number of pool threads.
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set stack size for pool threads.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = size;
        self
    }

    /// Build the configuration, validating it first.
    pub fn build(self) -> Result<ThreadPoolConfig, ThreadPoolError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build the configuration without validation.
    pub fn build_unchecked(self) -> ThreadPoolConfig {
        self.config
    }
}

impl Default for ThreadPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Rayon thread pool dispatch.
///
/// Owns a dedicated pool so sweeps never compete with the global rayon pool.
/// Every sweep runs inside `rayon::ThreadPool::install()`, so nested `par_iter`
/// calls made by element hooks also stay on this pool.
pub struct PooledDispatch {
    config: ThreadPoolConfig,
    pool: Arc<rayon::ThreadPool>,
    sweeps_in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for PooledDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledDispatch")
            .field("config", &self.config)
            .field("sweeps_in_flight", &self.sweeps_in_flight())
            .finish()
    }
}

impl PooledDispatch {
    /// Create a new pooled dispatch with the given configuration.
    pub fn new(config: ThreadPoolConfig) -> Result<Self, ThreadPoolError> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .stack_size(config.stack_size)
            .thread_name(|i| format!("vp-worker-{}", i))
            .build()
            .map_err(|e| ThreadPoolError::RayonBuildError(e.to_string()))?;

        tracing::info!(
            worker_threads = config.worker_threads,
            stack_size = config.stack_size,
            "Sweep thread pool initialized"
        );

        Ok(Self {
            config,
            pool: Arc::new(pool),
            sweeps_in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Create with auto-detected configuration.
    pub fn auto() -> Result<Self, ThreadPoolError> {
        Self::new(ThreadPoolConfig::auto())
    }

    /// Get the configuration.
    pub fn config(&self) -> &ThreadPoolConfig {
        &self.config
    }

    /// Number of sweeps currently executing on the pool.
    pub fn sweeps_in_flight(&self) -> usize {
        self.sweeps_in_flight.load(Ordering::Relaxed)
    }
}

impl Dispatch for PooledDispatch {
    fn parallelism(&self) -> usize {
        self.config.worker_threads
    }

    #[instrument(level = "debug", skip_all, fields(partitions = partitions.len()))]
    fn map_partitions_mut<T, R>(
        &self,
        partitions: &mut [T],
        f: impl Fn(usize, &mut T) -> R + Send + Sync,
    ) -> Vec<R>
    where
        T: Send,
        R: Send,
    {
        self.sweeps_in_flight.fetch_add(1, Ordering::Relaxed);
        let results = self.pool.install(|| {
            use rayon::prelude::*;
            partitions
                .par_iter_mut()
                .enumerate()
                .map(|(i, p)| f(i, p))
                .collect()
        });
        self.sweeps_in_flight.fetch_sub(1, Ordering::Relaxed);
        results
    }

    #[instrument(level = "debug", skip_all, fields(partitions = partitions.len()))]
    fn map_partitions<T, R>(
        &self,
        partitions: &[T],
        f: impl Fn(usize, &T) -> R + Send + Sync,
    ) -> Vec<R>
    where
        T: Sync,
        R: Send,
    {
        self.sweeps_in_flight.fetch_add(1, Ordering::Relaxed);
        let results = self.pool.install(|| {
            use rayon::prelude::*;
            partitions
                .par_iter()
                .enumerate()
                .map(|(i, p)| f(i, p))
                .collect()
        });
        self.sweeps_in_flight.fetch_sub(1, Ordering::Relaxed);
        results
    }
}
