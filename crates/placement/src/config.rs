//! Grid configuration.

use gridkernel_types::Rank;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from grid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Shape of the virtual-process grid as seen from one process.
///
/// # Example
///
/// ```
/// use gridkernel_placement::GridConfig;
/// use gridkernel_types::Rank;
///
/// let config = GridConfig::builder()
///     .num_processes(2)
///     .threads_per_process(4)
///     .rank(Rank(1))
///     .build()
///     .unwrap();
/// assert_eq!(config.num_vps(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Number of cooperating processes (`P`).
    pub num_processes: usize,

    /// Worker threads per process (`T`). Every process uses the same value.
    pub threads_per_process: usize,

    /// Rank of this process in `0..num_processes`.
    pub rank: Rank,

    /// Seed from which one random stream per VP is derived.
    pub rng_seed: u64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self::single_process(1)
    }
}

impl GridConfig {
    /// One process with `threads` workers.
    pub fn single_process(threads: usize) -> Self {
        Self {
            num_processes: 1,
            threads_per_process: threads,
            rank: Rank(0),
            rng_seed: 42,
        }
    }

    /// Create a builder starting from a single-threaded, single-process grid.
    pub fn builder() -> GridConfigBuilder {
        GridConfigBuilder::new()
    }

    /// Total number of virtual processes, `P · T`.
    pub fn num_vps(&self) -> usize {
        self.num_processes * self.threads_per_process
    }

    /// The same grid seen from another rank.
    pub fn for_rank(&self, rank: Rank) -> Self {
        Self {
            rank,
            ..self.clone()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_processes == 0 {
            return Err(ConfigError::Invalid(
                "num_processes must be at least 1".to_string(),
            ));
        }
        if self.threads_per_process == 0 {
            return Err(ConfigError::Invalid(
                "threads_per_process must be at least 1".to_string(),
            ));
        }
        if self.rank.0 >= self.num_processes {
            return Err(ConfigError::Invalid(format!(
                "rank {} is outside a grid of {} processes",
                self.rank, self.num_processes
            )));
        }
        Ok(())
    }
}

/// Builder for [`GridConfig`].
#[derive(Debug, Clone)]
pub struct GridConfigBuilder {
    config: GridConfig,
}

impl GridConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GridConfig::default(),
        }
    }

    pub fn num_processes(mut self, count: usize) -> Self {
        self.config.num_processes = count;
        self
    }

    pub fn threads_per_process(mut self, count: usize) -> Self {
        self.config.threads_per_process = count;
        self
    }

    pub fn rank(mut self, rank: Rank) -> Self {
        self.config.rank = rank;
        self
    }

    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = seed;
        self
    }

    /// Build the configuration, validating it first.
    pub fn build(self) -> Result<GridConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build the configuration without validation.
    pub fn build_unchecked(self) -> GridConfig {
        self.config
    }
}

impl Default for GridConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
