//! Test helpers for gridkernel: element models and a multi-process harness.
//!
//! [`SimulatedGrid`] stands up one [`ElementRegistry`] per rank, wired
//! together by a [`MemoryCollective`] group, and runs SPMD closures with one
//! OS thread per rank. It also answers cluster-wide questions no single
//! process can, such as which VPs host a GID.
//!
//! # Example
//!
//! ```rust
//! use gridkernel_test_helpers::{models, SimulatedGrid};
//! use gridkernel_types::Gid;
//!
//! let mut grid = SimulatedGrid::new(2, 2, models::standard_models);
//! grid.create("recorder", 1).unwrap();
//!
//! // One replica on every VP of the cluster.
//! assert_eq!(grid.siblings(Gid(1)).unwrap().len(), 4);
//! ```

pub mod models;

use gridkernel_collective::MemoryCollective;
use gridkernel_placement::GridConfig;
use gridkernel_registry::{ElementRegistry, ModelRegistry, Node, RegistryError};
use gridkernel_types::{Gid, GidCollection, Rank, ThreadIndex, Vp};
use std::thread;

/// P registries, one per simulated process, sharing one collective group.
pub struct SimulatedGrid {
    registries: Vec<ElementRegistry>,
    collectives: Vec<MemoryCollective>,
}

impl std::fmt::Debug for SimulatedGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedGrid")
            .field("processes", &self.registries.len())
            .field("threads", &self.threads_per_process())
            .finish()
    }
}

impl SimulatedGrid {
    /// Create a grid of `processes` × `threads` VPs.
    ///
    /// `models` is called once per rank so every registry gets its own copy.
    pub fn new(processes: usize, threads: usize, models: impl Fn() -> ModelRegistry) -> Self {
        let base = GridConfig::builder()
            .num_processes(processes)
            .threads_per_process(threads)
            .build()
            .expect("grid shape must be valid");

        let registries = (0..processes)
            .map(|r| {
                ElementRegistry::new(base.for_rank(Rank(r)), models())
                    .expect("per-rank config is valid")
            })
            .collect();

        Self {
            registries,
            collectives: MemoryCollective::group(processes),
        }
    }

    pub fn num_processes(&self) -> usize {
        self.registries.len()
    }

    pub fn threads_per_process(&self) -> usize {
        self.registries
            .first()
            .map_or(0, |r| r.config().threads_per_process)
    }

    pub fn registry(&self, rank: Rank) -> &ElementRegistry {
        &self.registries[rank.0]
    }

    pub fn registry_mut(&mut self, rank: Rank) -> &mut ElementRegistry {
        &mut self.registries[rank.0]
    }

    pub fn registries(&self) -> &[ElementRegistry] {
        &self.registries
    }

    /// Run `f` on every rank concurrently, one OS thread each.
    ///
    /// Results are returned in rank order. `f` may call collectives.
    pub fn run<R, F>(&mut self, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&mut ElementRegistry, &MemoryCollective) -> R + Send + Sync,
    {
        let f = &f;
        thread::scope(|s| {
            let handles: Vec<_> = self
                .registries
                .iter_mut()
                .zip(&self.collectives)
                .map(|(registry, collective)| s.spawn(move || f(registry, collective)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("rank thread panicked"))
                .collect()
        })
    }

    /// Create on every rank, as an SPMD program would.
    ///
    /// Returns the collection every rank agreed on.
    pub fn create(&mut self, model: &str, count: u64) -> Result<GidCollection, RegistryError> {
        let mut collections = self
            .registries
            .iter_mut()
            .map(|r| r.create(model, count))
            .collect::<Result<Vec<_>, _>>()?;
        let first = collections.swap_remove(0);
        assert!(
            collections.iter().all(|c| *c == first),
            "ranks disagree on created GIDs"
        );
        Ok(first)
    }

    pub fn ensure_valid_thread_local_ids(&mut self) {
        for registry in &mut self.registries {
            registry.ensure_valid_thread_local_ids();
        }
    }

    /// Every VP holding an instance of `gid`, in VP order.
    pub fn owners_of(&self, gid: Gid) -> Vec<Vp> {
        let mut owners: Vec<Vp> = self
            .registries
            .iter()
            .flat_map(|registry| {
                (0..registry.num_threads()).filter_map(move |t| {
                    registry
                        .get(gid, Some(ThreadIndex(t)))
                        .ok()
                        .and_then(|slot| slot.node())
                        .map(Node::vp)
                })
            })
            .collect();
        if let Some(registry) = self.registries.first() {
            let assignment = registry.assignment();
            owners.sort_by_key(|vp| assignment.to_index(*vp));
        }
        owners
    }

    /// The replicas of a Device element across the whole grid, one per VP, in VP order.
    pub fn siblings(&self, gid: Gid) -> Result<Vec<&Node>, RegistryError> {
        let mut siblings = Vec::new();
        for registry in &self.registries {
            siblings.extend(registry.get_siblings(gid)?);
        }
        if let Some(registry) = self.registries.first() {
            let assignment = registry.assignment();
            siblings.sort_by_key(|node| assignment.to_index(node.vp()));
        }
        Ok(siblings)
    }
}
