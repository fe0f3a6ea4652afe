//! Pure placement function.
//!
//! VP numbering interleaves ranks: `vp = thread * P + rank`. Consecutive
//! ordinals therefore alternate between processes before they alternate
//! between threads, which spreads every batch evenly over the whole grid.

use crate::GridConfig;
use gridkernel_types::{Category, Rank, ThreadIndex, Vp, VpIndex};

/// Where an element lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Exactly one VP holds the element.
    Single(Vp),
    /// Every VP holds an independent instance.
    Replicated,
}

/// Which threads of one process must host an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadHosting {
    /// The element lives on another process.
    None,
    /// One thread of this process hosts it.
    One(ThreadIndex),
    /// Every thread of this process hosts an instance.
    All,
}

/// Stateless mapping from (creation ordinal, category) to virtual processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VpAssignment {
    num_processes: usize,
    threads_per_process: usize,
}

impl VpAssignment {
    /// Caller must supply a validated grid shape.
    pub fn new(num_processes: usize, threads_per_process: usize) -> Self {
        debug_assert!(num_processes >= 1 && threads_per_process >= 1);
        Self {
            num_processes,
            threads_per_process,
        }
    }

    pub fn from_config(config: &GridConfig) -> Self {
        Self::new(config.num_processes, config.threads_per_process)
    }

    pub fn num_processes(&self) -> usize {
        self.num_processes
    }

    pub fn threads_per_process(&self) -> usize {
        self.threads_per_process
    }

    pub fn num_vps(&self) -> usize {
        self.num_processes * self.threads_per_process
    }

    /// Round-robin VP for a `Normal` element.
    pub fn vp_for_ordinal(&self, ordinal: u64) -> VpIndex {
        VpIndex((ordinal % self.num_vps() as u64) as usize)
    }

    pub fn vp_to_rank(&self, vp: VpIndex) -> Rank {
        Rank(vp.0 % self.num_processes)
    }

    pub fn vp_to_thread(&self, vp: VpIndex) -> ThreadIndex {
        ThreadIndex(vp.0 / self.num_processes)
    }

    pub fn to_vp(&self, vp: VpIndex) -> Vp {
        Vp::new(self.vp_to_rank(vp), self.vp_to_thread(vp))
    }

    pub fn to_index(&self, vp: Vp) -> VpIndex {
        VpIndex(vp.thread.0 * self.num_processes + vp.rank.0)
    }

    /// Every VP in ascending linear order.
    pub fn all_vps(&self) -> impl Iterator<Item = Vp> + '_ {
        (0..self.num_vps()).map(move |i| self.to_vp(VpIndex(i)))
    }

    /// Placement of the element created at `ordinal`.
    pub fn placement(&self, ordinal: u64, category: Category) -> Placement {
        match category {
            Category::Normal => Placement::Single(self.to_vp(self.vp_for_ordinal(ordinal))),
            Category::Device => Placement::Replicated,
            Category::External => Placement::Single(Vp::ORIGIN),
        }
    }

    /// The single VP that answers for an element.
    ///
    /// For replicated elements this is the instance on the VP the ordinal
    /// maps to, so callers that need one logical instance agree on which.
    pub fn authoritative_vp(&self, ordinal: u64, category: Category) -> Vp {
        match self.placement(ordinal, category) {
            Placement::Single(vp) => vp,
            Placement::Replicated => self.to_vp(self.vp_for_ordinal(ordinal)),
        }
    }

    /// Threads of process `rank` that must host the element.
    pub fn threads_hosting(&self, ordinal: u64, category: Category, rank: Rank) -> ThreadHosting {
        match self.placement(ordinal, category) {
            Placement::Replicated => ThreadHosting::All,
            Placement::Single(vp) if vp.rank == rank => ThreadHosting::One(vp.thread),
            Placement::Single(_) => ThreadHosting::None,
        }
    }

    /// Whether `vp` hosts an instance of the element.
    pub fn hosts(&self, ordinal: u64, category: Category, vp: Vp) -> bool {
        match self.threads_hosting(ordinal, category, vp.rank) {
            ThreadHosting::None => false,
            ThreadHosting::One(thread) => thread == vp.thread,
            ThreadHosting::All => true,
        }
    }
}
