//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Global identifier of a simulation element.
///
/// Assigned at creation in strictly increasing order starting from
/// [`Gid::FIRST`]. `Gid(0)` is reserved and never names an element.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Gid(pub u64);

impl Gid {
    /// The reserved identifier. No element ever carries it.
    pub const RESERVED: Gid = Gid(0);

    /// The first identifier handed out by a fresh registry.
    pub const FIRST: Gid = Gid(1);

    /// The identifier immediately after this one.
    pub fn next(self) -> Gid {
        Gid(self.0 + 1)
    }

    /// Whether this identifier can name an element.
    pub fn is_assignable(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rank of a process in the process grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Rank(pub usize);

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a worker thread within one process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ThreadIndex(pub usize);

impl fmt::Display for ThreadIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Linearized virtual process number in `0..num_vps`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct VpIndex(pub usize);

impl fmt::Display for VpIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vp{}", self.0)
    }
}

/// A virtual process: one worker thread on one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vp {
    pub rank: Rank,
    pub thread: ThreadIndex,
}

impl Vp {
    /// The virtual process every `External` element is pinned to.
    pub const ORIGIN: Vp = Vp {
        rank: Rank(0),
        thread: ThreadIndex(0),
    };

    pub fn new(rank: Rank, thread: ThreadIndex) -> Self {
        Self { rank, thread }
    }
}

impl fmt::Display for Vp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.rank, self.thread)
    }
}

/// Identifier of a registered element model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelId(pub u32);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}", self.0)
    }
}

/// Position of an element inside one thread's local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalId(pub usize);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Placement semantics of an element model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Lives on exactly one virtual process.
    Normal,
    /// Independently replicated on every virtual process.
    Device,
    /// Pinned to virtual process `(0, 0)`.
    External,
}

impl Category {
    /// Whether elements of this category have one instance per virtual process.
    pub fn is_replicated(self) -> bool {
        matches!(self, Category::Device)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Normal => "normal",
            Category::Device => "device",
            Category::External => "external",
        };
        f.write_str(name)
    }
}
