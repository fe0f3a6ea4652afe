//! Per-thread store of hosted element instances.
//!
//! Instances are appended in strictly increasing GID order and never move,
//! so a local id (the index into the array) stays valid for the whole run.
//! Only real local instances are stored; elements hosted elsewhere are
//! answered with a proxy by the registry and never occupy a slot.
//!
//! GID lookups estimate the index from the average GID stride between the
//! first and last hosted instance, then walk to the exact slot. Round-robin
//! placement gives a constant stride, so the estimate is usually exact.

use crate::{Node, RegistryError};
use gridkernel_types::{Gid, LocalId};

/// Append-only array of one thread's element instances.
#[derive(Debug, Clone, Default)]
pub struct SparseNodeArray {
    nodes: Vec<Node>,
    /// Highest GID this thread knows to exist, hosted or not.
    max_gid: Gid,
}

impl SparseNodeArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instance and return its local id.
    ///
    /// The caller appends in strictly increasing GID order.
    pub fn append(&mut self, mut node: Node) -> LocalId {
        debug_assert!(
            self.nodes.last().map_or(true, |last| last.gid() < node.gid()),
            "GIDs must be appended in increasing order"
        );
        let local_id = LocalId(self.nodes.len());
        node.set_local_id(local_id);
        self.max_gid = self.max_gid.max(node.gid());
        self.nodes.push(node);
        local_id
    }

    pub fn get(&self, local_id: LocalId) -> Result<&Node, RegistryError> {
        let len = self.nodes.len();
        self.nodes
            .get(local_id.0)
            .ok_or(RegistryError::OutOfRange { local_id, len })
    }

    pub fn get_mut(&mut self, local_id: LocalId) -> Result<&mut Node, RegistryError> {
        let len = self.nodes.len();
        self.nodes
            .get_mut(local_id.0)
            .ok_or(RegistryError::OutOfRange { local_id, len })
    }

    /// The hosted instance of `gid`, if this thread hosts one.
    pub fn get_by_gid(&self, gid: Gid) -> Option<&Node> {
        self.index_of(gid).map(|i| &self.nodes[i])
    }

    pub fn get_by_gid_mut(&mut self, gid: Gid) -> Option<&mut Node> {
        self.index_of(gid).map(move |i| &mut self.nodes[i])
    }

    fn index_of(&self, gid: Gid) -> Option<usize> {
        let first = self.nodes.first()?.gid();
        let last = self.nodes.last()?.gid();
        if gid < first || gid > last {
            return None;
        }

        let span = last.0 - first.0;
        let mut idx = if span == 0 {
            0
        } else {
            let scale = (self.nodes.len() - 1) as f64 / span as f64;
            (((gid.0 - first.0) as f64 * scale) as usize).min(self.nodes.len() - 1)
        };

        while self.nodes[idx].gid() > gid {
            idx -= 1;
        }
        while self.nodes[idx].gid() < gid {
            idx += 1;
        }
        (self.nodes[idx].gid() == gid).then_some(idx)
    }

    pub fn max_gid(&self) -> Gid {
        self.max_gid
    }

    /// Raise the known population size. Never lowers it.
    pub fn set_max_gid(&mut self, gid: Gid) {
        self.max_gid = self.max_gid.max(gid);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn as_slice(&self) -> &[Node] {
        &self.nodes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Node> {
        self.nodes.iter_mut()
    }

    /// Release every instance and forget the population size.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.max_gid = Gid::RESERVED;
    }
}
