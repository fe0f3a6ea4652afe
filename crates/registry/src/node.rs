//! Hosted element instances and the slots lookups return.

use crate::Element;
use gridkernel_types::{Category, Gid, LocalId, ModelId, Vp};
use std::fmt;

/// Lifecycle state of one element instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Created,
    Initialized,
    Active,
    Finalized,
}

impl NodeState {
    /// Whether structural properties may still be written.
    pub fn allows_structural_writes(self) -> bool {
        matches!(self, NodeState::Created | NodeState::Initialized)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Created => "created",
            NodeState::Initialized => "initialized",
            NodeState::Active => "active",
            NodeState::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// One element instance hosted by one thread.
#[derive(Clone)]
pub struct Node {
    gid: Gid,
    model: ModelId,
    category: Category,
    vp: Vp,
    local_id: LocalId,
    state: NodeState,
    frozen: bool,
    element: Box<dyn Element>,
}

impl Node {
    pub(crate) fn new(
        gid: Gid,
        model: ModelId,
        category: Category,
        vp: Vp,
        element: Box<dyn Element>,
    ) -> Self {
        Self {
            gid,
            model,
            category,
            vp,
            local_id: LocalId(0),
            state: NodeState::Created,
            frozen: false,
            element,
        }
    }

    pub fn gid(&self) -> Gid {
        self.gid
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// The VP hosting this instance.
    pub fn vp(&self) -> Vp {
        self.vp
    }

    /// Index of this instance in its thread's node array.
    pub fn local_id(&self) -> LocalId {
        self.local_id
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn element(&self) -> &dyn Element {
        self.element.as_ref()
    }

    /// Direct access for per-step logic. Property writes go through the registry.
    pub fn element_mut(&mut self) -> &mut dyn Element {
        self.element.as_mut()
    }

    /// Mark the instance as stepping. Only an initialized instance can start.
    pub fn activate(&mut self) -> bool {
        if self.state == NodeState::Initialized {
            self.state = NodeState::Active;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_local_id(&mut self, local_id: LocalId) {
        self.local_id = local_id;
    }

    pub(crate) fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    pub(crate) fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub(crate) fn replace_element(&mut self, element: Box<dyn Element>) {
        self.element = element;
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("gid", &self.gid)
            .field("model", &self.model)
            .field("category", &self.category)
            .field("vp", &self.vp)
            .field("local_id", &self.local_id)
            .field("state", &self.state)
            .field("frozen", &self.frozen)
            .finish_non_exhaustive()
    }
}

/// Placeholder for an element that lives elsewhere. Carries no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proxy {
    pub gid: Gid,
    pub model: ModelId,
    /// VP holding the instance a lookup would have returned.
    pub home: Vp,
}

/// Result of a registry lookup.
#[derive(Debug, Clone, Copy)]
pub enum Slot<'a> {
    Local(&'a Node),
    Proxy(Proxy),
}

impl<'a> Slot<'a> {
    pub fn gid(&self) -> Gid {
        match self {
            Slot::Local(node) => node.gid(),
            Slot::Proxy(proxy) => proxy.gid,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Slot::Local(_))
    }

    pub fn node(&self) -> Option<&'a Node> {
        match self {
            Slot::Local(node) => Some(*node),
            Slot::Proxy(_) => None,
        }
    }
}
