//! Element registry for gridkernel.
//!
//! Owns the global element namespace of one process: creates elements,
//! places them on virtual processes, stores each thread's instances in a
//! [`SparseNodeArray`], and runs fault-tolerant lifecycle sweeps over them.
//!
//! # Architecture
//!
//! ```text
//! create(model, n) ──► VpAssignment ──► SparseNodeArray (per thread)
//!                                            │
//! prepare / finalize / cleanup ──► Dispatch ─┘  (one partition per thread)
//!                                            │
//!                        ThreadSweep per thread ──► SweepReport (after join)
//! ```
//!
//! Elements themselves are opaque: anything implementing [`Element`] can be
//! registered as a model in a [`ModelRegistry`].

mod element;
mod error;
mod model;
mod node;
mod property;
mod registry;
mod sparse_node_array;
mod sweep;

pub use element::{Element, ElementClone, Mutability, PrepareContext};
pub use error::{
    ElementFault, NodeFault, PropertyError, RegistryError, SweepFaults, SweepPhase,
};
pub use model::{ElementFactory, ModelEntry, ModelRegistry};
pub use node::{Node, NodeState, Proxy, Slot};
pub use property::{properties, PropertyAccess, PropertyMap, PropertyValue};
pub use registry::ElementRegistry;
pub use sparse_node_array::SparseNodeArray;
pub use sweep::SweepReport;
