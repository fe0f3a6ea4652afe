//! Virtual-process grid configuration and element placement.
//!
//! A run is sharded over `P` processes × `T` worker threads per process.
//! Each (process, thread) pair is a virtual process (VP). This crate owns:
//!
//! - [`GridConfig`]: the grid shape, this process's rank and the RNG seed
//! - [`VpAssignment`]: the pure placement function mapping an element's
//!   creation ordinal and [`Category`](gridkernel_types::Category) to the VPs
//!   that host it
//!
//! Placement is stateless. Any process can compute the owner of any GID
//! without communicating.

mod assignment;
mod config;

pub use assignment::{Placement, ThreadHosting, VpAssignment};
pub use config::{ConfigError, GridConfig, GridConfigBuilder};
