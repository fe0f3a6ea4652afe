//! Distributed consistent views over element payloads.
//!
//! Each process knows a partial GID → payload mapping (its locally hosted
//! elements). A [`ConsistentView`] turns those partial mappings into one
//! GID-ordered, duplicate-free sequence that is identical on every process.
//!
//! # Protocol
//!
//! ```text
//! local records ──► encode (fixed layout, LE) ──► all_gather
//!                                                     │
//!        canonical view ◄── dedup / conflicts ◄── sort (gid, rank) ◄── decode
//!              │
//!              └──► SpatialIndex  or  Vec sorted by GID
//! ```
//!
//! Duplicates are expected: replicated and external elements are known to
//! several processes. Two different payloads for one GID are a conflict,
//! handled per [`ConflictPolicy`]. A record layout mismatch between ranks is
//! a protocol violation and aborts the collective group.

mod cache;
mod config;
mod error;
mod record;
mod source;
mod view;

pub use cache::{LayerId, PositionCache};
pub use config::{ConflictPolicy, ViewConfig};
pub use error::ViewError;
pub use record::{
    encode_contribution, record_len, Payload, ViewRecord, GID_LEN, HEADER_LEN, MAGIC,
};
pub use source::local_records;
pub use view::{ConsistentView, SpatialIndex};
