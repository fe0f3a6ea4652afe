//! Core types for the gridkernel element registry.
//!
//! This crate provides the foundational types used throughout the workspace:
//!
//! - **Identifiers**: [`Gid`], [`Rank`], [`ThreadIndex`], [`Vp`], [`VpIndex`], [`ModelId`], [`LocalId`]
//! - **Placement vocabulary**: [`Category`]
//! - **Collections**: [`GidCollection`], the value returned by element creation
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend on
//! any other workspace crates, making it the foundation layer.

mod collection;
mod identifiers;

pub use collection::{CollectionError, GidCollection, GidRange};
pub use identifiers::{Category, Gid, LocalId, ModelId, Rank, ThreadIndex, Vp, VpIndex};
