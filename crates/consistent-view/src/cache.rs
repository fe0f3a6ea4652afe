//! Caller-owned cache of gathered positions.
//!
//! Building a consistent view costs a collective round, so consumers that
//! repeatedly look up the same layer keep the result here. The cache holds
//! one layer at a time and is only invalidated explicitly.

use crate::record::ViewRecord;
use gridkernel_types::Gid;
use std::collections::BTreeMap;
use tracing::debug;

/// Identifies the layer (or any GID collection) a cached view was built for.
pub type LayerId = u64;

/// Canonical view of one layer, as an ordered sequence, an index, or both.
pub struct PositionCache<P, I = BTreeMap<Gid, P>> {
    layer: Option<LayerId>,
    sequence: Option<Vec<ViewRecord<P>>>,
    index: Option<I>,
}

impl<P, I> std::fmt::Debug for PositionCache<P, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionCache")
            .field("layer", &self.layer)
            .field("sequence", &self.sequence.as_ref().map(Vec::len))
            .field("index", &self.index.is_some())
            .finish()
    }
}

impl<P, I> Default for PositionCache<P, I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, I> PositionCache<P, I> {
    pub fn new() -> Self {
        Self {
            layer: None,
            sequence: None,
            index: None,
        }
    }

    /// Layer whose view is currently cached.
    pub fn cached_layer(&self) -> Option<LayerId> {
        self.layer
    }

    /// The GID-ordered view of `layer`, built with `build` on a miss.
    ///
    /// A failed build leaves nothing cached for the layer.
    pub fn sequence<E, F>(&mut self, layer: LayerId, build: F) -> Result<&[ViewRecord<P>], E>
    where
        F: FnOnce() -> Result<Vec<ViewRecord<P>>, E>,
    {
        self.select(layer);
        let records = match self.sequence.take() {
            Some(records) => records,
            None => {
                let records = build()?;
                debug!(layer, records = records.len(), "Cached position sequence");
                records
            }
        };
        Ok(self.sequence.insert(records).as_slice())
    }

    /// The spatial index for `layer`, built with `build` on a miss.
    pub fn index<E, F>(&mut self, layer: LayerId, build: F) -> Result<&I, E>
    where
        F: FnOnce() -> Result<I, E>,
    {
        self.select(layer);
        let index = match self.index.take() {
            Some(index) => index,
            None => {
                let index = build()?;
                debug!(layer, "Cached position index");
                index
            }
        };
        let index: &I = self.index.insert(index);
        Ok(index)
    }

    /// Drop the cached view if it belongs to `layer`.
    ///
    /// Returns whether anything was dropped.
    pub fn invalidate(&mut self, layer: LayerId) -> bool {
        if self.layer == Some(layer) {
            self.clear();
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.layer = None;
        self.sequence = None;
        self.index = None;
    }

    fn select(&mut self, layer: LayerId) {
        if self.layer != Some(layer) {
            if let Some(previous) = self.layer {
                debug!(previous, layer, "Replacing cached layer");
            }
            self.clear();
            self.layer = Some(layer);
        }
    }
}
