//! Ordered, duplicate-free collections of element identifiers.
//!
//! A [`GidCollection`] is what element creation hands back. A single batch
//! yields one contiguous [`GidRange`]; concatenating batches of different
//! models (or slicing with a stride) yields a composite collection made of
//! several ranges. The representation is kept canonical: ranges are sorted,
//! disjoint, and adjacent ranges of the same model are merged, so two
//! collections naming the same elements compare equal however they were built.

use crate::{Gid, ModelId};
use thiserror::Error;

/// Errors from building or indexing a [`GidCollection`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("collection must contain at least one element")]
    Empty,

    #[error("GIDs must be strictly increasing, found {found} after {previous}")]
    NotSorted { previous: Gid, found: Gid },

    #[error("GID {0} does not name an existing element")]
    UnknownGid(Gid),

    #[error("collections overlap at GID {0}")]
    Overlap(Gid),

    #[error("index {index} out of range for collection of {len} elements")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid slice [{start}:{end}:{step}] for collection of {len} elements")]
    InvalidSlice {
        start: usize,
        end: usize,
        step: usize,
        len: usize,
    },
}

/// Inclusive run of consecutive GIDs sharing one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GidRange {
    pub first: Gid,
    pub last: Gid,
    pub model: ModelId,
}

impl GidRange {
    /// Range `first..=first + count - 1`. `count` must be at least 1.
    pub fn with_count(first: Gid, count: u64, model: ModelId) -> Self {
        debug_assert!(count >= 1);
        Self {
            first,
            last: Gid(first.0 + count.saturating_sub(1)),
            model,
        }
    }

    pub fn len(&self) -> usize {
        (self.last.0 - self.first.0 + 1) as usize
    }

    /// Ranges are never empty; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, gid: Gid) -> bool {
        self.first <= gid && gid <= self.last
    }

    pub fn iter(&self) -> impl Iterator<Item = Gid> {
        (self.first.0..=self.last.0).map(Gid)
    }
}

/// Sorted, duplicate-free set of GIDs with their models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GidCollection {
    parts: Vec<GidRange>,
}

impl From<GidRange> for GidCollection {
    fn from(range: GidRange) -> Self {
        Self { parts: vec![range] }
    }
}

impl GidCollection {
    /// Build a collection from explicit GIDs.
    ///
    /// `gids` must be strictly increasing. `model_of` resolves each GID to its
    /// model and returns `None` for GIDs that were never created.
    pub fn from_gids(
        gids: &[Gid],
        model_of: impl Fn(Gid) -> Option<ModelId>,
    ) -> Result<Self, CollectionError> {
        if gids.is_empty() {
            return Err(CollectionError::Empty);
        }
        let mut entries = Vec::with_capacity(gids.len());
        let mut previous: Option<Gid> = None;
        for &gid in gids {
            if let Some(prev) = previous {
                if gid <= prev {
                    return Err(CollectionError::NotSorted {
                        previous: prev,
                        found: gid,
                    });
                }
            }
            let model = model_of(gid).ok_or(CollectionError::UnknownGid(gid))?;
            entries.push((gid, model));
            previous = Some(gid);
        }
        Ok(Self::from_sorted_entries(entries))
    }

    /// Caller guarantees `entries` is non-empty and strictly increasing by GID.
    fn from_sorted_entries(entries: impl IntoIterator<Item = (Gid, ModelId)>) -> Self {
        let mut parts: Vec<GidRange> = Vec::new();
        for (gid, model) in entries {
            match parts.last_mut() {
                Some(run) if run.model == model && run.last.next() == gid => run.last = gid,
                _ => parts.push(GidRange {
                    first: gid,
                    last: gid,
                    model,
                }),
            }
        }
        Self { parts }
    }

    /// The canonical runs making up this collection.
    pub fn parts(&self) -> &[GidRange] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.iter().map(GidRange::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Whether the collection is a single run of one model.
    pub fn is_primitive(&self) -> bool {
        self.parts.len() == 1
    }

    pub fn first(&self) -> Option<Gid> {
        self.parts.first().map(|r| r.first)
    }

    pub fn last(&self) -> Option<Gid> {
        self.parts.last().map(|r| r.last)
    }

    /// GID at position `index` in ascending order.
    pub fn get(&self, index: usize) -> Result<Gid, CollectionError> {
        let mut remaining = index;
        for run in &self.parts {
            if remaining < run.len() {
                return Ok(Gid(run.first.0 + remaining as u64));
            }
            remaining -= run.len();
        }
        Err(CollectionError::IndexOutOfRange {
            index,
            len: self.len(),
        })
    }

    fn run_containing(&self, gid: Gid) -> Option<&GidRange> {
        let idx = self.parts.partition_point(|r| r.last < gid);
        self.parts.get(idx).filter(|r| r.contains(gid))
    }

    pub fn contains(&self, gid: Gid) -> bool {
        self.run_containing(gid).is_some()
    }

    /// Model of a member GID, or `None` if the GID is not in the collection.
    pub fn model_of(&self, gid: Gid) -> Option<ModelId> {
        self.run_containing(gid).map(|r| r.model)
    }

    /// Member GIDs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Gid> + '_ {
        self.parts.iter().flat_map(GidRange::iter)
    }

    /// Member GIDs paired with their models, in ascending GID order.
    pub fn entries(&self) -> impl Iterator<Item = (Gid, ModelId)> + '_ {
        self.parts
            .iter()
            .flat_map(|r| r.iter().map(move |gid| (gid, r.model)))
    }

    /// Union of two disjoint collections.
    ///
    /// Fails with [`CollectionError::Overlap`] if any GID appears in both.
    pub fn concat(&self, other: &GidCollection) -> Result<GidCollection, CollectionError> {
        let mut runs: Vec<GidRange> = self.parts.iter().chain(&other.parts).copied().collect();
        runs.sort_by_key(|r| r.first);
        for pair in runs.windows(2) {
            if pair[1].first <= pair[0].last {
                return Err(CollectionError::Overlap(pair[1].first));
            }
        }
        Ok(Self::from_sorted_entries(
            runs.iter()
                .flat_map(|r| r.iter().map(move |gid| (gid, r.model))),
        ))
    }

    /// Elements at positions `start, start + step, ...` below `end`.
    pub fn slice(
        &self,
        start: usize,
        end: usize,
        step: usize,
    ) -> Result<GidCollection, CollectionError> {
        let len = self.len();
        if step == 0 || start >= end || end > len {
            return Err(CollectionError::InvalidSlice {
                start,
                end,
                step,
                len,
            });
        }
        Ok(Self::from_sorted_entries(
            self.entries().skip(start).take(end - start).step_by(step),
        ))
    }
}

impl<'a> IntoIterator for &'a GidCollection {
    type Item = Gid;
    type IntoIter = Box<dyn Iterator<Item = Gid> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALPHA: ModelId = ModelId(0);
    const EXP: ModelId = ModelId(1);

    fn batch(first: u64, count: u64, model: ModelId) -> GidCollection {
        GidRange::with_count(Gid(first), count, model).into()
    }

    #[test]
    fn test_range_iteration_and_indexing() {
        let nodes = batch(1, 5, ALPHA);
        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes.iter().collect::<Vec<_>>(), (1..=5).map(Gid).collect::<Vec<_>>());
        assert_eq!(nodes.get(0).unwrap(), Gid(1));
        assert_eq!(nodes.get(4).unwrap(), Gid(5));
        assert_eq!(
            nodes.get(5),
            Err(CollectionError::IndexOutOfRange { index: 5, len: 5 })
        );
    }

    #[test]
    fn test_from_gids_matches_created_range() {
        let created = batch(1, 10, ALPHA);
        let gids: Vec<Gid> = created.iter().collect();
        let rebuilt = GidCollection::from_gids(&gids, |g| created.model_of(g)).unwrap();
        assert_eq!(created, rebuilt);
        assert!(rebuilt.is_primitive());
    }

    #[test]
    fn test_from_gids_rejects_unsorted_and_unknown() {
        let created = batch(1, 10, ALPHA);
        let err = GidCollection::from_gids(&[Gid(3), Gid(2)], |g| created.model_of(g));
        assert_eq!(
            err,
            Err(CollectionError::NotSorted {
                previous: Gid(3),
                found: Gid(2)
            })
        );

        let err = GidCollection::from_gids(&[Gid(9), Gid(11)], |g| created.model_of(g));
        assert_eq!(err, Err(CollectionError::UnknownGid(Gid(11))));

        let err = GidCollection::from_gids(&[], |g| created.model_of(g));
        assert_eq!(err, Err(CollectionError::Empty));
    }

    #[test]
    fn test_sparse_selection() {
        let created = batch(1, 10, ALPHA);
        let picked = [2, 3, 5, 7, 8].map(Gid);
        let gc = GidCollection::from_gids(&picked, |g| created.model_of(g)).unwrap();
        assert_eq!(gc.iter().collect::<Vec<_>>(), picked.to_vec());
        assert_eq!(gc.parts().len(), 3);
    }

    #[test]
    fn test_concat_sorts_and_rejects_overlap() {
        let a = batch(1, 2, ALPHA);
        let b = batch(3, 2, ALPHA);
        let c = batch(5, 3, EXP);

        let ba = b.concat(&a).unwrap();
        assert_eq!(ba.iter().map(|g| g.0).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        // Adjacent runs of one model merge back into a primitive collection.
        assert!(ba.is_primitive());

        let all = ba.concat(&c).unwrap();
        assert_eq!(all.len(), 7);
        assert!(!all.is_primitive());
        assert_eq!(all.model_of(Gid(6)), Some(EXP));
        assert_eq!(all.model_of(Gid(2)), Some(ALPHA));

        assert_eq!(a.concat(&batch(2, 3, EXP)), Err(CollectionError::Overlap(Gid(2))));
    }

    #[test]
    fn test_slicing() {
        let n = batch(1, 10, ALPHA);
        let ids = |c: GidCollection| c.iter().map(|g| g.0).collect::<Vec<_>>();

        assert_eq!(ids(n.slice(0, 5, 1).unwrap()), vec![1, 2, 3, 4, 5]);
        assert_eq!(ids(n.slice(2, 7, 1).unwrap()), vec![3, 4, 5, 6, 7]);
        assert_eq!(ids(n.slice(0, 10, 2).unwrap()), vec![1, 3, 5, 7, 9]);
        assert_eq!(ids(n.slice(1, 6, 3).unwrap()), vec![2, 5]);
        assert_eq!(ids(n.slice(5, 10, 1).unwrap()), vec![6, 7, 8, 9, 10]);

        assert!(n.slice(0, 5, 0).is_err());
        assert!(n.slice(5, 5, 1).is_err());
        assert!(n.slice(0, 11, 1).is_err());
    }

    #[test]
    fn test_composite_membership_and_indexing() {
        let a = batch(1, 10, ALPHA);
        let b = batch(11, 15, EXP);
        let c = batch(26, 30, ModelId(2));
        let nodes = a.concat(&b).unwrap().concat(&c).unwrap();
        let strided = nodes.slice(4, 55, 10).unwrap();

        assert_eq!(
            strided.iter().map(|g| g.0).collect::<Vec<_>>(),
            vec![5, 15, 25, 35, 45, 55]
        );
        assert!(strided.contains(Gid(45)));
        assert!(!strided.contains(Gid(6)));
        assert!(!strided.contains(Gid(56)));
        assert_eq!(strided.get(2).unwrap(), Gid(25));
        assert_eq!(strided.first(), Some(Gid(5)));
        assert_eq!(strided.last(), Some(Gid(55)));
    }
}
