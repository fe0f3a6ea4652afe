//! Gather, canonicalize, and deliver.

use crate::record::{decode_contribution, encode_contribution, Contributed, Payload, ViewRecord};
use crate::source::local_records;
use crate::{ConflictPolicy, ViewConfig, ViewError};
use gridkernel_collective::{Collective, CollectiveError, Gathered};
use gridkernel_dispatch::Dispatch;
use gridkernel_metrics as metrics;
use gridkernel_registry::{ElementRegistry, Node};
use gridkernel_types::{Gid, GidCollection, Rank};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, instrument, trace, warn};

/// Destination for canonical records keyed by GID.
pub trait SpatialIndex<P> {
    fn insert(&mut self, gid: Gid, payload: P);
}

impl<P> SpatialIndex<P> for BTreeMap<Gid, P> {
    fn insert(&mut self, gid: Gid, payload: P) {
        BTreeMap::insert(self, gid, payload);
    }
}

/// Turns each process's partial GID → payload knowledge into one canonical,
/// GID-ordered, duplicate-free sequence that is identical on every process.
///
/// Every participant must call the same gathering method with the same
/// payload type in the same order; each call is one collective round.
#[derive(Debug)]
pub struct ConsistentView<'c, C: ?Sized> {
    collective: &'c C,
    config: ViewConfig,
}

impl<'c, C: Collective + ?Sized> ConsistentView<'c, C> {
    pub fn new(collective: &'c C, config: ViewConfig) -> Self {
        Self { collective, config }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Exchange `local` with every participant and return the canonical view.
    ///
    /// Protocol violations (a record layout that differs between ranks, a
    /// malformed contribution or displacement table) abort the collective
    /// group before returning.
    /// Conflicts are handled per [`ConflictPolicy`] and never abort.
    #[instrument(level = "debug", skip_all, fields(local = local.len()))]
    pub fn gather<P: Payload>(
        &self,
        local: &[ViewRecord<P>],
    ) -> Result<Vec<ViewRecord<P>>, ViewError> {
        let contribution = match encode_contribution(local) {
            Ok(bytes) => bytes,
            Err(err) => {
                // The other ranks are about to block in the gather.
                self.collective.abort(&err.to_string());
                return Err(err);
            }
        };

        let start = Instant::now();
        let outcome = self
            .collective
            .all_gather(&contribution)
            .map_err(ViewError::from)
            .and_then(|gathered| {
                metrics::record_gather(
                    contribution.len(),
                    gathered.buffer().len(),
                    start.elapsed().as_secs_f64(),
                );
                self.check_participants(&gathered)?;
                self.resolve(&gathered)
            });

        match outcome {
            Err(err) if err.is_protocol_violation() => {
                self.collective.abort(&err.to_string());
                Err(err)
            }
            result => result,
        }
    }

    /// Gather and insert every canonical record into `index`.
    ///
    /// Returns the number of records inserted.
    pub fn gather_into<P, I>(
        &self,
        local: &[ViewRecord<P>],
        index: &mut I,
    ) -> Result<usize, ViewError>
    where
        P: Payload,
        I: SpatialIndex<P>,
    {
        let records = self.gather(local)?;
        let inserted = records.len();
        for record in records {
            index.insert(record.gid, record.payload);
        }
        Ok(inserted)
    }

    /// Gather and append to `out`, then re-sort all of `out` by GID.
    ///
    /// Returns the number of records appended.
    pub fn gather_sorted<P: Payload>(
        &self,
        local: &[ViewRecord<P>],
        out: &mut Vec<ViewRecord<P>>,
    ) -> Result<usize, ViewError> {
        let records = self.gather(local)?;
        let appended = records.len();
        out.extend(records);
        out.sort_by_key(|record| record.gid);
        Ok(appended)
    }

    /// Gather payloads read from the elements `registry` hosts.
    ///
    /// `gids` restricts the view to one collection; `accessor` returning
    /// `None` leaves an element out.
    pub fn gather_from<D, P, F>(
        &self,
        registry: &ElementRegistry<D>,
        gids: Option<&GidCollection>,
        accessor: F,
    ) -> Result<Vec<ViewRecord<P>>, ViewError>
    where
        D: Dispatch,
        P: Payload,
        F: Fn(&Node) -> Option<P>,
    {
        self.gather(&local_records(registry, gids, accessor))
    }

    /// A gathered table must hold exactly one contribution per participant.
    fn check_participants(&self, gathered: &Gathered) -> Result<(), ViewError> {
        let expected = self.collective.num_processes();
        let found = gathered.num_contributions();
        if found != expected {
            return Err(CollectiveError::MalformedDisplacements(format!(
                "{found} contributions for {expected} participants"
            ))
            .into());
        }
        Ok(())
    }

    /// Canonicalize an already gathered buffer.
    ///
    /// Pure: does not touch the collective, even on error.
    pub fn resolve<P: Payload>(
        &self,
        gathered: &Gathered,
    ) -> Result<Vec<ViewRecord<P>>, ViewError> {
        let mut contributed = Vec::new();
        for (rank, bytes) in gathered.contributions() {
            contributed.extend(decode_contribution::<P>(rank, bytes)?);
        }
        canonicalize(contributed, self.config.conflict_policy)
    }
}

/// Sort by (GID, rank) and keep one record per GID.
///
/// Records are equal when their encoded payload bytes are equal.
fn canonicalize<P>(
    mut contributed: Vec<Contributed<'_, P>>,
    policy: ConflictPolicy,
) -> Result<Vec<ViewRecord<P>>, ViewError> {
    contributed.sort_by_key(|record| (record.gid, record.rank));

    let mut canonical: Vec<ViewRecord<P>> = Vec::with_capacity(contributed.len());
    let mut kept: Option<(Gid, Rank, &[u8])> = None;
    let mut duplicates = 0usize;

    for record in contributed {
        match kept {
            Some((gid, rank, raw)) if gid == record.gid => {
                if raw == record.raw {
                    duplicates += 1;
                    trace!(gid = %gid, rank = %record.rank, "Dropped duplicate record");
                    continue;
                }
                match policy {
                    ConflictPolicy::Reject => {
                        return Err(ViewError::Conflict {
                            gid,
                            first: rank,
                            second: record.rank,
                        });
                    }
                    ConflictPolicy::LowestRankWins => {
                        warn!(
                            gid = %gid,
                            kept = %rank,
                            dropped = %record.rank,
                            "Conflicting payloads for one GID, keeping lowest rank"
                        );
                        metrics::record_view_conflict();
                    }
                }
            }
            _ => {
                trace!(gid = %record.gid, rank = %record.rank, "Canonical record");
                kept = Some((record.gid, record.rank, record.raw));
                canonical.push(ViewRecord::new(record.gid, record.payload));
            }
        }
    }

    if duplicates > 0 {
        metrics::record_duplicates_dropped(duplicates);
    }
    debug!(records = canonical.len(), duplicates, "Consistent view resolved");
    Ok(canonical)
}
