//! Local records read from an element registry.

use crate::record::{Payload, ViewRecord};
use gridkernel_dispatch::Dispatch;
use gridkernel_registry::{ElementRegistry, Node};
use gridkernel_types::{Gid, GidCollection, ThreadIndex};
use std::collections::BTreeMap;

/// Collect the records of every locally hosted GID, in GID order.
///
/// Replicas of one element on several threads contribute a single record
/// when their payloads encode to the same bytes. Replicas that disagree each
/// contribute, in thread order, so the gather reports them as a conflict
/// instead of one of them silently winning.
pub fn local_records<D, P, F>(
    registry: &ElementRegistry<D>,
    gids: Option<&GidCollection>,
    accessor: F,
) -> Vec<ViewRecord<P>>
where
    D: Dispatch,
    P: Payload,
    F: Fn(&Node) -> Option<P>,
{
    let mut records: BTreeMap<Gid, Vec<(Vec<u8>, P)>> = BTreeMap::new();
    for t in 0..registry.num_threads() {
        let Ok(nodes) = registry.local_nodes(ThreadIndex(t)) else {
            continue;
        };
        for node in nodes {
            if gids.is_some_and(|gids| !gids.contains(node.gid())) {
                continue;
            }
            let Some(payload) = accessor(node) else {
                continue;
            };
            let mut raw = Vec::with_capacity(P::ENCODED_LEN);
            payload.encode(&mut raw);
            let replicas = records.entry(node.gid()).or_default();
            if !replicas.iter().any(|(seen, _)| *seen == raw) {
                replicas.push((raw, payload));
            }
        }
    }
    records
        .into_iter()
        .flat_map(|(gid, replicas)| {
            replicas
                .into_iter()
                .map(move |(_, payload)| ViewRecord::new(gid, payload))
        })
        .collect()
}
