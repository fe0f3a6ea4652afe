//! Cluster-wide placement: ownership, replication, and population agreement.

use gridkernel_registry::{properties, PropertyAccess, PropertyMap, PropertyValue};
use gridkernel_test_helpers::{models, SimulatedGrid};
use gridkernel_types::{Gid, Rank, ThreadIndex, Vp};
use proptest::prelude::*;

#[test]
fn test_normal_batch_spreads_evenly() {
    let mut grid = SimulatedGrid::new(2, 2, models::standard_models);
    grid.create("counter", 100).unwrap();

    for registry in grid.registries() {
        for t in 0..2 {
            let nodes = registry.local_nodes(ThreadIndex(t)).unwrap();
            assert_eq!(nodes.len(), 25, "VP ({}, {t})", registry.rank());
        }
    }
}

#[test]
fn test_device_batch_replicates_on_every_vp() {
    let mut grid = SimulatedGrid::new(2, 2, models::standard_models);
    grid.create("counter", 100).unwrap();
    let devices = grid.create("recorder", 10).unwrap();

    let device_instances: usize = grid
        .registries()
        .iter()
        .flat_map(|r| (0..2).map(move |t| (r, ThreadIndex(t))))
        .map(|(r, t)| {
            r.local_nodes(t)
                .unwrap()
                .iter()
                .filter(|n| devices.contains(n.gid()))
                .count()
        })
        .sum();
    assert_eq!(device_instances, 40);

    let gid = devices.get(4).unwrap();
    let siblings = grid.siblings(gid).unwrap();
    let vps: Vec<Vp> = siblings.iter().map(|n| n.vp()).collect();
    assert_eq!(
        vps,
        vec![
            Vp::new(Rank(0), ThreadIndex(0)),
            Vp::new(Rank(1), ThreadIndex(0)),
            Vp::new(Rank(0), ThreadIndex(1)),
            Vp::new(Rank(1), ThreadIndex(1)),
        ]
    );
    assert!(siblings.iter().all(|n| n.gid() == gid));
}

#[test]
fn test_replicas_are_independent() {
    let mut grid = SimulatedGrid::new(1, 2, models::standard_models);
    let gid = grid.create("recorder", 1).unwrap().first().unwrap();

    let registry = grid.registry_mut(Rank(0));
    let node = registry.get_local_mut(gid, ThreadIndex(1)).unwrap();
    node.element_mut()
        .set_status(&mut PropertyAccess::new(&properties([("events", 5i64)])))
        .unwrap();

    let events: Vec<_> = registry
        .get_siblings(gid)
        .unwrap()
        .iter()
        .map(|n| {
            let mut status = PropertyMap::new();
            n.element().get_status(&mut status);
            status["events"].clone()
        })
        .collect();
    assert_eq!(events[0], PropertyValue::Int(0));
    assert_eq!(events[1], PropertyValue::Int(5));
}

#[test]
fn test_external_only_on_origin() {
    let mut grid = SimulatedGrid::new(3, 2, models::standard_models);
    let stimuli = grid.create("stimulus", 5).unwrap();
    for gid in &stimuli {
        assert_eq!(grid.owners_of(gid), vec![Vp::ORIGIN]);
    }
}

#[test]
fn test_population_agrees_after_ensure() {
    let mut grid = SimulatedGrid::new(2, 3, models::standard_models);
    grid.create("counter", 7).unwrap();
    grid.create("recorder", 2).unwrap();
    grid.create("counter", 3).unwrap();
    grid.ensure_valid_thread_local_ids();

    for registry in grid.registries() {
        assert_eq!(registry.size(), 12);
        for t in 0..3 {
            assert_eq!(registry.max_gid(ThreadIndex(t)).unwrap(), Gid(12));
        }
    }
}

#[test]
fn test_authoritative_device_instance_is_unique() {
    let mut grid = SimulatedGrid::new(2, 2, models::standard_models);
    let devices = grid.create("recorder", 6).unwrap();

    for gid in &devices {
        let local: Vec<_> = grid
            .registries()
            .iter()
            .filter_map(|r| r.get(gid, None).unwrap().node())
            .collect();
        assert_eq!(local.len(), 1, "GID {gid} must resolve to exactly one instance");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_ownership_uniqueness(
        processes in 1usize..4,
        threads in 1usize..4,
        normals in 1u64..40,
        devices in 1u64..5,
        externals in 1u64..5,
    ) {
        let mut grid = SimulatedGrid::new(processes, threads, models::standard_models);
        let normal = grid.create("counter", normals).unwrap();
        let device = grid.create("recorder", devices).unwrap();
        let external = grid.create("stimulus", externals).unwrap();

        for gid in &normal {
            prop_assert_eq!(grid.owners_of(gid).len(), 1);
        }
        for gid in &device {
            prop_assert_eq!(grid.owners_of(gid).len(), processes * threads);
        }
        for gid in &external {
            prop_assert_eq!(grid.owners_of(gid), vec![Vp::ORIGIN]);
        }
    }
}
