//! Entity lifecycle through the world facade: streaming, despawn,
//! reclamation, stale handles, and tag state.

use std::sync::Once;

use blockset_ecs::engine::types::{split_entity_id, ComponentStatus, EntityStatus, CHUNK_CAP};
use blockset_ecs::prelude::*;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Mass(f64);

struct Marked;
struct Culled;

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        register_component::<Mass>();
        register_tag::<Marked>();
        register_mask::<Culled>();
        freeze_pools();
    });
}

#[test]
fn spawn_streams_chunks_in_on_demand() {
    init();
    let mut world = World::new();
    let cluster = world.create_cluster();

    for _ in 0..CHUNK_CAP {
        world.spawn(cluster).unwrap();
    }
    assert_eq!(world.store().chunk_count(), 1);

    // The next spawn crosses the chunk boundary.
    let e = world.spawn(cluster).unwrap();
    assert_eq!(world.store().chunk_count(), 2);
    assert_eq!(split_entity_id(e).0 as usize, CHUNK_CAP);
}

#[test]
fn stale_handles_are_rejected_everywhere() {
    init();
    let mut world = World::new();
    let cluster = world.create_cluster();
    let e = world.spawn(cluster).unwrap();
    world.set(e, Mass(5.0)).unwrap();

    world.despawn(e).unwrap();
    assert!(!world.is_alive(e));
    assert_eq!(world.get::<Mass>(e), None);
    assert!(world.set(e, Mass(6.0)).is_err());
    assert!(world.despawn(e).is_err());
    assert!(world.tag::<Marked>(e).is_err());
}

#[test]
fn reclaimed_slots_come_back_clean() {
    init();
    let mut world = World::new();
    let cluster = world.create_cluster();

    let e = world.spawn(cluster).unwrap();
    world.set(e, Mass(1.0)).unwrap();
    world.tag::<Marked>(e).unwrap();
    world.despawn(e).unwrap();
    assert_eq!(world.reclaim(), 1);

    // Same slot, fresh version, no inherited state.
    let reused = world.spawn(cluster).unwrap();
    assert_eq!(split_entity_id(reused).0, split_entity_id(e).0);
    assert_ne!(reused, e);
    assert_eq!(world.get::<Mass>(reused), None);
    assert!(!world.has_tag::<Marked>(reused));
}

#[test]
fn unload_clears_pool_mirrors() {
    init();
    let mut world = World::new();
    let cluster = world.create_cluster();
    let chunk = world.load_chunk(cluster).unwrap();

    let e = world.spawn(cluster).unwrap();
    world.set(e, Mass(9.0)).unwrap();
    world.unload_chunk(chunk).unwrap();
    assert!(!world.is_alive(e));

    // Reloading the same chunk index must not resurrect the component.
    world.load_chunk(cluster).unwrap();
    let fresh = world.spawn(cluster).unwrap();
    assert_eq!(split_entity_id(fresh).0, 0);
    assert_eq!(world.get::<Mass>(fresh), None);

    let query = world.query::<(Mass,)>().unwrap();
    assert_eq!(query.matched_entities(), 0);
}

#[test]
fn component_values_read_back_and_update() {
    init();
    let mut world = World::new();
    let cluster = world.create_cluster();
    let e = world.spawn(cluster).unwrap();

    world.set(e, Mass(2.5)).unwrap();
    assert_eq!(world.get::<Mass>(e), Some(&Mass(2.5)));
    world.get_mut::<Mass>(e).unwrap().0 = 4.0;
    assert_eq!(world.get::<Mass>(e), Some(&Mass(4.0)));
    assert!(world.remove::<Mass>(e).unwrap());
    assert!(!world.remove::<Mass>(e).unwrap());
    assert_eq!(world.get::<Mass>(e), None);
}

#[test]
fn tags_and_masks_toggle_presence() {
    init();
    let mut world = World::new();
    let cluster = world.create_cluster();
    let e = world.spawn(cluster).unwrap();

    assert!(!world.has_tag::<Marked>(e));
    world.tag::<Marked>(e).unwrap();
    world.tag::<Culled>(e).unwrap();
    assert!(world.has_tag::<Marked>(e));
    assert!(world.has_tag::<Culled>(e));
    assert!(world.untag::<Marked>(e).unwrap());
    assert!(!world.has_tag::<Marked>(e));
    assert!(!world.untag::<Marked>(e).unwrap());
}

#[test]
fn despawned_slots_disappear_from_any_status_queries() {
    init();
    let mut world = World::new();
    let cluster = world.create_cluster();

    let mut entities = Vec::new();
    for i in 0..3 {
        let e = world.spawn(cluster).unwrap();
        world.set(e, Mass(i as f64)).unwrap();
        entities.push(e);
    }
    world.despawn(entities[1]).unwrap();

    // Not reclaimed yet, but already out of every lifecycle slice.
    let any = world
        .prepare::<(Mass,), _>(None, Unfiltered, EntityStatus::Any, ComponentStatus::Any)
        .unwrap();
    let mut seen = Vec::new();
    any.run(|entity, _| seen.push(entity));
    assert_eq!(seen, vec![0, 2]);
}

#[test]
fn despawn_without_reclaim_blocks_slot_reuse() {
    init();
    let mut world = World::new();
    let cluster = world.create_cluster();

    let a = world.spawn(cluster).unwrap();
    world.despawn(a).unwrap();
    let b = world.spawn(cluster).unwrap();
    assert_ne!(split_entity_id(a).0, split_entity_id(b).0);
}
