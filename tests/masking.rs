//! Matching semantics: status selectors, per-component disable, and
//! cluster gating, observed through compiled queries.

use std::sync::Once;

use blockset_ecs::engine::types::{ComponentStatus, EntityStatus};
use blockset_ecs::prelude::*;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Health(f32);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Position {
    x: f32,
}

struct Hostile;

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        register_component::<Health>();
        register_component::<Position>();
        register_tag::<Hostile>();
        freeze_pools();
    });
}

fn collect<S, F>(query: &PreparedQuery<'_, S, F>) -> Vec<EntityIndex>
where
    S: ComponentSet,
    F: QueryFilter,
{
    let mut out = Vec::new();
    query.run(|entity, _| out.push(entity));
    out
}

#[test]
fn component_disable_narrows_the_block_mask() {
    init();
    let mut world = World::new();
    let cluster = world.create_cluster();

    // Three entities; Health on the first and third, the first disabled.
    let e0 = world.spawn(cluster).unwrap();
    let _e1 = world.spawn(cluster).unwrap();
    let e2 = world.spawn(cluster).unwrap();
    world.set(e0, Health(10.0)).unwrap();
    world.set(e2, Health(30.0)).unwrap();
    world.set_component_enabled::<Health>(e0, false).unwrap();

    let enabled = world
        .prepare::<(Health,), _>(None, Unfiltered, EntityStatus::Enabled, ComponentStatus::Enabled)
        .unwrap();
    assert_eq!(enabled.blocks().len(), 1);
    assert_eq!(enabled.blocks()[0].entities_mask, 0b100);
    drop(enabled);

    let disabled = world
        .prepare::<(Health,), _>(None, Unfiltered, EntityStatus::Enabled, ComponentStatus::Disabled)
        .unwrap();
    assert_eq!(collect(&disabled), vec![0]);
    drop(disabled);

    let any = world
        .prepare::<(Health,), _>(None, Unfiltered, EntityStatus::Enabled, ComponentStatus::Any)
        .unwrap();
    assert_eq!(collect(&any), vec![0, 2]);
}

#[test]
fn entity_status_selects_lifecycle_slices() {
    init();
    let mut world = World::new();
    let cluster = world.create_cluster();

    let mut entities = Vec::new();
    for i in 0..6 {
        let e = world.spawn(cluster).unwrap();
        world.set(e, Position { x: i as f32 }).unwrap();
        entities.push(e);
    }
    world.set_enabled(entities[1], false).unwrap();
    world.set_enabled(entities[4], false).unwrap();

    let enabled = world
        .prepare::<(Position,), _>(None, Unfiltered, EntityStatus::Enabled, ComponentStatus::Enabled)
        .unwrap();
    assert_eq!(collect(&enabled), vec![0, 2, 3, 5]);
    drop(enabled);

    let disabled = world
        .prepare::<(Position,), _>(None, Unfiltered, EntityStatus::Disabled, ComponentStatus::Enabled)
        .unwrap();
    assert_eq!(collect(&disabled), vec![1, 4]);
    drop(disabled);

    let any = world
        .prepare::<(Position,), _>(None, Unfiltered, EntityStatus::Any, ComponentStatus::Enabled)
        .unwrap();
    assert_eq!(collect(&any), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn disabled_clusters_are_skipped_wholesale() {
    init();
    let mut world = World::new();
    let front = world.create_cluster();
    let back = world.create_cluster();

    let a = world.spawn(front).unwrap();
    world.set(a, Position { x: 1.0 }).unwrap();
    let b = world.spawn(back).unwrap();
    world.set(b, Position { x: 2.0 }).unwrap();

    world.set_cluster_enabled(back, false).unwrap();
    let query = world.query::<(Position,)>().unwrap();
    let visible = collect(&query);
    assert_eq!(visible.len(), 1);
    drop(query);

    world.set_cluster_enabled(back, true).unwrap();
    let query = world.query::<(Position,)>().unwrap();
    assert_eq!(collect(&query).len(), 2);
}

#[test]
fn explicit_cluster_selection_restricts_the_walk() {
    init();
    let mut world = World::new();
    let first = world.create_cluster();
    let second = world.create_cluster();

    let a = world.spawn(first).unwrap();
    world.set(a, Health(1.0)).unwrap();
    let b = world.spawn(second).unwrap();
    world.set(b, Health(2.0)).unwrap();

    let query = world
        .prepare::<(Health,), _>(
            Some(&[second]),
            Unfiltered,
            EntityStatus::Enabled,
            ComponentStatus::Enabled,
        )
        .unwrap();
    let seen = collect(&query);
    assert_eq!(seen.len(), 1);
    let mut health = 0.0;
    query.run(|_, (h,)| health = h.0);
    assert_eq!(health, 2.0);
}

#[test]
fn filters_compose_with_status_selectors() {
    init();
    let mut world = World::new();
    let cluster = world.create_cluster();

    let mut hostile_enabled = Vec::new();
    for i in 0..10 {
        let e = world.spawn(cluster).unwrap();
        world.set(e, Health(i as f32)).unwrap();
        if i % 2 == 0 {
            world.tag::<Hostile>(e).unwrap();
        }
        if i == 4 {
            world.set_enabled(e, false).unwrap();
        } else if i % 2 == 0 {
            hostile_enabled.push(e);
        }
    }

    let query = world
        .prepare::<(Health,), _>(
            None,
            WithAll::<(Hostile,)>::new(),
            EntityStatus::Enabled,
            ComponentStatus::Enabled,
        )
        .unwrap();
    assert_eq!(query.matched_entities(), hostile_enabled.len());
}
