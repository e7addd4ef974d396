//! Shared fixtures for the criterion benches.

#![allow(dead_code)]

use std::sync::Once;

use blockset_ecs::prelude::*;

#[derive(Clone, Copy, Debug, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Health(pub f32);

pub struct Hostile;

static INIT: Once = Once::new();

pub fn init_registry() {
    INIT.call_once(|| {
        register_component::<Position>();
        register_component::<Velocity>();
        register_component::<Health>();
        register_tag::<Hostile>();
        freeze_pools();
    });
}

/// Builds a world with `entities` fully-populated entities in one cluster;
/// every `hostile_every`-th is tagged, every `disable_every`-th disabled.
pub fn seeded_world(entities: usize, hostile_every: usize, disable_every: usize) -> World {
    init_registry();
    let mut world = World::new();
    let cluster = world.create_cluster();
    for i in 0..entities {
        let e = world.spawn(cluster).unwrap();
        world
            .set(e, Position { x: i as f32, y: 0.0 })
            .unwrap();
        world.set(e, Velocity { dx: 1.0, dy: 0.5 }).unwrap();
        world.set(e, Health(100.0)).unwrap();
        if i % hostile_every == 0 {
            world.tag::<Hostile>(e).unwrap();
        }
        if i % disable_every == 0 {
            world.set_enabled(e, false).unwrap();
        }
    }
    world
}
