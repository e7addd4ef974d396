//! Compilation throughput: world mask state to flat block records.

mod common;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use blockset_ecs::engine::types::{ComponentStatus, EntityStatus};
use blockset_ecs::prelude::*;
use common::{seeded_world, Hostile, Position, Velocity};

const ENTITIES: usize = 65_536;

fn bench_prepare(c: &mut Criterion) {
    let world = seeded_world(ENTITIES, 4, 16);

    c.bench_function("prepare/two_pools_enabled", |b| {
        b.iter(|| {
            let query = world.query::<(Position, Velocity)>().unwrap();
            black_box(query.block_count());
        })
    });

    c.bench_function("prepare/two_pools_filtered", |b| {
        b.iter(|| {
            let query = world
                .prepare::<(Position, Velocity), _>(
                    None,
                    WithAll::<(Hostile,)>::new(),
                    EntityStatus::Enabled,
                    ComponentStatus::Enabled,
                )
                .unwrap();
            black_box(query.matched_entities());
        })
    });

    c.bench_function("prepare/status_any", |b| {
        b.iter(|| {
            let query = world
                .prepare::<(Position,), _>(
                    None,
                    Unfiltered,
                    EntityStatus::Any,
                    ComponentStatus::Any,
                )
                .unwrap();
            black_box(query.block_count());
        })
    });
}

criterion_group!(benches, bench_prepare);
criterion_main!(benches);
