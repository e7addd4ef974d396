//! Consumption throughput: serial and parallel walks of compiled blocks.

mod common;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use common::{seeded_world, Position, Velocity};

const ENTITIES: usize = 65_536;

fn bench_run(c: &mut Criterion) {
    let world = seeded_world(ENTITIES, 4, 16);

    c.bench_function("run/sum_positions", |b| {
        b.iter_batched(
            || world.query::<(Position,)>().unwrap(),
            |query| {
                let mut sum = 0.0f32;
                query.run(|_, (pos,)| sum += pos.x);
                black_box(sum);
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("run_mut/integrate", |b| {
        b.iter_batched(
            || world.query::<(Position, Velocity)>().unwrap(),
            |query| {
                query.run_mut(|_, (pos, vel)| {
                    pos.x += vel.dx;
                    pos.y += vel.dy;
                });
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("par_run_mut/integrate", |b| {
        b.iter_batched(
            || world.query::<(Position, Velocity)>().unwrap(),
            |query| {
                query.par_run_mut(|_, _, (pos, vel)| {
                    pos.x += vel.dx;
                    pos.y += vel.dy;
                });
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("run_blocks/slice_sum", |b| {
        b.iter_batched(
            || world.query::<(Position,)>().unwrap(),
            |query| {
                let mut sum = 0.0f32;
                query.run_blocks(|_, mask, (positions,)| {
                    if mask == u64::MAX {
                        sum += positions.iter().map(|p| p.x).sum::<f32>();
                    }
                });
                black_box(sum);
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_run);
criterion_main!(benches);
