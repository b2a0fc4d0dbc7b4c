//! Benchmarks for the structural-mutation hot paths: spawn, set, remove,
//! destroy, and query iteration.
//!
//! Run with: cargo bench

use archetype_ecs::World;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

#[derive(Default, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Default, Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Default, Clone, Copy)]
struct Health(u32);

fn bench_spawn(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    for count in [1_000, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::new("spawn_with_two_components", count), count, |b, &count| {
            b.iter(|| {
                let world = World::new();
                for i in 0..count {
                    let e = world.create_entity();
                    e.set(Position { x: i as f32, y: 0.0, z: 0.0 });
                    e.set(Velocity { x: 1.0, y: 0.0, z: 0.0 });
                }
                world.destroy();
            });
        });
    }

    group.finish();
}

fn bench_set(c: &mut Criterion) {
    c.bench_function("set_existing_component_1k", |b| {
        b.iter_batched(
            || {
                let world = World::new();
                let entities: Vec<_> = (0..1_000)
                    .map(|i| {
                        let e = world.create_entity();
                        e.set(Position { x: i as f32, y: 0.0, z: 0.0 });
                        e
                    })
                    .collect();
                (world, entities)
            },
            |(world, entities)| {
                for e in &entities {
                    e.set(Position { x: 1.0, y: 1.0, z: 1.0 });
                }
                world.destroy();
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_remove(c: &mut Criterion) {
    c.bench_function("remove_component_1k", |b| {
        b.iter_batched(
            || {
                let world = World::new();
                let entities: Vec<_> = (0..1_000)
                    .map(|i| {
                        let e = world.create_entity();
                        e.set(Position { x: i as f32, y: 0.0, z: 0.0 });
                        e.set(Velocity { x: 1.0, y: 0.0, z: 0.0 });
                        e
                    })
                    .collect();
                (world, entities)
            },
            |(world, entities)| {
                for e in &entities {
                    e.remove::<Velocity>();
                }
                world.destroy();
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_destroy(c: &mut Criterion) {
    c.bench_function("destroy_entity_1k", |b| {
        b.iter_batched(
            || {
                let world = World::new();
                let entities: Vec<_> = (0..1_000)
                    .map(|i| {
                        let e = world.create_entity();
                        e.set(Position { x: i as f32, y: 0.0, z: 0.0 });
                        e.set(Health(100));
                        e
                    })
                    .collect();
                (world, entities)
            },
            |(world, entities)| {
                for e in entities {
                    e.destroy();
                }
                world.destroy();
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_query_iterate(c: &mut Criterion) {
    let world = World::new();
    for i in 0..100_000 {
        let e = world.create_entity();
        e.set(Position { x: i as f32, y: 0.0, z: 0.0 });
        e.set(Velocity { x: 1.0, y: 0.0, z: 0.0 });
    }

    c.bench_function("query_for_each_100k", |b| {
        let mut q = world.query();
        q.has::<Position>().has::<Velocity>();
        b.iter(|| {
            let mut sum = 0.0f32;
            q.for_each::<Position>(|_, p| sum += p.x);
            black_box(sum);
        });
    });

    world.destroy();
}

criterion_group!(benches, bench_spawn, bench_set, bench_remove, bench_destroy, bench_query_iterate);
criterion_main!(benches);
