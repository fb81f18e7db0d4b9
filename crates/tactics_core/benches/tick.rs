//! Tick pipeline benchmarks for tactics_core.
//!
//! Run with: `cargo bench -p tactics_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tactics_core::actor::ActorSpawnParams;
use tactics_core::config::AiConfig;
use tactics_core::cover::CoverParams;
use tactics_core::math::{Fixed, Vec2Fixed};
use tactics_core::world::{World, WorldConfig};

fn vec2(x: i64, y: i64) -> Vec2Fixed {
    Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y))
}

/// Two four-man squads facing off across two lines of low walls.
fn skirmish_world() -> World {
    let mut world = World::new(
        AiConfig::default(),
        WorldConfig {
            seed: 99,
            grid_width: 96,
            grid_height: 96,
            cell_size: Fixed::ONE,
        },
    )
    .expect("world");

    for i in 0..4 {
        world.add_cover(CoverParams {
            position: vec2(20 + i * 16, 44),
            forward: vec2(0, 1),
            width: Fixed::from_num(5),
            height: Fixed::from_num(1),
        });
        world.add_cover(CoverParams {
            position: vec2(28 + i * 16, 52),
            forward: vec2(0, -1),
            width: Fixed::from_num(5),
            height: Fixed::from_num(1),
        });
    }

    for i in 0..4 {
        world.spawn_actor(ActorSpawnParams::fighter(0, vec2(20 + i * 14, 32)));
        world.spawn_actor(ActorSpawnParams {
            facing: Some(vec2(0, -1)),
            ..ActorSpawnParams::fighter(1, vec2(24 + i * 14, 64))
        });
    }
    world
}

pub fn tick_benchmark(c: &mut Criterion) {
    c.bench_function("tick_skirmish_8_agents", |b| {
        let mut world = skirmish_world();
        // Settle into combat before measuring the steady state.
        for _ in 0..60 {
            world.tick();
        }
        b.iter(|| {
            black_box(world.tick());
        });
    });

    c.bench_function("snapshot_skirmish", |b| {
        let mut world = skirmish_world();
        for _ in 0..60 {
            world.tick();
        }
        b.iter(|| black_box(world.snapshot().expect("snapshot")));
    });
}

criterion_group!(benches, tick_benchmark);
criterion_main!(benches);
