//! Test fixtures and helpers.
//!
//! Pre-built worlds and value constructors for consistent testing
//! across crates.

use tactics_core::actor::{ActorId, ActorSpawnParams};
use tactics_core::config::AiConfig;
use tactics_core::cover::CoverParams;
use tactics_core::math::{Fixed, Vec2Fixed};
use tactics_core::world::{World, WorldConfig};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> Fixed {
    Fixed::from_num(n)
}

/// Create a fixed-point vector from floats (for tests only).
#[must_use]
pub fn vec2(x: f64, y: f64) -> Vec2Fixed {
    Vec2Fixed::new(fixed_f(x), fixed_f(y))
}

/// Empty world with default config on an open 64x64 grid.
///
/// # Panics
///
/// Panics if the default configuration is rejected, which would be a
/// bug in the defaults.
#[must_use]
pub fn open_world(seed: u64) -> World {
    World::new(
        AiConfig::default(),
        WorldConfig {
            seed,
            ..WorldConfig::default()
        },
    )
    .expect("default world config")
}

/// Symmetric 2v2 firefight: two low walls facing each other and a
/// fighter pair per side, already inside sight range.
///
/// Returns the world and the spawned ids, side 0 first.
#[must_use]
pub fn skirmish_2v2(seed: u64) -> (World, [ActorId; 4]) {
    let mut world = open_world(seed);

    world.add_cover(CoverParams {
        position: vec2(24.0, 28.0),
        forward: vec2(0.0, 1.0),
        width: fixed(6),
        height: fixed(1),
    });
    world.add_cover(CoverParams {
        position: vec2(28.0, 40.0),
        forward: vec2(0.0, -1.0),
        width: fixed(6),
        height: fixed(1),
    });

    let a = world.spawn_actor(ActorSpawnParams::fighter(0, vec2(22.0, 22.0)));
    let b = world.spawn_actor(ActorSpawnParams::fighter(0, vec2(28.0, 22.0)));
    let c = world.spawn_actor(ActorSpawnParams {
        facing: Some(vec2(0.0, -1.0)),
        ..ActorSpawnParams::fighter(1, vec2(24.0, 46.0))
    });
    let d = world.spawn_actor(ActorSpawnParams {
        facing: Some(vec2(0.0, -1.0)),
        ..ActorSpawnParams::fighter(1, vec2(30.0, 46.0))
    });

    (world, [a, b, c, d])
}
