//! Full-pipeline determinism tests.
//!
//! Identical seeds and identical setup must produce identical state
//! hash trajectories, and a snapshot must replay exactly.

use tactics_core::actor::ActorSpawnParams;
use tactics_core::actor::Waypoint;
use tactics_core::math::Fixed;
use tactics_test_utils::determinism::{
    find_first_divergence, run_parallel_simulations_scoped, verify_determinism,
    verify_snapshot_determinism,
};
use tactics_test_utils::fixtures::{open_world, skirmish_2v2, vec2};

#[test]
fn test_identical_seeds_produce_identical_trajectories() {
    let result = verify_determinism(
        3,
        400,
        || skirmish_2v2(1234).0,
        |world| {
            world.tick();
        },
        |world| world.state_hash().expect("state hash"),
    );
    result.assert_deterministic();

    assert!(
        find_first_divergence(|| skirmish_2v2(1234).0, 400).is_none(),
        "same-seed runs must never diverge"
    );
}

#[test]
fn test_different_seeds_may_diverge_but_each_replays() {
    // Jittered scan timing depends on the seed, so two seeds are
    // allowed to differ; each one individually must still replay.
    for seed in [1, 2, 99] {
        assert!(
            find_first_divergence(|| skirmish_2v2(seed).0, 200).is_none(),
            "seed {seed} is not reproducible"
        );
    }
}

#[test]
fn test_snapshot_mid_fight_replays_identically() {
    assert!(verify_snapshot_determinism(|| skirmish_2v2(77).0, 150, 80));
}

#[test]
fn test_snapshot_of_patrol_and_alert_traffic_replays() {
    let setup = || {
        let mut world = open_world(13);
        world.spawn_actor(ActorSpawnParams {
            patrol: vec![
                Waypoint {
                    position: vec2(10.0, 10.0),
                    pause: Some(Fixed::from_num(1)),
                },
                Waypoint {
                    position: vec2(30.0, 10.0),
                    pause: None,
                },
            ],
            ..ActorSpawnParams::fighter(0, vec2(10.0, 10.0))
        });
        world.spawn_actor(ActorSpawnParams::fighter(0, vec2(20.0, 20.0)));
        world.post_alert(vec2(25.0, 14.0), Fixed::from_num(30), true, None, false);
        world
    };
    assert!(verify_snapshot_determinism(setup, 90, 40));
}

#[test]
fn test_parallel_worlds_agree() {
    run_parallel_simulations_scoped(|| skirmish_2v2(2026).0, 8, 250).assert_deterministic();
}
