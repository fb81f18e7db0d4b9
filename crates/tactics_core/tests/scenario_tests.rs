//! Scenario tests that verify end-to-end combat behavior.
//!
//! These drive a full [`World`] through its public surface only: spawn
//! actors, tick, and assert on observable agent state and events.

use tactics_core::actor::{ActorId, ActorSpawnParams};
use tactics_core::brain::{AiState, StateReason};
use tactics_core::config::AiConfig;
use tactics_core::cover::{CoverId, CoverParams};
use tactics_core::cover_search::{find_cover, CoverQuery};
use tactics_core::math::{Fixed, Vec2Fixed};
use tactics_core::world::{World, WorldConfig};

fn fixed(n: f64) -> Fixed {
    Fixed::from_num(n)
}

fn vec2(x: f64, y: f64) -> Vec2Fixed {
    Vec2Fixed::new(fixed(x), fixed(y))
}

fn open_world(config: AiConfig, seed: u64) -> World {
    World::new(
        config,
        WorldConfig {
            seed,
            ..WorldConfig::default()
        },
    )
    .expect("world")
}

/// Low wall at (20, 24) protecting against threats to the north.
fn north_facing_cover(world: &mut World) -> CoverId {
    world.add_cover(CoverParams {
        position: vec2(20.0, 24.0),
        forward: vec2(0.0, 1.0),
        width: fixed(4.0),
        height: fixed(1.0),
    })
}

/// States the agent passed through, consecutive duplicates collapsed.
fn record_states(world: &mut World, agent: ActorId, ticks: u32) -> Vec<(AiState, StateReason)> {
    let mut states = Vec::new();
    for _ in 0..ticks {
        world.tick();
        let a = world.agent(agent).expect("agent");
        if states.last() != Some(&(a.state, a.reason)) {
            states.push((a.state, a.reason));
        }
    }
    states
}

fn contains_run(states: &[(AiState, StateReason)], expected: &[AiState]) -> bool {
    let bare: Vec<AiState> = states.iter().map(|(s, _)| *s).collect();
    bare.windows(expected.len()).any(|w| w == expected)
}

// =============================================================================
// Cover Takeover
// =============================================================================

#[test]
fn test_lone_cover_is_selected_and_registered() {
    let config = AiConfig::default();
    let mut world = open_world(config, 3);
    let cover_id = north_facing_cover(&mut world);
    let threat_pos = vec2(20.0, 44.0);

    let fighter = world.spawn_actor(ActorSpawnParams::fighter(0, vec2(20.0, 18.0)));
    world.spawn_actor(ActorSpawnParams::dummy(1, threat_pos));

    // Selector: one cover in the world means exactly one candidate,
    // and against a threat 20 units off its face it must pass.
    let mut query = CoverQuery::new();
    query.reset(
        world.covers(),
        fighter,
        vec2(20.0, 18.0),
        config.cover.max_cover_distance,
        &config.cover,
    );
    assert_eq!(query.candidates().len(), 1, "single low cover, single slot");

    let seeker = world.actor(fighter).expect("actor");
    let picked = find_cover(
        world.covers(),
        world.grid(),
        seeker,
        threat_pos,
        true,
        None,
        &config.cover,
    )
    .expect("the lone cover should be valid");
    assert_eq!(picked.cover, cover_id);

    // Live world: spotting the threat claims the slot.
    for _ in 0..40 {
        world.tick();
        let users = world.covers().get(cover_id).expect("cover").users();
        if users.iter().any(|(u, _)| *u == fighter) {
            return;
        }
    }
    panic!("fighter never registered on the only cover");
}

#[test]
fn test_contested_cover_keeps_occupants_apart() {
    let config = AiConfig::default();
    let mut world = open_world(config, 11);
    let cover_id = north_facing_cover(&mut world);

    let a = world.spawn_actor(ActorSpawnParams::fighter(0, vec2(18.0, 18.0)));
    let b = world.spawn_actor(ActorSpawnParams::fighter(0, vec2(22.0, 18.0)));
    world.spawn_actor(ActorSpawnParams::dummy(1, vec2(20.0, 44.0)));

    for _ in 0..60 {
        world.tick();
    }

    let users = world.covers().get(cover_id).expect("cover").users();
    assert!(
        users.iter().any(|(u, _)| *u == a) && users.iter().any(|(u, _)| *u == b),
        "both fighters should hold a slot on the shared wall, got {users:?}"
    );
    for (i, (_, p)) in users.iter().enumerate() {
        for (_, q) in &users[i + 1..] {
            assert!(
                p.distance(*q) >= config.cover.occupy_spacing,
                "slots too close: {p:?} vs {q:?}"
            );
        }
    }
}

// =============================================================================
// Burst-Fire Cycle
// =============================================================================

#[test]
fn test_burst_cycle_fire_hide_fire_hide_then_relocate() {
    let mut config = AiConfig::default();
    config.combat.burst_count = 2;
    config.combat.hide_wait = fixed(1.0);
    config.combat.total_peek_duration = fixed(3.0);
    // Two full windows must not drain the magazine mid-cycle.
    config.combat.magazine_size = 200;

    let mut world = open_world(config, 5);
    north_facing_cover(&mut world);
    let fighter = world.spawn_actor(ActorSpawnParams::fighter(0, vec2(20.0, 18.0)));
    world.spawn_actor(ActorSpawnParams::dummy(1, vec2(20.0, 38.0)));

    let states = record_states(&mut world, fighter, 200);

    assert!(
        contains_run(
            &states,
            &[
                AiState::FireInCover,
                AiState::HideInCover,
                AiState::FireInCover,
                AiState::HideInCover,
                AiState::TakeBetterCover,
            ],
        ),
        "expected fire/hide/fire/hide then relocation, got {states:?}"
    );

    let relocate = states
        .iter()
        .find(|(s, _)| *s == AiState::TakeBetterCover)
        .expect("relocation state");
    assert_eq!(relocate.1, StateReason::BurstExhausted);
}

// =============================================================================
// Alert Propagation
// =============================================================================

#[test]
fn test_alert_reaches_exactly_the_hearing_scaled_radius() {
    let config = AiConfig::default();
    let mut world = open_world(config, 2);

    let near = world.spawn_actor(ActorSpawnParams::fighter(0, vec2(10.0, 10.0)));
    let deaf = world.spawn_actor(ActorSpawnParams::fighter(0, vec2(34.0, 10.0)));
    let keen = world.spawn_actor(ActorSpawnParams {
        hearing: Some(fixed(2.0)),
        ..ActorSpawnParams::fighter(0, vec2(34.0, 14.0))
    });
    let muffled = world.spawn_actor(ActorSpawnParams {
        hearing: Some(fixed(0.5)),
        ..ActorSpawnParams::fighter(0, vec2(25.0, 10.0))
    });

    world.post_alert(vec2(10.0, 10.0), fixed(20.0), true, None, true);
    world.tick();

    let lead_of = |world: &World, id| world.agent(id).expect("agent").lead;
    assert_eq!(
        lead_of(&world, near).map(|l| l.position),
        Some(vec2(10.0, 10.0)),
        "listener inside the base radius hears"
    );
    assert!(
        lead_of(&world, keen).is_some(),
        "doubled hearing stretches the radius to 40"
    );
    assert!(
        lead_of(&world, deaf).is_none(),
        "24 units out against a radius of 20"
    );
    assert!(
        lead_of(&world, muffled).is_none(),
        "halved hearing shrinks the radius below 15"
    );

    // No generator refreshes it: gone after the second tick.
    world.tick();
    assert!(world.alerts().is_empty(), "unrefreshed alert should expire");
}

// =============================================================================
// Retreat Grace Period
// =============================================================================

#[test]
fn test_failed_retreat_holds_state_for_the_grace_window() {
    let config = AiConfig::default();
    let grace = config.combat.retreat_grace_ticks();

    // No covers anywhere: every retreat search must fail.
    let mut world = open_world(config, 8);
    let fighter = world.spawn_actor(ActorSpawnParams::fighter(0, vec2(20.0, 20.0)));
    let enemy = world.spawn_actor(ActorSpawnParams::dummy(1, vec2(20.0, 30.0)));

    world
        .apply_damage(fighter, 75, Some(enemy))
        .expect("damage");

    world.tick();
    let agent = world.agent(fighter).expect("agent");
    assert_eq!((agent.state, agent.reason), (AiState::Retreat, StateReason::LowHealth));
    let first_fail = agent.last_retreat_fail.expect("search must have failed");
    assert_eq!(first_fail, world.now());

    // Inside the window: same state, same reason, no re-search.
    for _ in 1..grace {
        world.tick();
        let agent = world.agent(fighter).expect("agent");
        assert_eq!(
            (agent.state, agent.reason),
            (AiState::Retreat, StateReason::LowHealth),
            "state must hold steady at tick {}",
            world.now()
        );
        assert_eq!(agent.last_retreat_fail, Some(first_fail));
    }

    // Window over: the search is retried (and fails again, later).
    world.tick();
    let agent = world.agent(fighter).expect("agent");
    assert_eq!((agent.state, agent.reason), (AiState::Retreat, StateReason::LowHealth));
    let second_fail = agent.last_retreat_fail.expect("retry must have failed");
    assert!(
        second_fail > first_fail,
        "grace expiry should rearm the search: {second_fail} vs {first_fail}"
    );
}
