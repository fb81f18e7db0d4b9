//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the combat simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! The AI layer must be 100% deterministic for replays, headless
//! regression runs and server reconciliation. Sources of
//! non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different
//!   results. We use fixed-point arithmetic via
//!   [`tactics_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   We always iterate in sorted actor ID order.
//!
//! - **System randomness**: No calls to `rand()` without explicit
//!   seeds. All jitter (scan delays, guess errors) uses the world's
//!   seeded PRNG.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual component determinism (perception, cover, squad)
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full combat scenarios are reproducible
//! 4. **Parallel tests**: Running N worlds in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use tactics_core::world::World;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic world).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel simulation runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each world.
    pub hashes: Vec<u64>,
    /// Number of ticks each world ran.
    pub ticks: u64,
    /// Number of worlds run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all runs produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all runs matched.
    ///
    /// # Panics
    ///
    /// Panics if runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel worlds diverged!\n\
                 Worlds: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one tick
/// * `hash` - Function to compute a state hash
///
/// # Example
///
/// ```
/// use tactics_test_utils::determinism::verify_determinism;
/// use tactics_test_utils::fixtures::skirmish_2v2;
///
/// let result = verify_determinism(
///     3,
///     100,
///     || skirmish_2v2(42).0,
///     |world| {
///         world.tick();
///     },
///     |world| world.state_hash().expect("state hash"),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Simplified determinism verification for [`World`].
///
/// Runs the world twice with identical setup and verifies the final
/// state hashes match exactly.
///
/// # Panics
///
/// Panics if a world fails to serialize for hashing.
pub fn verify_world_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> World,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |world| {
            world.tick();
        },
        |world| world.state_hash().expect("state hash"),
    );
    result.is_deterministic
}

/// Run N worlds in parallel using scoped threads and collect final hashes.
///
/// This is useful for catching non-determinism that only manifests
/// under thread scheduling variations or memory layout differences.
///
/// # Panics
///
/// Panics if a worker thread panics or a world fails to hash.
pub fn run_parallel_simulations_scoped<F>(
    setup_fn: F,
    num_sims: usize,
    num_ticks: u64,
) -> ParallelSimResult
where
    F: Fn() -> World + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut world = setup_fn();
                    for _ in 0..num_ticks {
                        world.tick();
                    }
                    world.state_hash().expect("state hash")
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two world runs tick-by-tick, finding the first divergence.
///
/// Useful for debugging non-determinism by finding exactly when the
/// runs start to differ.
///
/// # Returns
///
/// `None` if the runs are identical, `Some(tick)` if they diverge at
/// that tick.
///
/// # Panics
///
/// Panics if a world fails to serialize for hashing.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> World,
{
    let mut world1 = setup_fn();
    let mut world2 = setup_fn();

    let hash = |world: &World| world.state_hash().expect("state hash");

    if hash(&world1) != hash(&world2) {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        world1.tick();
        world2.tick();

        if hash(&world1) != hash(&world2) {
            return Some(tick);
        }
    }

    None
}

/// Verify that a snapshot round-trip preserves world state exactly,
/// including the ticks that follow it.
///
/// This is critical for save/load and replay branching: a restored
/// world must not just hash the same, it must keep producing the same
/// trajectory as the original.
pub fn verify_snapshot_determinism<F>(setup_fn: F, num_ticks: u64, replay_ticks: u64) -> bool
where
    F: Fn() -> World,
{
    let mut world = setup_fn();
    for _ in 0..num_ticks {
        world.tick();
    }

    let Ok(bytes) = world.snapshot() else {
        return false;
    };
    let mut restored = setup_fn();
    if restored.restore(&bytes).is_err() {
        return false;
    }

    let hashes_match = |a: &World, b: &World| match (a.state_hash(), b.state_hash()) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    };

    if !hashes_match(&world, &restored) {
        return false;
    }

    for _ in 0..replay_ticks {
        world.tick();
        restored.tick();
        if !hashes_match(&world, &restored) {
            return false;
        }
    }

    true
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of the combat simulation.
pub mod strategies {
    use proptest::prelude::*;
    use tactics_core::actor::{ActorSpawnParams, Side};
    use tactics_core::cover::CoverParams;
    use tactics_core::math::{Fixed, Vec2Fixed};

    /// Generate a position inside the default 64x64 grid, with margin
    /// so kinematics never push an actor off the edge.
    pub fn arb_position() -> impl Strategy<Value = Vec2Fixed> {
        (4i32..60, 4i32..60).prop_map(|(x, y)| Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y)))
    }

    /// Generate a side (two teams).
    pub fn arb_side() -> impl Strategy<Value = Side> {
        0u8..2
    }

    /// Generate health values.
    pub fn arb_health() -> impl Strategy<Value = u32> {
        10u32..200
    }

    /// Generate damage values.
    pub fn arb_damage() -> impl Strategy<Value = u32> {
        1u32..100
    }

    /// Generate a hearing multiplier between 0.5 and 2.
    pub fn arb_hearing() -> impl Strategy<Value = Fixed> {
        (5i32..20).prop_map(|n| Fixed::from_num(n) / Fixed::from_num(10))
    }

    /// Generate spawn parameters for a brained fighter.
    pub fn arb_fighter_params() -> impl Strategy<Value = ActorSpawnParams> {
        (arb_position(), arb_side(), arb_health(), arb_hearing()).prop_map(
            |(position, side, health, hearing)| ActorSpawnParams {
                health: Some(health),
                hearing: Some(hearing),
                ..ActorSpawnParams::fighter(side, position)
            },
        )
    }

    /// Generate a list of fighter spawn parameters.
    pub fn arb_fighter_list(max_fighters: usize) -> impl Strategy<Value = Vec<ActorSpawnParams>> {
        proptest::collection::vec(arb_fighter_params(), 1..max_fighters)
    }

    /// Generate a low or tall cover somewhere in the middle of the
    /// grid, facing a cardinal direction.
    pub fn arb_cover_params() -> impl Strategy<Value = CoverParams> {
        (arb_position(), 0u8..4, 2i32..8, proptest::bool::ANY).prop_map(
            |(position, facing, width, tall)| {
                let forward = match facing {
                    0 => Vec2Fixed::new(Fixed::ZERO, Fixed::ONE),
                    1 => Vec2Fixed::new(Fixed::ZERO, -Fixed::ONE),
                    2 => Vec2Fixed::new(Fixed::ONE, Fixed::ZERO),
                    _ => Vec2Fixed::new(-Fixed::ONE, Fixed::ZERO),
                };
                CoverParams {
                    position,
                    forward,
                    width: Fixed::from_num(width),
                    height: if tall {
                        Fixed::from_num(2)
                    } else {
                        Fixed::from_num(1)
                    },
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tactics_core::actor::ActorSpawnParams;
    use tactics_core::math::Fixed;

    use crate::fixtures::{open_world, skirmish_2v2};

    // =========================================================================
    // Basic determinism tests
    // =========================================================================

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(4, 50, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![50, 50, 50, 50]);
    }

    #[test]
    fn test_empty_world_determinism() {
        assert!(verify_world_determinism(|| open_world(1), 100));
    }

    #[test]
    fn test_skirmish_determinism() {
        let result = verify_determinism(
            5,
            200,
            || skirmish_2v2(42).0,
            |world| {
                world.tick();
            },
            |world| world.state_hash().expect("state hash"),
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_find_divergence_on_deterministic_world() {
        let divergence = find_first_divergence(|| skirmish_2v2(7).0, 150);
        assert!(divergence.is_none(), "Expected no divergence");
    }

    #[test]
    fn test_parallel_skirmish_worlds() {
        let result = run_parallel_simulations_scoped(|| skirmish_2v2(9).0, 4, 300);
        result.assert_deterministic();
    }

    // =========================================================================
    // Snapshot round-trip tests
    // =========================================================================

    #[test]
    fn test_snapshot_preserves_empty_world() {
        assert!(verify_snapshot_determinism(|| open_world(3), 0, 10));
    }

    #[test]
    fn test_snapshot_preserves_mid_combat_state() {
        assert!(verify_snapshot_determinism(|| skirmish_2v2(11).0, 120, 60));
    }

    // =========================================================================
    // Property-based tests using proptest
    // =========================================================================

    proptest! {
        /// Any random set of spawns must simulate deterministically.
        ///
        /// This catches iteration order issues (HashMap randomization)
        /// and floating-point contamination in spawn handling.
        #[test]
        fn prop_random_spawns_are_deterministic(
            params in strategies::arb_fighter_list(10),
            seed in 0u64..32,
        ) {
            let params_clone = params.clone();
            let setup = move || {
                let mut world = open_world(seed);
                for p in &params_clone {
                    world.spawn_actor(p.clone());
                }
                world
            };

            let result = verify_determinism(
                2,
                100,
                setup,
                |w| { w.tick(); },
                |w| w.state_hash().expect("state hash"),
            );
            prop_assert!(result.is_deterministic);
        }

        /// Snapshot round-trips must preserve the trajectory exactly,
        /// no matter where in a fight they are taken.
        #[test]
        fn prop_snapshot_roundtrip_is_exact(
            params in strategies::arb_fighter_list(8),
            num_ticks in 0u64..80,
            seed in 0u64..32,
        ) {
            let params_clone = params.clone();
            let setup = move || {
                let mut world = open_world(seed);
                for p in &params_clone {
                    world.spawn_actor(p.clone());
                }
                world
            };

            prop_assert!(verify_snapshot_determinism(setup, num_ticks, 20));
        }

        /// A guessed attacker position stays within the configured
        /// error annulus of the true position.
        #[test]
        fn prop_damage_guess_stays_bounded(
            victim_pos in strategies::arb_position(),
            attacker_pos in strategies::arb_position(),
            damage in 1u32..60,
            seed in 0u64..64,
        ) {
            let mut world = open_world(seed);
            let victim = world.spawn_actor(ActorSpawnParams::fighter(0, victim_pos));
            let attacker = world.spawn_actor(ActorSpawnParams::dummy(1, attacker_pos));

            world.apply_damage(victim, damage, Some(attacker)).expect("damage");

            let agent = world.agent(victim).expect("agent");
            let belief = agent.tracker.belief().expect("a hit must place the attacker");
            let error = belief.position.distance(attacker_pos);
            // Rounding slack for the fixed-point unit vector.
            let bound = world.config().threat.guess_error_max + Fixed::from_num(0.05);
            prop_assert!(
                error <= bound,
                "guess error {error} exceeds bound {bound}"
            );
        }

        /// No two occupants of one cover ever stand within the contest
        /// threshold of each other, whatever the spawn layout.
        #[test]
        fn prop_cover_occupancy_stays_exclusive(
            params in strategies::arb_fighter_list(10),
            cover in strategies::arb_cover_params(),
            seed in 0u64..16,
        ) {
            let mut world = open_world(seed);
            world.add_cover(cover);
            for p in &params {
                world.spawn_actor(p.clone());
            }

            let spacing = world.config().cover.occupy_spacing;
            for _ in 0..150 {
                world.tick();
            }
            for cover in world.covers().iter() {
                let users = cover.users();
                for (i, (a, p)) in users.iter().enumerate() {
                    for (b, q) in &users[i + 1..] {
                        prop_assert!(
                            p.distance(*q) >= spacing,
                            "agents {a} and {b} share a slot on cover {}",
                            cover.id
                        );
                    }
                }
            }
        }

        /// The per-threat aggression grant never exceeds the cap.
        #[test]
        fn prop_aggression_grants_stay_bounded(
            params in strategies::arb_fighter_list(12),
            seed in 0u64..16,
        ) {
            let mut world = open_world(seed);
            for p in &params {
                world.spawn_actor(p.clone());
            }

            let cap = world.config().squad.max_aggressive as usize;
            for _ in 0..100 {
                world.tick();
                prop_assert!(world.granted_count(0) <= cap);
                prop_assert!(world.granted_count(1) <= cap);
            }
        }
    }

    // =========================================================================
    // Stress tests (only run explicitly with --ignored)
    // =========================================================================

    #[test]
    #[ignore = "Long-running stress test"]
    fn stress_test_many_agents() {
        let setup = || {
            let mut world = open_world(99);
            for i in 0..40u64 {
                let x = 6 + (i % 8) * 7;
                let y = 6 + (i / 8) * 10;
                let side = u8::from(i % 2 == 0);
                world.spawn_actor(ActorSpawnParams::fighter(
                    side,
                    crate::fixtures::vec2(x as f64, y as f64),
                ));
            }
            world
        };

        let result = verify_determinism(
            5,
            1000,
            setup,
            |w| {
                w.tick();
            },
            |w| w.state_hash().expect("state hash"),
        );
        result.assert_deterministic();
    }

    #[test]
    #[ignore = "Long-running stress test"]
    fn stress_test_parallel_many_worlds() {
        let result = run_parallel_simulations_scoped(|| skirmish_2v2(5).0, 16, 1000);
        result.assert_deterministic();
    }
}
