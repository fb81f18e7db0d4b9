//! Combat-capable actors and their registry.
//!
//! Actors carry the physical state the decision layer reasons about:
//! position, facing, stance, health, the kinematic motor fields, and
//! the gun. Brains live separately in [`crate::agent`]; an actor
//! without a brain is a valid threat (a player proxy, a scripted
//! dummy).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::cover::CoverId;
use crate::events::MoveSpeed;
use crate::math::{fixed_serde, option_fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for an actor.
pub type ActorId = u64;

/// Team identifier. Actors with equal sides are friends.
pub type Side = u8;

/// Body stance, drives low-cover concealment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Stance {
    /// Upright, visible over low cover.
    #[default]
    Standing,
    /// Ducked, hidden behind low cover.
    Crouching,
}

/// Health component for damageable actors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create new health at full.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Check if the actor is dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Apply damage, returning actual damage dealt.
    /// Uses saturating subtraction to prevent underflow.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current = self.current.saturating_sub(actual);
        actual
    }

    /// Current health as a fraction of maximum.
    #[must_use]
    pub fn fraction(&self) -> Fixed {
        if self.max == 0 {
            return Fixed::ZERO;
        }
        Fixed::from_num(self.current) / Fixed::from_num(self.max)
    }
}

/// A patrol route node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Where to walk.
    pub position: Vec2Fixed,
    /// Pause on arrival; `None` uses the configured stand duration.
    #[serde(with = "option_fixed_serde")]
    pub pause: Option<Fixed>,
}

/// Magazine and reload bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GunState {
    /// Rounds left in the magazine.
    pub magazine: u32,
    /// Rounds in a full magazine.
    pub magazine_size: u32,
    /// Ticks until an in-progress reload completes, 0 when idle.
    reload_ticks_left: u64,
    /// Fractional rounds accumulated while firing.
    #[serde(with = "fixed_serde")]
    fire_accum: Fixed,
}

impl GunState {
    /// A full gun.
    #[must_use]
    pub const fn new(magazine_size: u32) -> Self {
        Self {
            magazine: magazine_size,
            magazine_size,
            reload_ticks_left: 0,
            fire_accum: Fixed::ZERO,
        }
    }

    /// Gun can fire right now.
    #[must_use]
    pub const fn ready(&self) -> bool {
        self.magazine > 0 && self.reload_ticks_left == 0
    }

    /// Magazine is empty and no reload is running.
    #[must_use]
    pub const fn needs_reload(&self) -> bool {
        self.magazine == 0 && self.reload_ticks_left == 0
    }

    /// A reload is in progress.
    #[must_use]
    pub const fn is_reloading(&self) -> bool {
        self.reload_ticks_left > 0
    }

    /// Begin a reload taking `ticks` to finish. No-op while one is
    /// already running or the magazine is full.
    pub fn start_reload(&mut self, ticks: u64) {
        if self.reload_ticks_left == 0 && self.magazine < self.magazine_size {
            self.reload_ticks_left = ticks.max(1);
        }
    }

    /// Advance one tick. While `firing`, drains `rounds_per_tick` from
    /// the magazine (accumulating fractions).
    pub fn tick(&mut self, firing: bool, rounds_per_tick: Fixed) {
        if self.reload_ticks_left > 0 {
            self.reload_ticks_left -= 1;
            if self.reload_ticks_left == 0 {
                self.magazine = self.magazine_size;
            }
            return;
        }

        if firing && self.magazine > 0 {
            self.fire_accum += rounds_per_tick;
            while self.fire_accum >= Fixed::ONE && self.magazine > 0 {
                self.fire_accum -= Fixed::ONE;
                self.magazine -= 1;
            }
        }
    }
}

/// One combat-capable entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    /// Unique id, assigned by the arena.
    pub id: ActorId,
    /// Team.
    pub side: Side,
    /// Ground position.
    pub position: Vec2Fixed,
    /// Unit facing direction.
    pub facing: Vec2Fixed,
    /// Current stance.
    pub stance: Stance,
    /// Hit points.
    pub health: Health,
    /// Alert radius multiplier for this listener.
    #[serde(with = "fixed_serde")]
    pub hearing: Fixed,
    /// Personality flag: willing to push the attack.
    pub aggressive: bool,
    /// Still in play.
    pub alive: bool,
    /// Cover slot currently registered, if any.
    pub cover: Option<CoverId>,
    /// Remaining kinematic route.
    pub path: Vec<Vec2Fixed>,
    /// Current gait.
    pub speed: MoveSpeed,
    /// Position being fired at, when weapon is live.
    pub firing_at: Option<Vec2Fixed>,
    /// The gun.
    pub gun: GunState,
    /// Grenades remaining.
    pub grenades: u32,
    /// Patrol route, possibly empty.
    pub patrol: Vec<Waypoint>,
    /// Next patrol node index.
    pub patrol_index: usize,
}

impl Actor {
    /// Actor currently crouched.
    #[must_use]
    pub fn is_crouched(&self) -> bool {
        self.stance == Stance::Crouching
    }
}

/// Parameters for spawning a new actor.
///
/// Optional fields fall back to sensible defaults at spawn.
#[derive(Debug, Clone, Default)]
pub struct ActorSpawnParams {
    /// Team.
    pub side: Side,
    /// Initial position.
    pub position: Vec2Fixed,
    /// Initial facing; defaults to north.
    pub facing: Option<Vec2Fixed>,
    /// Maximum health; defaults to 100.
    pub health: Option<u32>,
    /// Hearing multiplier; defaults to 1.
    pub hearing: Option<Fixed>,
    /// Willing to push the attack; defaults to true.
    pub aggressive: Option<bool>,
    /// Spawn a decision-making brain; defaults to true.
    pub has_brain: bool,
    /// Grenades carried; defaults to the configured count.
    pub grenades: Option<u32>,
    /// Patrol route.
    pub patrol: Vec<Waypoint>,
}

impl ActorSpawnParams {
    /// Params for a standard brained fighter.
    #[must_use]
    pub fn fighter(side: Side, position: Vec2Fixed) -> Self {
        Self {
            side,
            position,
            has_brain: true,
            ..Default::default()
        }
    }

    /// Params for a brainless target (player proxy, scripted dummy).
    #[must_use]
    pub fn dummy(side: Side, position: Vec2Fixed) -> Self {
        Self {
            side,
            position,
            has_brain: false,
            ..Default::default()
        }
    }

    /// Materialize the actor. The config supplies the magazine size
    /// and the default grenade load; the arena assigns the id.
    #[must_use]
    pub fn build(&self, config: &AiConfig) -> Actor {
        Actor {
            id: 0,
            side: self.side,
            position: self.position,
            facing: self
                .facing
                .unwrap_or(Vec2Fixed::new(Fixed::ZERO, Fixed::ONE)),
            stance: Stance::Standing,
            health: Health::new(self.health.unwrap_or(100)),
            hearing: self.hearing.unwrap_or(Fixed::ONE),
            aggressive: self.aggressive.unwrap_or(true),
            alive: true,
            cover: None,
            path: Vec::new(),
            speed: MoveSpeed::Run,
            firing_at: None,
            gun: GunState::new(config.combat.magazine_size),
            grenades: self.grenades.unwrap_or(config.grenade.count),
            patrol: self.patrol.clone(),
            patrol_index: 0,
        }
    }
}

/// Storage for all actors.
///
/// Uses a `HashMap` for O(1) lookup by ID, with deterministic
/// iteration via sorted keys when processing systems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorArena {
    actors: HashMap<ActorId, Actor>,
    next_id: ActorId,
}

impl Default for ActorArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorArena {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            actors: HashMap::new(),
            next_id: 1,
        }
    }

    /// Insert a new actor and return its ID.
    pub fn insert(&mut self, mut actor: Actor) -> ActorId {
        let id = self.next_id;
        self.next_id += 1;
        actor.id = id;
        self.actors.insert(id, actor);
        id
    }

    /// Remove an actor entirely.
    pub fn remove(&mut self, id: ActorId) -> Option<Actor> {
        self.actors.remove(&id)
    }

    /// Look up an actor.
    #[must_use]
    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    /// Look up an actor mutably.
    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    /// Number of actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Actor ids in ascending order for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<ActorId> {
        let mut ids: Vec<ActorId> = self.actors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Living actors on the given side, ascending id order.
    #[must_use]
    pub fn living_on_side(&self, side: Side) -> Vec<ActorId> {
        self.sorted_ids()
            .into_iter()
            .filter(|id| {
                self.actors
                    .get(id)
                    .is_some_and(|a| a.alive && a.side == side)
            })
            .collect()
    }

    /// Living actors on any other side, ascending id order.
    #[must_use]
    pub fn living_enemies_of(&self, side: Side) -> Vec<ActorId> {
        self.sorted_ids()
            .into_iter()
            .filter(|id| {
                self.actors
                    .get(id)
                    .is_some_and(|a| a.alive && a.side != side)
            })
            .collect()
    }

    /// The closest living enemy of `side` to `position`, with squared
    /// distance. Ties resolve to the lower id via iteration order.
    #[must_use]
    pub fn closest_enemy(&self, side: Side, position: Vec2Fixed) -> Option<(ActorId, Fixed)> {
        let mut best: Option<(ActorId, Fixed)> = None;
        for id in self.living_enemies_of(side) {
            let Some(actor) = self.actors.get(&id) else {
                continue;
            };
            let dist_sq = actor.position.distance_squared(position);
            if best.map_or(true, |(_, d)| dist_sq < d) {
                best = Some((id, dist_sq));
            }
        }
        best
    }

    /// Contents in ascending id order plus the id counter, for
    /// canonical snapshots.
    #[must_use]
    pub fn export(&self) -> (Vec<Actor>, ActorId) {
        let actors = self
            .sorted_ids()
            .into_iter()
            .filter_map(|id| self.actors.get(&id).cloned())
            .collect();
        (actors, self.next_id)
    }

    /// Rebuild from an export.
    #[must_use]
    pub fn import(actors: Vec<Actor>, next_id: ActorId) -> Self {
        Self {
            actors: actors.into_iter().map(|a| (a.id, a)).collect(),
            next_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn actor_at(side: Side, position: Vec2Fixed) -> Actor {
        Actor {
            id: 0,
            side,
            position,
            facing: Vec2Fixed::new(Fixed::ZERO, Fixed::ONE),
            stance: Stance::Standing,
            health: Health::new(100),
            hearing: Fixed::ONE,
            aggressive: true,
            alive: true,
            cover: None,
            path: Vec::new(),
            speed: MoveSpeed::Run,
            firing_at: None,
            gun: GunState::new(10),
            grenades: 2,
            patrol: Vec::new(),
            patrol_index: 0,
        }
    }

    #[test]
    fn test_health_damage() {
        let mut health = Health::new(100);
        assert_eq!(health.apply_damage(30), 30);
        assert_eq!(health.current, 70);

        // Damage can't underflow
        assert_eq!(health.apply_damage(200), 70);
        assert!(health.is_dead());
        assert_eq!(health.fraction(), Fixed::ZERO);
    }

    #[test]
    fn test_gun_cycle() {
        let mut gun = GunState::new(3);
        assert!(gun.ready());

        // Fire two rounds per tick
        gun.tick(true, Fixed::from_num(2));
        assert_eq!(gun.magazine, 1);
        gun.tick(true, Fixed::from_num(2));
        assert_eq!(gun.magazine, 0);
        assert!(gun.needs_reload());

        gun.start_reload(2);
        assert!(gun.is_reloading());
        assert!(!gun.ready());

        gun.tick(false, Fixed::ZERO);
        gun.tick(false, Fixed::ZERO);
        assert!(gun.ready());
        assert_eq!(gun.magazine, 3);
    }

    #[test]
    fn test_gun_fractional_fire() {
        let mut gun = GunState::new(10);
        // Quarter round per tick: one round every four ticks
        for _ in 0..4 {
            gun.tick(true, Fixed::from_num(0.25));
        }
        assert_eq!(gun.magazine, 9);
    }

    #[test]
    fn test_arena_ids_and_queries() {
        let mut arena = ActorArena::new();
        let a = arena.insert(actor_at(0, vec2(0, 0)));
        let b = arena.insert(actor_at(0, vec2(5, 0)));
        let c = arena.insert(actor_at(1, vec2(9, 0)));

        assert_eq!(arena.sorted_ids(), vec![a, b, c]);
        assert_eq!(arena.living_on_side(0), vec![a, b]);
        assert_eq!(arena.living_enemies_of(0), vec![c]);

        let (closest, _) = arena.closest_enemy(1, vec2(4, 0)).unwrap();
        assert_eq!(closest, b);

        arena.get_mut(b).unwrap().alive = false;
        let (closest, _) = arena.closest_enemy(1, vec2(4, 0)).unwrap();
        assert_eq!(closest, a);
    }
}
