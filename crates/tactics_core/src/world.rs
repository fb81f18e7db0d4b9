//! The simulation container and its tick pipeline.
//!
//! [`World`] owns every registry: actors, brains, covers, zones,
//! alerts, squad coordinators and live grenade dangers. One call to
//! [`World::tick`] runs the whole fixed-rate pipeline in spawn order:
//! expiry and alert delivery, perception and intake, squad collect and
//! resolve, decisions, then kinematic motor integration. Everything an
//! external engine needs comes back in [`TickEvents`]; everything it
//! knows goes in through the host calls.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actor::{Actor, ActorArena, ActorId, ActorSpawnParams, Side, Stance};
use crate::agent::Agent;
use crate::alert::{Alert, AlertBus, AlertId, AlertView};
use crate::brain::{next_state, AiState, Decision, StateReason};
use crate::config::{secs_to_ticks, AiConfig, TICK_RATE};
use crate::cover::{CoverArena, CoverId, CoverParams};
use crate::cover_search::{find_cover, is_valid_cover, CoverCandidate, CoverQuery};
use crate::error::{Result, TacticsError};
use crate::events::{AiEvent, MotorCommand, MoveSpeed, SquadMessage};
use crate::math::{Fixed, SimRng, Vec2Fixed};
use crate::nav::OcclusionGrid;
use crate::perception::{scan_enemies, schedule_next_scan};
use crate::situation::{Situation, SituationContext};
use crate::squad::SquadCoordinator;
use crate::threat::guess_position;
use crate::zone::{Rect, ZoneSet};

/// World construction parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Seed for all simulation randomness.
    pub seed: u64,
    /// Grid width in cells.
    pub grid_width: u32,
    /// Grid height in cells.
    pub grid_height: u32,
    /// Cell edge length in world units.
    #[serde(with = "crate::math::fixed_num_serde")]
    pub cell_size: Fixed,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            grid_width: 64,
            grid_height: 64,
            cell_size: Fixed::ONE,
        }
    }
}

/// A live blast hazard raised by the host or by a thrown grenade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GrenadeDanger {
    /// Blast center.
    pub position: Vec2Fixed,
    /// Radius agents must clear.
    #[serde(with = "crate::math::fixed_serde")]
    pub radius: Fixed,
    /// Tick the hazard goes away.
    pub expires: u64,
}

/// Everything one tick produced, for the host to mirror.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Observable notifications, in emission order.
    pub events: Vec<AiEvent>,
    /// Motor commands issued, already applied to the internal
    /// kinematic model.
    pub commands: Vec<(ActorId, MotorCommand)>,
}

/// Canonical serialized form: every map flattened into sorted
/// vectors so identical states produce identical bytes.
#[derive(Serialize, Deserialize)]
struct WorldSnapshot {
    tick: u64,
    config: AiConfig,
    rng: SimRng,
    grid: OcclusionGrid,
    actors: Vec<Actor>,
    next_actor_id: ActorId,
    agents: Vec<Agent>,
    covers: CoverArena,
    zones: ZoneSet,
    alerts: Vec<Alert>,
    next_alert_id: AlertId,
    squads: Vec<(Side, Vec<(ActorId, u64)>, Vec<ActorId>)>,
    dangers: Vec<GrenadeDanger>,
    gunfire: Vec<(ActorId, AlertId)>,
    pending: Vec<AiEvent>,
}

/// The simulation.
#[derive(Debug)]
pub struct World {
    config: AiConfig,
    grid: OcclusionGrid,
    actors: ActorArena,
    agents: HashMap<ActorId, Agent>,
    covers: CoverArena,
    zones: ZoneSet,
    alerts: AlertBus,
    squads: HashMap<Side, SquadCoordinator>,
    dangers: Vec<GrenadeDanger>,
    gunfire_alerts: HashMap<ActorId, AlertId>,
    rng: SimRng,
    tick: u64,
    pending_events: Vec<AiEvent>,
}

impl World {
    /// Build an empty world.
    pub fn new(config: AiConfig, world: WorldConfig) -> Result<Self> {
        config.validate()?;
        if world.grid_width == 0 || world.grid_height == 0 {
            return Err(TacticsError::InvalidGrid(format!(
                "grid must be non-empty, got {}x{}",
                world.grid_width, world.grid_height
            )));
        }
        if world.cell_size <= Fixed::ZERO {
            return Err(TacticsError::InvalidGrid(format!(
                "cell size must be positive, got {}",
                world.cell_size
            )));
        }

        Ok(Self {
            config,
            grid: OcclusionGrid::new(world.grid_width, world.grid_height, world.cell_size),
            actors: ActorArena::new(),
            agents: HashMap::new(),
            covers: CoverArena::new(),
            zones: ZoneSet::default(),
            alerts: AlertBus::new(),
            squads: HashMap::new(),
            dangers: Vec::new(),
            gunfire_alerts: HashMap::new(),
            rng: SimRng::new(world.seed),
            tick: 0,
            pending_events: Vec::new(),
        })
    }

    /// Current tick.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.tick
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// The occlusion grid.
    #[must_use]
    pub fn grid(&self) -> &OcclusionGrid {
        &self.grid
    }

    /// Mutable grid access for scene construction.
    pub fn grid_mut(&mut self) -> &mut OcclusionGrid {
        &mut self.grid
    }

    /// Look up an actor.
    pub fn actor(&self, id: ActorId) -> Result<&Actor> {
        self.actors.get(id).ok_or(TacticsError::ActorNotFound(id))
    }

    /// Look up an agent's brain state, if the actor has one.
    #[must_use]
    pub fn agent(&self, id: ActorId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// All actors.
    #[must_use]
    pub fn actors(&self) -> &ActorArena {
        &self.actors
    }

    /// All covers.
    #[must_use]
    pub fn covers(&self) -> &CoverArena {
        &self.covers
    }

    /// Live alerts.
    #[must_use]
    pub fn alerts(&self) -> &AlertBus {
        &self.alerts
    }

    /// Live grenade hazards.
    #[must_use]
    pub fn grenade_dangers(&self) -> &[GrenadeDanger] {
        &self.dangers
    }

    /// Aggression slots granted on a side this tick.
    #[must_use]
    pub fn granted_count(&self, side: Side) -> usize {
        self.squads.get(&side).map_or(0, SquadCoordinator::granted_count)
    }

    // ----- host calls -------------------------------------------------

    /// Spawn an actor; brained ones also get an agent.
    pub fn spawn_actor(&mut self, params: ActorSpawnParams) -> ActorId {
        let has_brain = params.has_brain;
        let side = params.side;
        let id = self.actors.insert(params.build(&self.config));
        if has_brain {
            self.agents.insert(id, Agent::new(id, self.tick));
            self.squads
                .entry(side)
                .or_insert_with(|| SquadCoordinator::new(&self.config.squad));
        }
        debug!(actor = id, side, has_brain, "actor spawned");
        id
    }

    /// Remove an actor and everything that references it.
    pub fn despawn(&mut self, id: ActorId) -> Result<()> {
        let actor = self
            .actors
            .remove(id)
            .ok_or(TacticsError::ActorNotFound(id))?;
        self.agents.remove(&id);
        self.covers.release_everywhere(id);
        self.gunfire_alerts.remove(&id);
        if let Some(squad) = self.squads.get_mut(&actor.side) {
            squad.remove_agent(id);
        }
        debug!(actor = id, "actor despawned");
        Ok(())
    }

    /// Kill an actor outright. The body stays in the world.
    pub fn kill(&mut self, id: ActorId) -> Result<()> {
        let side = {
            let actor = self
                .actors
                .get_mut(id)
                .ok_or(TacticsError::ActorNotFound(id))?;
            if !actor.alive {
                return Ok(());
            }
            actor.alive = false;
            actor.health.current = 0;
            actor.firing_at = None;
            actor.path.clear();
            actor.cover = None;
            actor.side
        };
        self.covers.release_everywhere(id);
        self.gunfire_alerts.remove(&id);
        if let Some(squad) = self.squads.get_mut(&side) {
            squad.remove_agent(id);
        }
        self.pending_events.push(AiEvent::Died { actor: id });
        debug!(actor = id, "actor killed");
        Ok(())
    }

    /// Apply damage from the host's ballistic model. Raises a pain
    /// alert and, when the victim is brained, a rough belief about the
    /// attacker plus a forced-aggression window.
    pub fn apply_damage(
        &mut self,
        id: ActorId,
        amount: u32,
        source: Option<ActorId>,
    ) -> Result<u32> {
        let now = self.tick;
        let (actual, dead, position) = {
            let actor = self
                .actors
                .get_mut(id)
                .ok_or(TacticsError::ActorNotFound(id))?;
            let actual = actor.health.apply_damage(amount);
            (actual, actor.health.is_dead(), actor.position)
        };

        if dead {
            self.kill(id)?;
            return Ok(actual);
        }

        // Pain is audible to nearby friends.
        self.alerts.post(
            position,
            self.config.perception.communication_distance,
            true,
            Some(id),
            true,
            now,
        );

        let attacker = source.and_then(|s| self.actors.get(s)).map(|a| a.position);
        if let Some(agent) = self.agents.get_mut(&id) {
            agent.forced_until = now + secs_to_ticks(self.config.squad.sustain_duration);
            if let (Some(source), Some(attacker_pos)) = (source, attacker) {
                let guessed =
                    guess_position(position, attacker_pos, &self.config.threat, &mut self.rng);
                agent.tracker.observe_indirect(Some(source), guessed, false, None, now);
                agent.note_lead(guessed, now);
            }
        }
        debug!(actor = id, amount = actual, "damage applied");
        Ok(actual)
    }

    /// Register a cover piece.
    pub fn add_cover(&mut self, params: CoverParams) -> CoverId {
        self.covers.insert(params, self.config.cover.tall_threshold)
    }

    /// Link two covers into a chain, left to right.
    pub fn link_covers(&mut self, left: CoverId, right: CoverId) -> Result<()> {
        if self.covers.get(left).is_none() {
            return Err(TacticsError::CoverNotFound(left));
        }
        if self.covers.get(right).is_none() {
            return Err(TacticsError::CoverNotFound(right));
        }
        self.covers.link(left, right);
        Ok(())
    }

    /// Add a rectangular sweep area for searches.
    pub fn add_search_zone(&mut self, min: Vec2Fixed, max: Vec2Fixed) {
        self.zones.add_search(Rect::new(min, max));
    }

    /// Add a rectangular sight attenuation area.
    pub fn add_vision_zone(&mut self, min: Vec2Fixed, max: Vec2Fixed, sight_multiplier: Fixed) {
        self.zones.add_vision(Rect::new(min, max), sight_multiplier);
    }

    /// Raise a blast hazard, fused per configuration.
    pub fn throw_grenade_danger(&mut self, position: Vec2Fixed, radius: Fixed) {
        self.dangers.push(GrenadeDanger {
            position,
            radius,
            expires: self.tick + secs_to_ticks(self.config.grenade.fuse),
        });
    }

    /// Inject a noise from outside the simulation.
    pub fn post_alert(
        &mut self,
        position: Vec2Fixed,
        radius: Fixed,
        hostile: bool,
        source: Option<ActorId>,
        direct: bool,
    ) -> AlertId {
        self.alerts.post(position, radius, hostile, source, direct, self.tick)
    }

    /// Drive a brainless actor directly.
    pub fn command_actor(&mut self, id: ActorId, command: MotorCommand) -> Result<()> {
        let Self {
            actors,
            grid,
            config,
            ..
        } = self;
        let actor = actors.get_mut(id).ok_or(TacticsError::ActorNotFound(id))?;
        perform(actor, grid, config, command);
        Ok(())
    }

    // ----- persistence ------------------------------------------------

    /// Serialize the whole simulation state canonically.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.make_snapshot())
            .map_err(|e| TacticsError::InvalidState(e.to_string()))
    }

    /// Replace the simulation state from a snapshot.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        let snap: WorldSnapshot = bincode::deserialize(bytes)
            .map_err(|e| TacticsError::InvalidState(e.to_string()))?;

        let squad_config = snap.config.squad;
        self.config = snap.config;
        self.grid = snap.grid;
        self.actors = ActorArena::import(snap.actors, snap.next_actor_id);
        self.agents = snap.agents.into_iter().map(|a| (a.id, a)).collect();
        self.covers = snap.covers;
        self.zones = snap.zones;
        self.alerts = AlertBus::import(snap.alerts, snap.next_alert_id);
        self.squads = snap
            .squads
            .into_iter()
            .map(|(side, sustained, granted)| {
                (side, SquadCoordinator::import(&squad_config, sustained, granted))
            })
            .collect();
        self.dangers = snap.dangers;
        self.gunfire_alerts = snap.gunfire.into_iter().collect();
        self.rng = snap.rng;
        self.tick = snap.tick;
        self.pending_events = snap.pending;
        Ok(())
    }

    /// Order-independent digest of the current state. Two worlds with
    /// the same hash went through the same history.
    pub fn state_hash(&self) -> Result<u64> {
        let bytes = self.snapshot()?;
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Ok(hasher.finish())
    }

    fn make_snapshot(&self) -> WorldSnapshot {
        let (actors, next_actor_id) = self.actors.export();
        let (alerts, next_alert_id) = self.alerts.export();

        let mut agent_ids: Vec<ActorId> = self.agents.keys().copied().collect();
        agent_ids.sort_unstable();
        let agents = agent_ids
            .iter()
            .filter_map(|id| self.agents.get(id).cloned())
            .collect();

        let mut sides: Vec<Side> = self.squads.keys().copied().collect();
        sides.sort_unstable();
        let squads = sides
            .into_iter()
            .filter_map(|side| {
                self.squads.get(&side).map(|s| {
                    let (sustained, granted) = s.export();
                    (side, sustained, granted)
                })
            })
            .collect();

        let mut gunfire: Vec<(ActorId, AlertId)> = self
            .gunfire_alerts
            .iter()
            .map(|(a, b)| (*a, *b))
            .collect();
        gunfire.sort_unstable();

        WorldSnapshot {
            tick: self.tick,
            config: self.config,
            rng: self.rng.clone(),
            grid: self.grid.clone(),
            actors,
            next_actor_id,
            agents,
            covers: self.covers.clone(),
            zones: self.zones.clone(),
            alerts,
            next_alert_id,
            squads,
            dangers: self.dangers.clone(),
            gunfire,
            pending: self.pending_events.clone(),
        }
    }

    // ----- the tick ---------------------------------------------------

    /// Advance the simulation one tick.
    pub fn tick(&mut self) -> TickEvents {
        self.tick += 1;
        let now = self.tick;
        let mut out = TickEvents::default();
        out.events.append(&mut self.pending_events);

        // Phase 1: expiry and alert delivery.
        self.alerts.expire(now);
        self.dangers.retain(|d| d.expires > now);
        let agent_ids = self.living_agent_ids();
        let listeners: Vec<(ActorId, Vec2Fixed, Fixed)> = agent_ids
            .iter()
            .filter_map(|id| {
                self.actors
                    .get(*id)
                    .map(|a| (*id, a.position, a.hearing))
            })
            .collect();
        let deliveries = self.alerts.deliver(&listeners);

        let mut outbox: Vec<(ActorId, SquadMessage)> = Vec::new();

        // Phase 2: perception and intake, spawn order.
        self.perception_phase(now, &agent_ids, &deliveries, &mut outbox, &mut out);

        // Phases 3 and 4: squad collect, then resolve.
        self.squad_phase(now, &agent_ids);

        // Phase 5: decisions.
        self.decision_phase(now, &agent_ids, &mut outbox, &mut out);

        // Phase 6: motor and weapon integration.
        self.motor_phase(now);

        // Queued messages land in inboxes for the next intake.
        for (target, message) in outbox {
            if let Some(agent) = self.agents.get_mut(&target) {
                agent.inbox.push(message);
            }
        }

        out
    }

    /// Brained, living actor ids in spawn order.
    fn living_agent_ids(&self) -> Vec<ActorId> {
        self.actors
            .sorted_ids()
            .into_iter()
            .filter(|id| {
                self.agents.contains_key(id)
                    && self.actors.get(*id).is_some_and(|a| a.alive)
            })
            .collect()
    }

    fn perception_phase(
        &mut self,
        now: u64,
        agent_ids: &[ActorId],
        deliveries: &[(ActorId, AlertView)],
        outbox: &mut Vec<(ActorId, SquadMessage)>,
        out: &mut TickEvents,
    ) {
        let Self {
            actors,
            agents,
            grid,
            zones,
            config,
            rng,
            ..
        } = self;

        for &id in agent_ids {
            let Some(agent) = agents.get_mut(&id) else {
                continue;
            };
            let Some(observer) = actors.get(id) else {
                continue;
            };
            agent.begin_tick();

            // Watch the tracked target die.
            if let Some(target) = agent.tracker.target() {
                let gone = actors.get(target).map_or(true, |a| !a.alive);
                if gone && agent.tracker.is_visible() {
                    let position = agent
                        .tracker
                        .belief()
                        .map_or(observer.position, |b| b.position);
                    agent.tracker.forget();
                    out.events.push(AiEvent::ThreatChanged {
                        agent: id,
                        threat: None,
                    });
                    for friend in friends_of(actors, agent_ids, id, config) {
                        outbox.push((
                            friend,
                            SquadMessage::FriendSawDeath {
                                victim: target,
                                position,
                            },
                        ));
                    }
                }
            }

            // Jittered re-scan.
            if now >= agent.next_scan {
                let outcome = scan_enemies(
                    actors,
                    grid,
                    zones,
                    observer,
                    &agent.visible_enemies,
                    &config.perception,
                );
                agent.next_scan = schedule_next_scan(now, &config.perception, rng);

                if let Some(closest) = closest_of(actors, &outcome.visible, observer.position) {
                    if let Some(target) = actors.get(closest) {
                        let changed =
                            agent
                                .tracker
                                .observe(closest, target.position, target.cover, now);
                        if changed {
                            out.events.push(AiEvent::ThreatChanged {
                                agent: id,
                                threat: Some(closest),
                            });
                        }
                        for friend in friends_of(actors, agent_ids, id, config) {
                            outbox.push((
                                friend,
                                SquadMessage::FriendFoundEnemy {
                                    friend: id,
                                    enemy: closest,
                                    position: target.position,
                                    seen_tick: now,
                                    cover: target.cover,
                                    ever_seen: true,
                                },
                            ));
                        }
                    }
                } else if agent.tracker.is_visible() {
                    agent.tracker.lose_sight();
                }
                agent.visible_enemies = outcome.visible;
            }

            // Alert intake.
            for (listener, view) in deliveries {
                if *listener != id {
                    continue;
                }
                agent.note_lead(view.position, now);
                // A direct hostile alert places its source.
                if view.hostile && view.direct {
                    if let Some(source) = view.source {
                        let is_enemy = actors
                            .get(source)
                            .is_some_and(|a| a.alive && a.side != observer.side);
                        if is_enemy {
                            let guessed =
                                guess_position(observer.position, view.position, &config.threat, rng);
                            let changed = agent
                                .tracker
                                .observe_indirect(Some(source), guessed, false, None, now);
                            if changed {
                                out.events.push(AiEvent::ThreatChanged {
                                    agent: id,
                                    threat: Some(source),
                                });
                            }
                        }
                    }
                }
            }

            // Squad message intake.
            let epsilon = secs_to_ticks(config.threat.share_epsilon);
            let inbox = std::mem::take(&mut agent.inbox);
            for message in inbox {
                match message {
                    SquadMessage::FriendFoundEnemy {
                        enemy,
                        position,
                        seen_tick,
                        cover,
                        ever_seen,
                        ..
                    } => {
                        let before = agent.tracker.target();
                        let adopted = agent.tracker.consider_friend_report(
                            Some(enemy),
                            position,
                            seen_tick,
                            cover,
                            ever_seen,
                            epsilon,
                        );
                        if adopted && agent.tracker.target() != before {
                            out.events.push(AiEvent::ThreatChanged {
                                agent: id,
                                threat: agent.tracker.target(),
                            });
                        }
                    }
                    SquadMessage::PointInvestigated { position, tick } => {
                        agent.planner.on_friend_investigated(position, tick, &config.search);
                    }
                    SquadMessage::FriendSawDeath { victim, .. } => {
                        if agent.tracker.target() == Some(victim) {
                            agent.tracker.forget();
                            out.events.push(AiEvent::ThreatChanged {
                                agent: id,
                                threat: None,
                            });
                        }
                    }
                    SquadMessage::FoundFriend { friend } => {
                        // Meeting a squadmate: pass on what we know.
                        if let Some(belief) = agent.tracker.belief() {
                            if let Some(enemy) = belief.target {
                                outbox.push((
                                    friend,
                                    SquadMessage::FriendFoundEnemy {
                                        friend: id,
                                        enemy,
                                        position: belief.position,
                                        seen_tick: belief.last_seen,
                                        cover: belief.cover,
                                        ever_seen: agent.tracker.has_ever_seen(),
                                    },
                                ));
                            }
                        }
                    }
                    SquadMessage::LostFriend { .. } => {}
                }
            }

            // Friend link changes.
            let current = friends_of(actors, agent_ids, id, config);
            for friend in &current {
                if !agent.friends.contains(friend) {
                    outbox.push((id, SquadMessage::FoundFriend { friend: *friend }));
                }
            }
            for friend in &agent.friends {
                if !current.contains(friend) {
                    outbox.push((id, SquadMessage::LostFriend { friend: *friend }));
                }
            }
            agent.friends = current;
        }
    }

    fn squad_phase(&mut self, now: u64, agent_ids: &[ActorId]) {
        let Self {
            actors,
            agents,
            squads,
            config,
            ..
        } = self;

        let mut sides: Vec<Side> = squads.keys().copied().collect();
        sides.sort_unstable();
        for side in &sides {
            if let Some(squad) = squads.get_mut(side) {
                squad.begin_tick(now);
            }
        }

        for &id in agent_ids {
            let Some(agent) = agents.get(&id) else {
                continue;
            };
            let Some(actor) = actors.get(id) else {
                continue;
            };
            let Some(belief) = agent.tracker.belief() else {
                continue;
            };
            let distance = actor.position.distance(belief.position);
            let forced =
                now < agent.forced_until || distance <= config.cover.avoid_distance;
            if let Some(squad) = squads.get_mut(&actor.side) {
                squad.check_in(id, belief.target.unwrap_or(0), distance, forced);
            }
        }

        for side in &sides {
            if let Some(squad) = squads.get_mut(side) {
                squad.resolve(now);
            }
        }
    }

    fn decision_phase(
        &mut self,
        now: u64,
        agent_ids: &[ActorId],
        outbox: &mut Vec<(ActorId, SquadMessage)>,
        out: &mut TickEvents,
    ) {
        for &id in agent_ids {
            let Self {
                actors,
                agents,
                covers,
                grid,
                zones,
                alerts,
                squads,
                dangers,
                config,
                ..
            } = self;

            {
                let Some(agent) = agents.get_mut(&id) else {
                    continue;
                };
                let Some(actor) = actors.get(id) else {
                    continue;
                };

                // Verify the active search point before deciding.
                if matches!(agent.state, AiState::Investigate | AiState::Follow)
                    && agent.planner.verify(grid, actor.position, actor.facing, &config.search)
                {
                    if let Some(position) = agent.planner.mark_investigated(now, &config.search) {
                        agent.point_just_cleared = true;
                        out.events.push(AiEvent::PointInvestigated {
                            agent: id,
                            position,
                        });
                        for friend in agent.friends.clone() {
                            outbox.push((
                                friend,
                                SquadMessage::PointInvestigated { position, tick: now },
                            ));
                        }
                    }
                }

                // Reaching the last known spot empty-handed checks it off.
                if let Some(belief) = agent.tracker.belief() {
                    if !belief.visible
                        && actor.position.distance(belief.position)
                            <= config.search.touch_distance
                    {
                        agent.spot_check_tick = Some(now);
                    }
                }
            }

            let (decision, situation) = {
                let Some(agent) = agents.get(&id) else {
                    continue;
                };
                let Some(actor) = actors.get(id) else {
                    continue;
                };

                let granted = squads
                    .get(&actor.side)
                    .is_some_and(|s| s.is_aggressive(id));
                let grenade_near = dangers
                    .iter()
                    .any(|d| d.position.distance(actor.position) <= d.radius);
                let threat_aggressive = agent
                    .tracker
                    .belief()
                    .and_then(|b| b.target)
                    .and_then(|t| actors.get(t))
                    .map_or(true, |t| t.aggressive);
                let grenade_throw =
                    grenade_opportunity(actors, agent, actor, now, config);

                let ctx = SituationContext {
                    now,
                    granted,
                    grenade_near,
                    grenade_throw,
                    threat_aggressive,
                };
                let situation = Situation::build(actor, agent, covers, grid, &ctx, config);
                (next_state(&situation, config), situation)
            };

            apply_decision(
                now, id, decision, &situation, actors, agents, covers, grid, zones, alerts,
                dangers, config, out,
            );
        }
    }

    fn motor_phase(&mut self, now: u64) {
        let Self {
            actors,
            alerts,
            gunfire_alerts,
            config,
            ..
        } = self;

        for id in actors.sorted_ids() {
            let Some(actor) = actors.get_mut(id) else {
                continue;
            };
            if !actor.alive {
                continue;
            }

            // Gunfire noise keeps one alert alive per shooter.
            let discharging = actor.firing_at.is_some() && actor.gun.ready();
            if discharging {
                let refreshed = gunfire_alerts
                    .get(&id)
                    .is_some_and(|alert| alerts.refresh(*alert, now));
                if !refreshed {
                    let alert = alerts.post(
                        actor.position,
                        config.combat.gunshot_radius,
                        true,
                        Some(id),
                        true,
                        now,
                    );
                    gunfire_alerts.insert(id, alert);
                }
            } else {
                gunfire_alerts.remove(&id);
            }

            actor
                .gun
                .tick(actor.firing_at.is_some(), config.combat.rounds_per_tick());

            // Kinematic step along the queued route.
            let speed = match actor.speed {
                MoveSpeed::Walk => config.motor.walk_speed,
                MoveSpeed::Run => config.motor.run_speed,
            } / Fixed::from_num(TICK_RATE);
            advance_along_path(actor, speed, config.motor.arrive_distance);

            // Weapon tracking overrides movement facing.
            if let Some(target) = actor.firing_at {
                let dir = actor.position.direction_to(target);
                if dir != Vec2Fixed::ZERO {
                    actor.facing = dir;
                }
            }
        }
    }
}

/// Same-side brained living actors within communication range,
/// ascending id order.
fn friends_of(
    actors: &ActorArena,
    agent_ids: &[ActorId],
    id: ActorId,
    config: &AiConfig,
) -> Vec<ActorId> {
    let Some(me) = actors.get(id) else {
        return Vec::new();
    };
    let range = config.perception.communication_distance;
    agent_ids
        .iter()
        .copied()
        .filter(|other| {
            *other != id
                && actors.get(*other).is_some_and(|a| {
                    a.alive
                        && a.side == me.side
                        && a.position.distance_squared(me.position) <= range * range
                })
        })
        .collect()
}

/// Closest of the given actors to a position. Ties resolve to the
/// lower id via ascending input order.
fn closest_of(actors: &ActorArena, ids: &[ActorId], position: Vec2Fixed) -> Option<ActorId> {
    let mut best: Option<(ActorId, Fixed)> = None;
    for &id in ids {
        let Some(actor) = actors.get(id) else {
            continue;
        };
        let dist_sq = actor.position.distance_squared(position);
        if best.map_or(true, |(_, d)| dist_sq < d) {
            best = Some((id, dist_sq));
        }
    }
    best.map(|(id, _)| id)
}

/// A grenade throw that passes every gate right now, if any.
fn grenade_opportunity(
    actors: &ActorArena,
    agent: &Agent,
    actor: &Actor,
    now: u64,
    config: &AiConfig,
) -> Option<Vec2Fixed> {
    let belief = agent.tracker.belief()?;
    if belief.visible || actor.grenades == 0 || now < agent.next_grenade_ok {
        return None;
    }
    let target = belief.position;
    let distance = actor.position.distance(target);
    if distance < config.grenade.min_distance || distance > config.grenade.max_distance {
        return None;
    }
    let blast = config.grenade.blast_radius;
    let friend_in_blast = actors.living_on_side(actor.side).into_iter().any(|id| {
        id != actor.id
            && actors
                .get(id)
                .is_some_and(|a| a.position.distance_squared(target) <= blast * blast)
    });
    if friend_in_blast {
        return None;
    }
    Some(target)
}

/// Push a motor command to the host mirror and realize it on the
/// internal kinematic model.
fn issue(
    id: ActorId,
    command: MotorCommand,
    actor: &mut Actor,
    grid: &OcclusionGrid,
    config: &AiConfig,
    out: &mut TickEvents,
) {
    out.commands.push((id, command));
    perform(actor, grid, config, command);
}

/// Realize one motor command on the kinematic model.
fn perform(actor: &mut Actor, grid: &OcclusionGrid, config: &AiConfig, command: MotorCommand) {
    match command {
        MotorCommand::MoveTo { position, speed } => {
            actor.speed = speed;
            route(actor, grid, position);
        }
        MotorCommand::MoveAwayFrom { position, speed } => {
            let mut dir = (actor.position - position).normalize();
            if dir == Vec2Fixed::ZERO {
                dir = actor.facing;
            }
            let hop = actor.position + dir * config.cover.avoid_distance;
            actor.speed = speed;
            route(actor, grid, hop);
        }
        MotorCommand::Circle { pivot } => {
            let dir = actor.position.direction_to(pivot);
            let tangent = dir.perp_left();
            let step = actor.position + tangent * Fixed::from_num(2);
            actor.path = vec![step];
        }
        MotorCommand::EnterCover { position, .. } => {
            actor.speed = MoveSpeed::Run;
            route(actor, grid, position);
        }
        MotorCommand::LeaveCover => {
            actor.stance = Stance::Standing;
        }
        MotorCommand::AimAt { position } | MotorCommand::FaceAt { position } => {
            let dir = actor.position.direction_to(position);
            if dir != Vec2Fixed::ZERO {
                actor.facing = dir;
            }
        }
        MotorCommand::OpenFire { position } => {
            actor.firing_at = Some(position);
            let dir = actor.position.direction_to(position);
            if dir != Vec2Fixed::ZERO {
                actor.facing = dir;
            }
        }
        MotorCommand::CeaseFire => {
            actor.firing_at = None;
        }
        MotorCommand::Reload => {
            actor.gun.start_reload(config.combat.reload_ticks());
        }
        MotorCommand::ThrowGrenade { .. } => {}
        MotorCommand::Stop => {
            actor.path.clear();
        }
    }
}

/// Queue a route, straight-line fallback when pathing fails.
fn route(actor: &mut Actor, grid: &OcclusionGrid, position: Vec2Fixed) {
    actor.path = grid
        .find_path(actor.position, position)
        .unwrap_or_else(|| vec![position]);
}

/// Advance along the queued route by one tick's travel.
fn advance_along_path(actor: &mut Actor, step: Fixed, arrive: Fixed) {
    let mut remaining = step;
    while remaining > Fixed::ZERO {
        let Some(&target) = actor.path.first() else {
            break;
        };
        let dist = actor.position.distance(target);
        let dir = actor.position.direction_to(target);
        if dist <= arrive || dist <= remaining {
            actor.position = target;
            actor.path.remove(0);
            remaining -= dist;
        } else {
            actor.position = actor.position + dir * remaining;
            remaining = Fixed::ZERO;
        }
        if dir != Vec2Fixed::ZERO {
            actor.facing = dir;
        }
    }
}

/// Apply one decision: state bookkeeping, entry and exit effects, and
/// the per-tick upkeep of the continuing state.
#[allow(clippy::too_many_arguments)]
fn apply_decision(
    now: u64,
    id: ActorId,
    decision: Decision,
    situation: &Situation,
    actors: &mut ActorArena,
    agents: &mut HashMap<ActorId, Agent>,
    covers: &mut CoverArena,
    grid: &OcclusionGrid,
    zones: &ZoneSet,
    alerts: &mut AlertBus,
    dangers: &mut Vec<GrenadeDanger>,
    config: &AiConfig,
    out: &mut TickEvents,
) {
    let Some(agent) = agents.get_mut(&id) else {
        return;
    };
    let Some(actor) = actors.get_mut(id) else {
        return;
    };

    let old = agent.state;
    let changed = decision.state != old;

    if !changed && !decision.restart {
        continue_state(now, id, situation, agent, actor, covers, grid, zones, alerts, dangers, config, out);
        return;
    }

    if changed {
        // Exit effects.
        if old == AiState::FireInCover && actor.firing_at.is_some() {
            issue(id, MotorCommand::CeaseFire, actor, grid, config, out);
        }
        out.events.push(AiEvent::StateChanged {
            agent: id,
            from: old,
            to: decision.state,
            reason: decision.reason,
        });
        debug!(
            agent = id,
            from = ?old,
            to = ?decision.state,
            reason = ?decision.reason,
            "state changed"
        );
    }
    agent.enter_state(decision.state, decision.reason, now);

    enter_state_effects(now, id, situation, agent, actor, covers, grid, zones, dangers, config, out);
}

/// Entry effects for the state just entered or restarted.
#[allow(clippy::too_many_arguments)]
fn enter_state_effects(
    now: u64,
    id: ActorId,
    situation: &Situation,
    agent: &mut Agent,
    actor: &mut Actor,
    covers: &mut CoverArena,
    grid: &OcclusionGrid,
    zones: &ZoneSet,
    dangers: &[GrenadeDanger],
    config: &AiConfig,
    out: &mut TickEvents,
) {
    let threat_pos = situation.threat.as_ref().map(|t| t.position);

    match agent.state {
        AiState::None => {
            issue(id, MotorCommand::Stop, actor, grid, config, out);
        }
        AiState::Patrol => {
            cease_fire(id, actor, grid, config, out);
            release_claim(id, agent, actor, covers, grid, config, out);
            actor.stance = Stance::Standing;
            if !actor.patrol.is_empty() {
                let waypoint = actor.patrol[actor.patrol_index % actor.patrol.len()];
                issue(
                    id,
                    MotorCommand::MoveTo {
                        position: waypoint.position,
                        speed: MoveSpeed::Walk,
                    },
                    actor,
                    grid,
                    config,
                    out,
                );
            }
        }
        AiState::PatrolPause => {
            cease_fire(id, actor, grid, config, out);
            issue(id, MotorCommand::Stop, actor, grid, config, out);
            actor.stance = Stance::Standing;
            if agent.reason == StateReason::Arrived && !actor.patrol.is_empty() {
                let len = actor.patrol.len();
                let waypoint = actor.patrol[actor.patrol_index % len];
                let pause = waypoint
                    .pause
                    .map_or(config.combat.stand_ticks(), secs_to_ticks);
                agent.patrol_pause_left = Some(pause);
                actor.patrol_index = (actor.patrol_index + 1) % len;
            } else {
                agent.patrol_pause_left = None;
            }
        }
        AiState::TakeAnyCover => {
            cease_fire(id, actor, grid, config, out);
            actor.stance = Stance::Standing;
            let Some(threat) = threat_pos else {
                return;
            };
            let keep = situation.has_target_cover && situation.target_cover_valid;
            if keep {
                if let Some(candidate) = agent.target_cover {
                    if !situation.in_cover {
                        issue(
                            id,
                            MotorCommand::EnterCover {
                                cover: candidate.cover,
                                position: candidate.position,
                            },
                            actor,
                            grid,
                            config,
                            out,
                        );
                    }
                }
            } else {
                release_claim(id, agent, actor, covers, grid, config, out);
                match find_cover(covers, grid, actor, threat, true, None, &config.cover) {
                    Some(candidate) => {
                        claim(id, candidate, agent, actor, covers);
                        issue(
                            id,
                            MotorCommand::EnterCover {
                                cover: candidate.cover,
                                position: candidate.position,
                            },
                            actor,
                            grid,
                            config,
                            out,
                        );
                    }
                    None => {
                        agent.cover_fails += 1;
                        debug!(agent = id, fails = agent.cover_fails, "no usable cover");
                        issue(id, MotorCommand::Stop, actor, grid, config, out);
                    }
                }
            }
        }
        AiState::TakeBetterCover => {
            cease_fire(id, actor, grid, config, out);
            actor.stance = Stance::Standing;
            agent.bursts_done = 0;
            let Some(threat) = threat_pos else {
                return;
            };
            let exclude = agent.target_cover.map(|c| c.cover);
            match find_cover(covers, grid, actor, threat, true, exclude, &config.cover) {
                Some(candidate) => {
                    release_claim(id, agent, actor, covers, grid, config, out);
                    claim(id, candidate, agent, actor, covers);
                    issue(
                        id,
                        MotorCommand::EnterCover {
                            cover: candidate.cover,
                            position: candidate.position,
                        },
                        actor,
                        grid,
                        config,
                        out,
                    );
                }
                None => {
                    agent.cover_fails += 1;
                    debug!(agent = id, fails = agent.cover_fails, "no better cover");
                    if agent.target_cover.is_some() && !situation.in_cover {
                        if let Some(candidate) = agent.target_cover {
                            issue(
                                id,
                                MotorCommand::EnterCover {
                                    cover: candidate.cover,
                                    position: candidate.position,
                                },
                                actor,
                                grid,
                                config,
                                out,
                            );
                        }
                    }
                }
            }
        }
        AiState::FireInCover => {
            agent.bursts_done += 1;
            actor.stance = Stance::Standing;
            if let Some(threat) = threat_pos {
                issue(id, MotorCommand::OpenFire { position: threat }, actor, grid, config, out);
            }
        }
        AiState::HideInCover => {
            cease_fire(id, actor, grid, config, out);
            set_cover_stance(agent, actor, covers);
            if !situation.in_cover {
                if let Some(candidate) = agent.target_cover {
                    issue(
                        id,
                        MotorCommand::EnterCover {
                            cover: candidate.cover,
                            position: candidate.position,
                        },
                        actor,
                        grid,
                        config,
                        out,
                    );
                }
            } else if let Some(threat) = threat_pos {
                issue(id, MotorCommand::FaceAt { position: threat }, actor, grid, config, out);
            }
        }
        AiState::Reload => {
            cease_fire(id, actor, grid, config, out);
            set_cover_stance(agent, actor, covers);
            issue(id, MotorCommand::Reload, actor, grid, config, out);
        }
        AiState::Investigate => {
            cease_fire(id, actor, grid, config, out);
            release_claim(id, agent, actor, covers, grid, config, out);
            actor.stance = Stance::Standing;
            if agent.planner.is_exhausted() {
                agent
                    .planner
                    .regenerate(covers, zones, grid, &config.cover, &config.search, now);
            }
            if situation.new_alert {
                if let Some(lead) = agent.lead {
                    agent.planner.refocus(lead.position);
                }
            }
            agent.planner.select_next(actor.position, &config.search);
            match agent.planner.plan_move(grid, actor.position, &config.search) {
                Some(plan) => {
                    issue(
                        id,
                        MotorCommand::MoveTo {
                            position: plan.target,
                            speed: if plan.walk { MoveSpeed::Walk } else { MoveSpeed::Run },
                        },
                        actor,
                        grid,
                        config,
                        out,
                    );
                }
                None => {
                    if let Some(lead) = agent.lead {
                        issue(
                            id,
                            MotorCommand::MoveTo {
                                position: lead.position,
                                speed: MoveSpeed::Walk,
                            },
                            actor,
                            grid,
                            config,
                            out,
                        );
                    }
                }
            }
        }
        AiState::Follow => {
            cease_fire(id, actor, grid, config, out);
            release_claim(id, agent, actor, covers, grid, config, out);
            actor.stance = Stance::Standing;
            if agent.planner.is_exhausted() {
                agent
                    .planner
                    .regenerate(covers, zones, grid, &config.cover, &config.search, now);
            }
            if let Some(threat) = threat_pos {
                agent.planner.refocus(threat);
                let distance = actor.position.distance(threat);
                if distance > config.combat.follow_distance {
                    issue(
                        id,
                        MotorCommand::MoveTo {
                            position: threat,
                            speed: MoveSpeed::Run,
                        },
                        actor,
                        grid,
                        config,
                        out,
                    );
                }
            }
        }
        AiState::Approach => {
            release_claim(id, agent, actor, covers, grid, config, out);
            actor.stance = Stance::Standing;
            agent.cover_fails = 0;
            if let Some(threat) = threat_pos {
                issue(
                    id,
                    MotorCommand::MoveTo {
                        position: threat,
                        speed: MoveSpeed::Run,
                    },
                    actor,
                    grid,
                    config,
                    out,
                );
            }
        }
        AiState::Retreat => {
            cease_fire(id, actor, grid, config, out);
            release_claim(id, agent, actor, covers, grid, config, out);
            actor.stance = Stance::Standing;
            match threat_pos {
                Some(threat) => {
                    match retreat_cover(id, actor, covers, grid, threat, config) {
                        Some(candidate) => {
                            claim(id, candidate, agent, actor, covers);
                            issue(
                                id,
                                MotorCommand::EnterCover {
                                    cover: candidate.cover,
                                    position: candidate.position,
                                },
                                actor,
                                grid,
                                config,
                                out,
                            );
                        }
                        None => {
                            agent.last_retreat_fail = Some(now);
                            agent.cover_fails += 1;
                            debug!(agent = id, "retreat found no cover");
                            issue(
                                id,
                                MotorCommand::MoveAwayFrom {
                                    position: threat,
                                    speed: MoveSpeed::Run,
                                },
                                actor,
                                grid,
                                config,
                                out,
                            );
                        }
                    }
                }
                None => {
                    // Nothing located to run from: hunker down.
                    issue(id, MotorCommand::Stop, actor, grid, config, out);
                    actor.stance = Stance::Crouching;
                }
            }
        }
        AiState::AvoidGrenade => {
            cease_fire(id, actor, grid, config, out);
            release_claim(id, agent, actor, covers, grid, config, out);
            actor.stance = Stance::Standing;
            let nearest = dangers
                .iter()
                .min_by_key(|d| d.position.distance_squared(actor.position));
            if let Some(danger) = nearest {
                let position = danger.position;
                issue(
                    id,
                    MotorCommand::MoveAwayFrom {
                        position,
                        speed: MoveSpeed::Run,
                    },
                    actor,
                    grid,
                    config,
                    out,
                );
            }
        }
    }
}

/// Per-tick upkeep while a state continues unchanged.
#[allow(clippy::too_many_arguments)]
fn continue_state(
    now: u64,
    id: ActorId,
    situation: &Situation,
    agent: &mut Agent,
    actor: &mut Actor,
    covers: &mut CoverArena,
    grid: &OcclusionGrid,
    zones: &ZoneSet,
    alerts: &mut AlertBus,
    dangers: &mut Vec<GrenadeDanger>,
    config: &AiConfig,
    out: &mut TickEvents,
) {
    let threat_pos = situation.threat.as_ref().map(|t| t.position);

    match agent.state {
        AiState::PatrolPause => {
            if let Some(left) = agent.patrol_pause_left {
                agent.patrol_pause_left = Some(left.saturating_sub(1));
            }
        }
        AiState::Investigate | AiState::Follow => {
            if agent.planner.is_exhausted() {
                agent
                    .planner
                    .regenerate(covers, zones, grid, &config.cover, &config.search, now);
            }
            agent.planner.select_next(actor.position, &config.search);
            if actor.path.is_empty() {
                match agent.planner.plan_move(grid, actor.position, &config.search) {
                    Some(plan) => {
                        issue(
                            id,
                            MotorCommand::MoveTo {
                                position: plan.target,
                                speed: if plan.walk { MoveSpeed::Walk } else { MoveSpeed::Run },
                            },
                            actor,
                            grid,
                            config,
                            out,
                        );
                    }
                    None => match agent.state {
                        AiState::Follow => {
                            if let Some(threat) = threat_pos {
                                if actor.position.distance(threat) > config.combat.follow_distance
                                {
                                    issue(
                                        id,
                                        MotorCommand::MoveTo {
                                            position: threat,
                                            speed: MoveSpeed::Run,
                                        },
                                        actor,
                                        grid,
                                        config,
                                        out,
                                    );
                                }
                            }
                        }
                        _ => {
                            // Walk out the lead itself, then let it go.
                            if let Some(lead) = agent.lead {
                                if actor.position.distance(lead.position)
                                    > config.search.touch_distance
                                {
                                    issue(
                                        id,
                                        MotorCommand::MoveTo {
                                            position: lead.position,
                                            speed: MoveSpeed::Walk,
                                        },
                                        actor,
                                        grid,
                                        config,
                                        out,
                                    );
                                } else {
                                    agent.lead = None;
                                }
                            }
                        }
                    },
                }
            }
        }
        AiState::Approach => {
            let Some(threat) = threat_pos else {
                return;
            };
            let visible = situation.threat.as_ref().is_some_and(|t| t.visible);
            let distance = actor.position.distance(threat);
            if visible && distance <= config.combat.circle_distance {
                issue(id, MotorCommand::Circle { pivot: threat }, actor, grid, config, out);
            } else if actor.path.is_empty() {
                issue(
                    id,
                    MotorCommand::MoveTo {
                        position: threat,
                        speed: MoveSpeed::Run,
                    },
                    actor,
                    grid,
                    config,
                    out,
                );
            }
            if visible && actor.gun.ready() {
                if actor.firing_at != Some(threat) {
                    issue(id, MotorCommand::OpenFire { position: threat }, actor, grid, config, out);
                }
            } else if actor.firing_at.is_some() && !visible {
                issue(id, MotorCommand::CeaseFire, actor, grid, config, out);
            }
        }
        AiState::FireInCover => {
            if let Some(threat) = threat_pos {
                if actor.firing_at != Some(threat) {
                    issue(id, MotorCommand::OpenFire { position: threat }, actor, grid, config, out);
                }
            }
            throw_grenade_if_ready(now, id, situation, agent, actor, alerts, dangers, config, out);
        }
        AiState::HideInCover => {
            if !situation.in_cover {
                if let Some(candidate) = agent.target_cover {
                    if actor.path.is_empty() {
                        issue(
                            id,
                            MotorCommand::EnterCover {
                                cover: candidate.cover,
                                position: candidate.position,
                            },
                            actor,
                            grid,
                            config,
                            out,
                        );
                    }
                }
            }
            throw_grenade_if_ready(now, id, situation, agent, actor, alerts, dangers, config, out);
        }
        AiState::Retreat => {
            if actor.path.is_empty() && agent.target_cover.is_none() {
                actor.stance = Stance::Crouching;
            }
        }
        AiState::AvoidGrenade => {
            if actor.path.is_empty() {
                let nearest = dangers
                    .iter()
                    .filter(|d| d.position.distance(actor.position) <= d.radius)
                    .min_by_key(|d| d.position.distance_squared(actor.position));
                if let Some(danger) = nearest {
                    let position = danger.position;
                    issue(
                        id,
                        MotorCommand::MoveAwayFrom {
                            position,
                            speed: MoveSpeed::Run,
                        },
                        actor,
                        grid,
                        config,
                        out,
                    );
                }
            }
        }
        _ => {}
    }
}

/// Throw at the pre-validated target, spawning the hazard and the
/// landing noise.
#[allow(clippy::too_many_arguments)]
fn throw_grenade_if_ready(
    now: u64,
    id: ActorId,
    situation: &Situation,
    agent: &mut Agent,
    actor: &mut Actor,
    alerts: &mut AlertBus,
    dangers: &mut Vec<GrenadeDanger>,
    config: &AiConfig,
    out: &mut TickEvents,
) {
    let Some(target) = situation.grenade_throw else {
        return;
    };
    actor.grenades = actor.grenades.saturating_sub(1);
    agent.next_grenade_ok = now + config.grenade.cooldown_ticks();
    out.commands.push((id, MotorCommand::ThrowGrenade { target }));
    out.events.push(AiEvent::GrenadeThrown { agent: id, target });
    dangers.push(GrenadeDanger {
        position: target,
        radius: config.grenade.blast_radius,
        expires: now + secs_to_ticks(config.grenade.fuse),
    });
    alerts.post(
        target,
        config.perception.communication_distance,
        true,
        Some(id),
        false,
        now,
    );
    debug!(agent = id, ?target, left = actor.grenades, "grenade thrown");
}

/// Stop shooting, mirroring the command when the weapon was live.
fn cease_fire(
    id: ActorId,
    actor: &mut Actor,
    grid: &OcclusionGrid,
    config: &AiConfig,
    out: &mut TickEvents,
) {
    if actor.firing_at.is_some() {
        issue(id, MotorCommand::CeaseFire, actor, grid, config, out);
    }
}

/// Register a slot claim on both sides of the actor/cover link.
fn claim(
    id: ActorId,
    candidate: CoverCandidate,
    agent: &mut Agent,
    actor: &mut Actor,
    covers: &mut CoverArena,
) {
    if let Some(cover) = covers.get_mut(candidate.cover) {
        cover.register_user(id, candidate.position);
    }
    actor.cover = Some(candidate.cover);
    agent.target_cover = Some(candidate);
    agent.cover_fails = 0;
    agent.bursts_done = 0;
}

/// Drop the current claim, if any.
fn release_claim(
    id: ActorId,
    agent: &mut Agent,
    actor: &mut Actor,
    covers: &mut CoverArena,
    grid: &OcclusionGrid,
    config: &AiConfig,
    out: &mut TickEvents,
) {
    if agent.target_cover.take().is_some() {
        covers.release_everywhere(id);
        actor.cover = None;
        issue(id, MotorCommand::LeaveCover, actor, grid, config, out);
    }
}

/// Crouch behind low cover, stand at tall cover corners.
fn set_cover_stance(agent: &Agent, actor: &mut Actor, covers: &CoverArena) {
    let low = agent
        .target_cover
        .as_ref()
        .and_then(|c| covers.get(c.cover))
        .is_some_and(|c| !c.is_tall());
    actor.stance = if low { Stance::Crouching } else { Stance::Standing };
}

/// Nearest valid cover that also puts distance between the seeker and
/// the threat.
fn retreat_cover(
    id: ActorId,
    actor: &Actor,
    covers: &CoverArena,
    grid: &OcclusionGrid,
    threat: Vec2Fixed,
    config: &AiConfig,
) -> Option<CoverCandidate> {
    let own_distance = actor.position.distance_squared(threat);
    let mut query = CoverQuery::new();
    query.reset(
        covers,
        id,
        actor.position,
        config.cover.max_cover_distance,
        &config.cover,
    );
    query
        .candidates()
        .iter()
        .find(|candidate| {
            candidate.position.distance_squared(threat) > own_distance
                && is_valid_cover(covers, grid, candidate, actor, threat, true, &config.cover)
        })
        .copied()
}
