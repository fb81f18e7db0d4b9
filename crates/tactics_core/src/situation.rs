//! The per-tick decision snapshot.
//!
//! A [`Situation`] is a plain value rebuilt from scratch every tick:
//! belief, body state, squad verdict and timers flattened into the
//! booleans and numbers the transition function actually reads.
//! Nothing in it borrows the world, so the transition stays pure and
//! trivially testable.

use crate::actor::{Actor, ActorId};
use crate::agent::Agent;
use crate::brain::{AiState, StateReason};
use crate::config::AiConfig;
use crate::cover::{CoverArena, CoverId};
use crate::cover_search::is_valid_cover;
use crate::math::{Fixed, Vec2Fixed};
use crate::nav::OcclusionGrid;

/// Flattened view of the tracked threat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreatView {
    /// Believed actor, if identified.
    pub target: Option<ActorId>,
    /// Believed position.
    pub position: Vec2Fixed,
    /// In sight right now.
    pub visible: bool,
    /// Position is ground truth rather than a guess.
    pub actual: bool,
    /// Ticks since the belief was last confirmed.
    pub age: u64,
    /// Cover the threat is believed to hold.
    pub cover: Option<CoverId>,
    /// Distance from the agent to the believed position.
    pub distance: Fixed,
    /// The threat is fighting back rather than fleeing.
    pub aggressive: bool,
}

/// Facts only the world can compute for the agent.
#[derive(Debug, Clone, Copy)]
pub struct SituationContext {
    /// Current tick.
    pub now: u64,
    /// Squad granted aggression this tick.
    pub granted: bool,
    /// A live grenade danger overlaps the agent.
    pub grenade_near: bool,
    /// Pre-validated grenade throw target, if all gates passed.
    pub grenade_throw: Option<Vec2Fixed>,
    /// The tracked threat actor is still fighting back.
    pub threat_aggressive: bool,
}

/// Everything the transition function reads, as one value.
#[derive(Debug, Clone, Copy)]
pub struct Situation {
    /// Current tick.
    pub now: u64,
    /// State being evaluated.
    pub state: AiState,
    /// Reason that state was entered.
    pub reason: StateReason,
    /// Whole ticks spent in it.
    pub ticks_in_state: u64,
    /// Tracked threat, if any.
    pub threat: Option<ThreatView>,
    /// The threat's last known spot was visited and found empty.
    pub spot_checked: bool,
    /// A lead newer than the spot check exists.
    pub fresh_lead: bool,
    /// Any lead worth investigating exists.
    pub has_investigation: bool,
    /// A new lead arrived this tick.
    pub new_alert: bool,
    /// A search point was verified this tick.
    pub point_just_cleared: bool,
    /// Remaining health fraction.
    pub health_ratio: Fixed,
    /// The last retreat search failed inside the grace window.
    pub retreat_blocked: bool,
    /// Standing on a claimed slot, registered on the cover.
    pub in_cover: bool,
    /// A slot is claimed, possibly still en route.
    pub has_target_cover: bool,
    /// The claimed slot still passes validation against the threat.
    pub target_cover_valid: bool,
    /// The motor finished its current move.
    pub at_target: bool,
    /// Weapon can fire right now.
    pub gun_ready: bool,
    /// Magazine is empty.
    pub needs_reload: bool,
    /// Magazine swap in progress.
    pub reloading: bool,
    /// Fire windows spent at the current position.
    pub bursts_done: u32,
    /// Squad granted aggression this tick.
    pub granted: bool,
    /// A live grenade danger overlaps the agent.
    pub grenade_near: bool,
    /// Pre-validated grenade throw target.
    pub grenade_throw: Option<Vec2Fixed>,
    /// Consecutive failed cover searches.
    pub cover_fails: u32,
    /// The threat has stayed hidden past the patience window.
    pub irritated: bool,
    /// The actor has patrol waypoints.
    pub has_waypoints: bool,
    /// Remaining ticks of the current patrol pause.
    pub pause_remaining: Option<u64>,
}

impl Default for Situation {
    fn default() -> Self {
        Self {
            now: 0,
            state: AiState::None,
            reason: StateReason::None,
            ticks_in_state: 0,
            threat: None,
            spot_checked: false,
            fresh_lead: false,
            has_investigation: false,
            new_alert: false,
            point_just_cleared: false,
            health_ratio: Fixed::ONE,
            retreat_blocked: false,
            in_cover: false,
            has_target_cover: false,
            target_cover_valid: true,
            at_target: true,
            gun_ready: true,
            needs_reload: false,
            reloading: false,
            bursts_done: 0,
            granted: true,
            grenade_near: false,
            grenade_throw: None,
            cover_fails: 0,
            irritated: false,
            has_waypoints: false,
            pause_remaining: None,
        }
    }
}

impl Situation {
    /// Build the snapshot for one agent. Pure: reads everything,
    /// mutates nothing.
    #[must_use]
    pub fn build(
        actor: &Actor,
        agent: &Agent,
        covers: &CoverArena,
        grid: &OcclusionGrid,
        ctx: &SituationContext,
        config: &AiConfig,
    ) -> Self {
        let now = ctx.now;

        let threat = agent.tracker.belief().map(|belief| ThreatView {
            target: belief.target,
            position: belief.position,
            visible: belief.visible,
            actual: belief.actual,
            age: now.saturating_sub(belief.last_seen),
            cover: belief.cover,
            distance: actor.position.distance(belief.position),
            aggressive: ctx.threat_aggressive,
        });

        let target_cover_valid = match (&agent.target_cover, &threat) {
            (Some(candidate), Some(view)) => {
                is_valid_cover(covers, grid, candidate, actor, view.position, false, &config.cover)
            }
            // With no threat there is nothing to validate against.
            _ => true,
        };

        let in_cover = actor.cover.is_some()
            && agent
                .target_cover
                .as_ref()
                .is_some_and(|c| actor.cover == Some(c.cover))
            && actor.path.is_empty();

        let irritated = threat.as_ref().is_some_and(|view| {
            !view.visible && view.age >= config.combat.irritation_ticks()
        });

        let retreat_blocked = agent.last_retreat_fail.is_some_and(|tick| {
            now.saturating_sub(tick) < config.combat.retreat_grace_ticks()
        });

        Self {
            now,
            state: agent.state,
            reason: agent.reason,
            ticks_in_state: agent.ticks_in_state(now),
            threat,
            spot_checked: agent.spot_checked(),
            fresh_lead: agent.fresh_lead(),
            has_investigation: agent.lead.is_some(),
            new_alert: agent.new_alert,
            point_just_cleared: agent.point_just_cleared,
            health_ratio: actor.health.fraction(),
            retreat_blocked,
            in_cover,
            has_target_cover: agent.target_cover.is_some(),
            target_cover_valid,
            at_target: actor.path.is_empty(),
            gun_ready: actor.gun.ready(),
            needs_reload: actor.gun.needs_reload(),
            reloading: actor.gun.is_reloading(),
            bursts_done: agent.bursts_done,
            granted: ctx.granted,
            grenade_near: ctx.grenade_near,
            grenade_throw: ctx.grenade_throw,
            cover_fails: agent.cover_fails,
            irritated,
            has_waypoints: !actor.patrol.is_empty(),
            pause_remaining: agent.patrol_pause_left,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorSpawnParams;
    use crate::cover::CoverParams;
    use crate::cover_search::CoverCandidate;

    fn fixed(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: f64, y: f64) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn open_grid() -> OcclusionGrid {
        OcclusionGrid::new(64, 64, Fixed::ONE)
    }

    #[test]
    fn test_build_reflects_belief_and_timers() {
        let grid = open_grid();
        let covers = CoverArena::new();
        let config = AiConfig::default();

        let mut arena = crate::actor::ActorArena::new();
        let id = arena.insert(ActorSpawnParams::fighter(0, vec2(10.0, 10.0)).build(&config));
        let actor = arena.get(id).expect("actor");

        let mut agent = Agent::new(id, 0);
        agent.tracker.observe(99, vec2(20.0, 10.0), None, 40);
        agent.tracker.lose_sight();
        agent.enter_state(AiState::HideInCover, StateReason::PeekDone, 90);

        let ctx = SituationContext {
            now: 100,
            granted: true,
            grenade_near: false,
            grenade_throw: None,
            threat_aggressive: true,
        };
        let situation = Situation::build(actor, &agent, &covers, &grid, &ctx, &config);

        assert_eq!(situation.ticks_in_state, 10);
        let view = situation.threat.expect("threat view");
        assert_eq!(view.age, 60);
        assert!(!view.visible);
        let epsilon = Fixed::from_num(1) / fixed(10000.0);
        assert!((view.distance - fixed(10.0)).abs() < epsilon);
        // Patience window is 15s = 300 ticks; 60 is well inside.
        assert!(!situation.irritated);
    }

    #[test]
    fn test_claimed_slot_revalidated_against_threat() {
        let grid = open_grid();
        let mut covers = CoverArena::new();
        let config = AiConfig::default();
        // Low wall at (30, 30) protecting the north side.
        let cover = covers.insert(
            CoverParams {
                position: vec2(30.0, 30.0),
                forward: vec2(0.0, 1.0),
                width: fixed(4.0),
                height: fixed(1.0),
            },
            config.cover.tall_threshold,
        );

        let mut arena = crate::actor::ActorArena::new();
        let id = arena.insert(ActorSpawnParams::fighter(0, vec2(30.0, 28.0)).build(&config));
        let actor = arena.get(id).expect("actor");

        let mut agent = Agent::new(id, 0);
        agent.target_cover = Some(CoverCandidate {
            cover,
            position: vec2(30.0, 29.0),
            corner: None,
            distance: fixed(1.0),
        });

        let base = SituationContext {
            now: 10,
            granted: true,
            grenade_near: false,
            grenade_throw: None,
            threat_aggressive: true,
        };

        // Threat out front, far enough away: slot holds.
        agent.tracker.observe(99, vec2(30.0, 45.0), None, 10);
        let situation = Situation::build(actor, &agent, &covers, &grid, &base, &config);
        assert!(situation.target_cover_valid);

        // Threat slipped behind the line: slot no longer protects.
        agent.tracker.observe(99, vec2(30.0, 14.0), None, 11);
        let situation = Situation::build(actor, &agent, &covers, &grid, &base, &config);
        assert!(!situation.target_cover_valid);
    }
}
