//! The transition function.
//!
//! One canonical state machine: a tagged state, the reason it was
//! entered, and a pure [`next_state`] over the per-tick
//! [`Situation`]. The caller applies the returned [`Decision`];
//! nothing here touches the world, so every policy is testable with a
//! hand-built situation.

use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::situation::Situation;

/// Behavioral states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AiState {
    /// Not started yet.
    #[default]
    None,
    /// Walking the waypoint loop.
    Patrol,
    /// Standing at a waypoint, or idling with none.
    PatrolPause,
    /// Moving to the nearest valid cover.
    TakeAnyCover,
    /// Moving to a better cover than the current one.
    TakeBetterCover,
    /// Peeking out and firing from cover.
    FireInCover,
    /// Ducked behind cover between fire windows.
    HideInCover,
    /// Swapping magazines.
    Reload,
    /// Sweeping search points for a suspected enemy.
    Investigate,
    /// Trailing a vanished enemy without fresh information.
    Follow,
    /// Advancing on the enemy in the open.
    Approach,
    /// Falling back to cover away from the enemy.
    Retreat,
    /// Clearing out of a blast radius.
    AvoidGrenade,
}

/// Why a state was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StateReason {
    /// No particular reason recorded.
    #[default]
    None,
    /// Enemy known and no usable cover claimed.
    ThreatSpotted,
    /// Enemy vanished with nothing fresher to go on.
    ThreatLost,
    /// Information newer than the last empty-handed spot check.
    FreshLead,
    /// An alert gave a position worth checking.
    AlertHeard,
    /// Arrived on the claimed slot.
    InPosition,
    /// The fire window elapsed.
    PeekDone,
    /// The hide wait elapsed.
    WaitDone,
    /// Every fire window at this position has been spent.
    BurstExhausted,
    /// The magazine ran dry.
    MagazineEmpty,
    /// The magazine swap finished.
    ReloadDone,
    /// The claimed slot stopped protecting against the threat.
    CoverInvalid,
    /// Too many consecutive failed cover searches.
    CoverSearchFailed,
    /// The squad kept the aggression slots for others.
    SquadDenied,
    /// Health dropped below the retreat threshold.
    LowHealth,
    /// A grenade is about to go off nearby.
    GrenadeNearby,
    /// The enemy is running, not fighting.
    PreyFleeing,
    /// The enemy stayed hidden past the patience window.
    Patience,
    /// Reached the current movement goal.
    Arrived,
    /// The waypoint pause elapsed.
    PauseDone,
    /// Nothing demands attention.
    NothingToDo,
}

/// Outcome of one evaluation.
///
/// `restart` re-runs the entry effects of a state the agent is
/// already in (fresh cover search, fresh search objective) without
/// counting as a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// State to be in after this tick.
    pub state: AiState,
    /// Why.
    pub reason: StateReason,
    /// Re-run entry effects even when the state is unchanged.
    pub restart: bool,
}

impl Decision {
    /// Keep the current state and reason untouched.
    #[must_use]
    pub fn hold(situation: &Situation) -> Self {
        Self {
            state: situation.state,
            reason: situation.reason,
            restart: false,
        }
    }

    /// Move to (or stay in) a state.
    #[must_use]
    pub fn enter(state: AiState, reason: StateReason) -> Self {
        Self {
            state,
            reason,
            restart: false,
        }
    }

    /// Enter a state with entry effects forced.
    #[must_use]
    pub fn restart(state: AiState, reason: StateReason) -> Self {
        Self {
            state,
            reason,
            restart: true,
        }
    }
}

/// Evaluate the policy ladder for one agent. Pure; the caller applies
/// the result.
#[must_use]
pub fn next_state(s: &Situation, config: &AiConfig) -> Decision {
    // Blast proximity preempts everything, including low health.
    if s.grenade_near {
        return Decision::enter(AiState::AvoidGrenade, StateReason::GrenadeNearby);
    }

    if s.health_ratio <= config.combat.retreat_health_ratio {
        if s.state == AiState::Retreat {
            if (s.has_target_cover && s.target_cover_valid) || s.retreat_blocked {
                return Decision::hold(s);
            }
            // Grace expired with nothing claimed: search again.
            return Decision::restart(AiState::Retreat, StateReason::LowHealth);
        }
        return Decision::enter(AiState::Retreat, StateReason::LowHealth);
    }

    let Some(threat) = &s.threat else {
        if s.has_investigation {
            let restart = s.new_alert || s.point_just_cleared;
            return Decision {
                state: AiState::Investigate,
                reason: StateReason::AlertHeard,
                restart,
            };
        }
        return patrol_policy(s);
    };

    // The spot came up empty: hunt rather than trade fire with a ghost.
    if s.spot_checked && s.granted {
        if s.fresh_lead {
            let restart = s.new_alert || s.point_just_cleared;
            return Decision {
                state: AiState::Investigate,
                reason: StateReason::FreshLead,
                restart,
            };
        }
        return Decision::enter(AiState::Follow, StateReason::ThreatLost);
    }

    if s.granted && (!threat.aggressive || s.irritated) {
        let reason = if threat.aggressive {
            StateReason::Patience
        } else {
            StateReason::PreyFleeing
        };
        return Decision::enter(AiState::Approach, reason);
    }

    combat_policy(s, config)
}

/// Waypoint walking and pausing. Only reached with no known threat
/// and nothing to investigate.
fn patrol_policy(s: &Situation) -> Decision {
    match s.state {
        AiState::Patrol => {
            if !s.has_waypoints {
                return Decision::enter(AiState::PatrolPause, StateReason::NothingToDo);
            }
            if s.at_target {
                return Decision::enter(AiState::PatrolPause, StateReason::Arrived);
            }
            Decision::hold(s)
        }
        AiState::PatrolPause => {
            if s.has_waypoints && s.pause_remaining.map_or(true, |left| left == 0) {
                return Decision::enter(AiState::Patrol, StateReason::PauseDone);
            }
            Decision::hold(s)
        }
        _ => Decision::enter(AiState::Patrol, StateReason::NothingToDo),
    }
}

/// The cover fight: claim a slot, alternate peeking and hiding,
/// reload when dry, switch position when the burst quota is spent.
fn combat_policy(s: &Situation, config: &AiConfig) -> Decision {
    // Finish an in-flight magazine swap before anything tactical.
    if s.state == AiState::Reload && s.reloading {
        return Decision::hold(s);
    }
    if s.state == AiState::FireInCover && s.needs_reload {
        return Decision::enter(AiState::Reload, StateReason::MagazineEmpty);
    }

    if !s.granted {
        if s.in_cover || (s.has_target_cover && s.target_cover_valid) {
            return Decision::enter(AiState::HideInCover, StateReason::SquadDenied);
        }
        if s.state == AiState::Retreat {
            if s.retreat_blocked {
                return Decision::hold(s);
            }
            return Decision::restart(AiState::Retreat, StateReason::SquadDenied);
        }
        return Decision::enter(AiState::Retreat, StateReason::SquadDenied);
    }

    if s.cover_fails >= config.combat.cover_fail_limit {
        return Decision::enter(AiState::Approach, StateReason::CoverSearchFailed);
    }
    if !s.has_target_cover {
        return Decision::restart(AiState::TakeAnyCover, StateReason::ThreatSpotted);
    }
    if !s.target_cover_valid {
        return Decision::restart(AiState::TakeBetterCover, StateReason::CoverInvalid);
    }

    match s.state {
        AiState::TakeAnyCover | AiState::TakeBetterCover => {
            if !s.in_cover {
                return Decision::hold(s);
            }
            if s.needs_reload {
                return Decision::enter(AiState::Reload, StateReason::MagazineEmpty);
            }
            Decision::enter(AiState::FireInCover, StateReason::InPosition)
        }
        AiState::FireInCover => {
            if s.ticks_in_state >= config.combat.fire_window_ticks() {
                return Decision::enter(AiState::HideInCover, StateReason::PeekDone);
            }
            Decision::hold(s)
        }
        AiState::HideInCover => {
            if s.ticks_in_state < config.combat.hide_wait_ticks() {
                return Decision::hold(s);
            }
            if s.bursts_done >= config.combat.burst_count {
                return Decision::enter(AiState::TakeBetterCover, StateReason::BurstExhausted);
            }
            if s.needs_reload {
                return Decision::enter(AiState::Reload, StateReason::MagazineEmpty);
            }
            Decision::enter(AiState::FireInCover, StateReason::WaitDone)
        }
        AiState::Reload => {
            // Swap finished; rejoin the cycle from hiding.
            if s.in_cover {
                Decision::enter(AiState::HideInCover, StateReason::ReloadDone)
            } else {
                Decision::enter(AiState::TakeAnyCover, StateReason::ReloadDone)
            }
        }
        _ => Decision::enter(AiState::TakeAnyCover, StateReason::ThreatSpotted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Fixed, Vec2Fixed};
    use crate::situation::ThreatView;

    fn fixed(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn threat(distance: f64) -> ThreatView {
        ThreatView {
            target: Some(9),
            position: Vec2Fixed::new(fixed(distance), Fixed::ZERO),
            visible: true,
            actual: true,
            age: 0,
            cover: None,
            distance: fixed(distance),
            aggressive: true,
        }
    }

    fn combat_base() -> Situation {
        Situation {
            state: AiState::FireInCover,
            reason: StateReason::InPosition,
            threat: Some(threat(15.0)),
            in_cover: true,
            has_target_cover: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_grenade_preempts_everything() {
        let config = AiConfig::default();
        let s = Situation {
            grenade_near: true,
            health_ratio: fixed(0.1),
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!(d.state, AiState::AvoidGrenade);
        assert_eq!(d.reason, StateReason::GrenadeNearby);
    }

    #[test]
    fn test_low_health_retreat_with_grace() {
        let config = AiConfig::default();
        let s = Situation {
            health_ratio: fixed(0.2),
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!(d.state, AiState::Retreat);
        assert_eq!(d.reason, StateReason::LowHealth);

        // Search failed recently: sit on the same state and reason.
        let s = Situation {
            state: AiState::Retreat,
            reason: StateReason::LowHealth,
            health_ratio: fixed(0.2),
            has_target_cover: false,
            in_cover: false,
            retreat_blocked: true,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!(
            (d.state, d.reason, d.restart),
            (AiState::Retreat, StateReason::LowHealth, false)
        );

        // Grace expired: retry the search.
        let s = Situation {
            retreat_blocked: false,
            ..s
        };
        let d = next_state(&s, &config);
        assert!(d.restart);
        assert_eq!(d.state, AiState::Retreat);
    }

    #[test]
    fn test_idle_patrol_cycle() {
        let config = AiConfig::default();

        let s = Situation::default();
        assert_eq!(next_state(&s, &config).state, AiState::Patrol);

        // Waypoint reached.
        let s = Situation {
            state: AiState::Patrol,
            has_waypoints: true,
            at_target: true,
            ..Default::default()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::PatrolPause, StateReason::Arrived));

        // Pause running down.
        let s = Situation {
            state: AiState::PatrolPause,
            has_waypoints: true,
            pause_remaining: Some(5),
            ..Default::default()
        };
        assert_eq!(next_state(&s, &config).state, AiState::PatrolPause);

        let s = Situation {
            pause_remaining: Some(0),
            ..s
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::Patrol, StateReason::PauseDone));

        // Nowhere to go: degrade to standing around.
        let s = Situation {
            state: AiState::Patrol,
            has_waypoints: false,
            ..Default::default()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::PatrolPause, StateReason::NothingToDo));
    }

    #[test]
    fn test_alert_interrupts_idle_with_forced_restart() {
        let config = AiConfig::default();
        let s = Situation {
            has_investigation: true,
            new_alert: true,
            ..Default::default()
        };
        let d = next_state(&s, &config);
        assert_eq!(d.state, AiState::Investigate);
        assert!(d.restart);

        // Ongoing sweep without news keeps its objective.
        let s = Situation {
            state: AiState::Investigate,
            reason: StateReason::AlertHeard,
            has_investigation: true,
            ..Default::default()
        };
        let d = next_state(&s, &config);
        assert_eq!(d.state, AiState::Investigate);
        assert!(!d.restart);
    }

    #[test]
    fn test_burst_cycle_reaches_better_cover() {
        let config = AiConfig::default();
        let window = config.combat.fire_window_ticks();
        let wait = config.combat.hide_wait_ticks();

        // Arrived on the slot.
        let s = Situation {
            state: AiState::TakeAnyCover,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::FireInCover, StateReason::InPosition));

        // Mid-window: keep firing.
        let s = Situation {
            ticks_in_state: window - 1,
            bursts_done: 1,
            ..combat_base()
        };
        assert_eq!(next_state(&s, &config).state, AiState::FireInCover);

        // Window elapsed: duck.
        let s = Situation {
            ticks_in_state: window,
            bursts_done: 1,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::HideInCover, StateReason::PeekDone));

        // Wait elapsed with windows left: peek again.
        let s = Situation {
            state: AiState::HideInCover,
            ticks_in_state: wait,
            bursts_done: 1,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::FireInCover, StateReason::WaitDone));

        // Quota spent: change position.
        let s = Situation {
            state: AiState::HideInCover,
            ticks_in_state: wait,
            bursts_done: config.combat.burst_count,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!(
            (d.state, d.reason),
            (AiState::TakeBetterCover, StateReason::BurstExhausted)
        );
    }

    #[test]
    fn test_reload_preempts_fire_and_rejoins_cycle() {
        let config = AiConfig::default();
        let s = Situation {
            needs_reload: true,
            gun_ready: false,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::Reload, StateReason::MagazineEmpty));

        // Swapping: nothing interrupts except the ladder above.
        let s = Situation {
            state: AiState::Reload,
            reloading: true,
            gun_ready: false,
            ..combat_base()
        };
        assert_eq!(next_state(&s, &config).state, AiState::Reload);

        // Done: back to hiding before the next peek.
        let s = Situation {
            state: AiState::Reload,
            reloading: false,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::HideInCover, StateReason::ReloadDone));
    }

    #[test]
    fn test_squad_denial_degrades_defensively() {
        let config = AiConfig::default();
        let s = Situation {
            granted: false,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::HideInCover, StateReason::SquadDenied));

        // No cover to hide behind: fall back instead.
        let s = Situation {
            granted: false,
            in_cover: false,
            has_target_cover: false,
            state: AiState::Patrol,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::Retreat, StateReason::SquadDenied));
    }

    #[test]
    fn test_checked_spot_leads_to_hunt() {
        let config = AiConfig::default();
        let hidden = ThreatView {
            visible: false,
            age: 40,
            ..threat(20.0)
        };

        let s = Situation {
            state: AiState::HideInCover,
            threat: Some(hidden),
            spot_checked: true,
            fresh_lead: true,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::Investigate, StateReason::FreshLead));

        let s = Situation {
            fresh_lead: false,
            ..s
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::Follow, StateReason::ThreatLost));

        // Denied aggression: no hunting, stay defensive.
        let s = Situation {
            granted: false,
            ..s
        };
        let d = next_state(&s, &config);
        assert_eq!(d.state, AiState::HideInCover);
    }

    #[test]
    fn test_fleeing_prey_and_patience_approach() {
        let config = AiConfig::default();
        let prey = ThreatView {
            aggressive: false,
            ..threat(12.0)
        };
        let s = Situation {
            threat: Some(prey),
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::Approach, StateReason::PreyFleeing));

        let s = Situation {
            threat: Some(ThreatView {
                visible: false,
                age: 400,
                ..threat(12.0)
            }),
            irritated: true,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::Approach, StateReason::Patience));
    }

    #[test]
    fn test_cover_failures_degrade_to_approach() {
        let config = AiConfig::default();

        let s = Situation {
            has_target_cover: false,
            in_cover: false,
            cover_fails: 1,
            state: AiState::TakeAnyCover,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!(d.state, AiState::TakeAnyCover);
        assert!(d.restart, "a fresh search is owed");

        let s = Situation {
            cover_fails: config.combat.cover_fail_limit,
            ..s
        };
        let d = next_state(&s, &config);
        assert_eq!(
            (d.state, d.reason),
            (AiState::Approach, StateReason::CoverSearchFailed)
        );
    }

    #[test]
    fn test_invalidated_slot_forces_better_cover() {
        let config = AiConfig::default();
        let s = Situation {
            target_cover_valid: false,
            ..combat_base()
        };
        let d = next_state(&s, &config);
        assert_eq!(
            (d.state, d.reason),
            (AiState::TakeBetterCover, StateReason::CoverInvalid)
        );
        assert!(d.restart);
    }

    #[test]
    fn test_visible_threat_pulls_wanderer_into_cover() {
        let config = AiConfig::default();
        let s = Situation {
            state: AiState::Investigate,
            reason: StateReason::AlertHeard,
            threat: Some(threat(18.0)),
            in_cover: false,
            has_target_cover: false,
            ..Default::default()
        };
        let d = next_state(&s, &config);
        assert_eq!((d.state, d.reason), (AiState::TakeAnyCover, StateReason::ThreatSpotted));
    }
}
