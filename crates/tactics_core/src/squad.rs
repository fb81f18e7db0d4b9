//! Squad-level admission control for aggression.
//!
//! Agents that want to press the attack on a target check in during
//! the collect phase; `resolve` then grants at most the configured
//! number of concurrent attackers per target. Reads of
//! [`SquadCoordinator::is_aggressive`] are only meaningful after
//! `resolve` has run for the tick (two-phase barrier).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actor::ActorId;
use crate::config::{secs_to_ticks, SquadConfig};
use crate::math::{fixed_serde, Fixed};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct CheckIn {
    agent: ActorId,
    #[serde(with = "fixed_serde")]
    distance: Fixed,
    forced: bool,
}

/// Per-side aggression slots with a short sustain window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadCoordinator {
    check_ins: HashMap<ActorId, Vec<CheckIn>>,
    sustained: HashMap<ActorId, u64>,
    granted: HashSet<ActorId>,
    max_aggressive: usize,
    sustain_ticks: u64,
}

impl SquadCoordinator {
    /// Coordinator with the configured cap and sustain duration.
    #[must_use]
    pub fn new(config: &SquadConfig) -> Self {
        Self {
            check_ins: HashMap::new(),
            sustained: HashMap::new(),
            granted: HashSet::new(),
            max_aggressive: config.max_aggressive as usize,
            sustain_ticks: secs_to_ticks(config.sustain_duration),
        }
    }

    /// Start the collect phase: clear last tick's check-ins and expire
    /// sustain windows.
    pub fn begin_tick(&mut self, now: u64) {
        self.check_ins.clear();
        self.sustained.retain(|_, expiry| *expiry > now);
    }

    /// Ask for an aggression slot against `target`. Forced check-ins
    /// (hit reactions) are always admitted at resolve.
    pub fn check_in(&mut self, agent: ActorId, target: ActorId, distance: Fixed, forced: bool) {
        self.check_ins.entry(target).or_default().push(CheckIn {
            agent,
            distance,
            forced,
        });
    }

    /// Close the collect phase. Per target: forced check-ins are all
    /// admitted; the rest compete by rank (sustained first, then
    /// distance, then agent id) for the remaining slots. Every grant
    /// opens a sustain window.
    pub fn resolve(&mut self, now: u64) {
        self.granted.clear();

        let mut targets: Vec<ActorId> = self.check_ins.keys().copied().collect();
        targets.sort_unstable();

        for target in targets {
            let Some(entries) = self.check_ins.get(&target) else {
                continue;
            };

            let mut contenders: Vec<CheckIn> = Vec::new();
            let mut granted_here = 0usize;
            for entry in entries {
                if entry.forced {
                    self.granted.insert(entry.agent);
                    granted_here += 1;
                } else {
                    contenders.push(*entry);
                }
            }

            contenders.sort_by_key(|c| (!self.sustained.contains_key(&c.agent), c.distance, c.agent));
            let open = self.max_aggressive.saturating_sub(granted_here);
            for entry in contenders.into_iter().take(open) {
                self.granted.insert(entry.agent);
                granted_here += 1;
            }

            if granted_here > 0 {
                debug!(threat = target, granted = granted_here, "aggression slots resolved");
            }
        }

        for agent in &self.granted {
            self.sustained.insert(*agent, now + self.sustain_ticks);
        }
        self.check_ins.clear();
    }

    /// Whether `agent` holds an aggression slot this tick. Valid only
    /// after [`Self::resolve`].
    #[must_use]
    pub fn is_aggressive(&self, agent: ActorId) -> bool {
        self.granted.contains(&agent)
    }

    /// Number of slots granted this tick, across all targets.
    #[must_use]
    pub fn granted_count(&self) -> usize {
        self.granted.len()
    }

    /// Durable state in ascending id order, for canonical snapshots.
    /// Check-ins are intra-tick and not part of it.
    #[must_use]
    pub fn export(&self) -> (Vec<(ActorId, u64)>, Vec<ActorId>) {
        let mut sustained: Vec<(ActorId, u64)> =
            self.sustained.iter().map(|(a, e)| (*a, *e)).collect();
        sustained.sort_unstable();
        let mut granted: Vec<ActorId> = self.granted.iter().copied().collect();
        granted.sort_unstable();
        (sustained, granted)
    }

    /// Rebuild from an export.
    #[must_use]
    pub fn import(
        config: &SquadConfig,
        sustained: Vec<(ActorId, u64)>,
        granted: Vec<ActorId>,
    ) -> Self {
        let mut coordinator = Self::new(config);
        coordinator.sustained = sustained.into_iter().collect();
        coordinator.granted = granted.into_iter().collect();
        coordinator
    }

    /// Drop all transient records for a dead or despawned agent.
    pub fn remove_agent(&mut self, agent: ActorId) {
        self.sustained.remove(&agent);
        self.granted.remove(&agent);
        for entries in self.check_ins.values_mut() {
            entries.retain(|c| c.agent != agent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(max_aggressive: u32) -> SquadCoordinator {
        SquadCoordinator::new(&SquadConfig {
            max_aggressive,
            sustain_duration: Fixed::from_num(3),
        })
    }

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    #[test]
    fn test_nearest_win_the_slots() {
        let mut squad = coordinator(2);
        squad.begin_tick(0);
        squad.check_in(1, 99, fixed(5), false);
        squad.check_in(2, 99, fixed(2), false);
        squad.check_in(3, 99, fixed(8), false);
        squad.resolve(0);

        assert!(squad.is_aggressive(1));
        assert!(squad.is_aggressive(2));
        assert!(!squad.is_aggressive(3));
        assert_eq!(squad.granted_count(), 2);
    }

    #[test]
    fn test_forced_exceed_the_cap() {
        let mut squad = coordinator(2);
        squad.begin_tick(0);
        squad.check_in(1, 99, fixed(5), true);
        squad.check_in(2, 99, fixed(2), true);
        squad.check_in(3, 99, fixed(8), true);
        squad.check_in(4, 99, fixed(1), false);
        squad.resolve(0);

        // All forced in, no room left for the volunteer
        assert_eq!(squad.granted_count(), 3);
        assert!(!squad.is_aggressive(4));
    }

    #[test]
    fn test_sustain_outranks_distance() {
        let mut squad = coordinator(1);
        squad.begin_tick(0);
        squad.check_in(1, 99, fixed(5), false);
        squad.resolve(0);
        assert!(squad.is_aggressive(1));

        // A closer rival arrives inside the sustain window
        squad.begin_tick(1);
        squad.check_in(1, 99, fixed(5), false);
        squad.check_in(2, 99, fixed(1), false);
        squad.resolve(1);
        assert!(squad.is_aggressive(1));
        assert!(!squad.is_aggressive(2));

        // Window expired without a grant in between: distance decides
        let late = 1 + secs_to_ticks(Fixed::from_num(3)) + 1;
        squad.begin_tick(late);
        squad.check_in(1, 99, fixed(5), false);
        squad.check_in(2, 99, fixed(1), false);
        squad.resolve(late);
        assert!(!squad.is_aggressive(1));
        assert!(squad.is_aggressive(2));
    }

    #[test]
    fn test_caps_are_per_target() {
        let mut squad = coordinator(2);
        squad.begin_tick(0);
        squad.check_in(1, 98, fixed(5), false);
        squad.check_in(2, 98, fixed(2), false);
        squad.check_in(3, 99, fixed(8), false);
        squad.check_in(4, 99, fixed(1), false);
        squad.resolve(0);

        assert_eq!(squad.granted_count(), 4);
    }

    #[test]
    fn test_no_check_in_no_grant() {
        let mut squad = coordinator(2);
        squad.begin_tick(0);
        squad.check_in(1, 99, fixed(5), false);
        squad.resolve(0);

        squad.begin_tick(1);
        squad.resolve(1);
        assert!(!squad.is_aggressive(1));
        assert_eq!(squad.granted_count(), 0);
    }
}
