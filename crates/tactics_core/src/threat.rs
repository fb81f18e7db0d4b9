//! Per-agent threat memory.
//!
//! Each agent tracks at most one believed enemy. The belief records
//! where the enemy was last placed, how that knowledge arrived, and
//! when. Freshness is monotonic: stale reports never overwrite newer
//! knowledge, and the belief changes only through the mutators here.

use serde::{Deserialize, Serialize};

use crate::actor::ActorId;
use crate::config::ThreatConfig;
use crate::cover::CoverId;
use crate::math::{Fixed, SimRng, Vec2Fixed};

/// What an agent believes about one enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatBelief {
    /// The believed actor, if identified.
    pub target: Option<ActorId>,
    /// Last known ground position.
    pub position: Vec2Fixed,
    /// Tick the knowledge refers to.
    pub last_seen: u64,
    /// Currently in sight.
    pub visible: bool,
    /// Position is ground truth rather than a guess.
    pub actual: bool,
    /// Cover the enemy is believed to hold.
    pub cover: Option<CoverId>,
}

/// Threat memory with sticky first-sighting flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatTracker {
    belief: Option<ThreatBelief>,
    ever_seen: bool,
}

impl ThreatTracker {
    /// Empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current belief, if any.
    #[must_use]
    pub const fn belief(&self) -> Option<&ThreatBelief> {
        self.belief.as_ref()
    }

    /// The tracked actor.
    #[must_use]
    pub fn target(&self) -> Option<ActorId> {
        self.belief.and_then(|b| b.target)
    }

    /// Whether the tracked actor is in sight right now.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.belief.is_some_and(|b| b.visible)
    }

    /// Whether this agent has ever had the enemy in actual sight.
    /// Survives lost sight; cleared only by [`Self::forget`].
    #[must_use]
    pub const fn has_ever_seen(&self) -> bool {
        self.ever_seen
    }

    /// Ticks since the knowledge was fresh. `None` without a belief.
    #[must_use]
    pub fn age(&self, now: u64) -> Option<u64> {
        self.belief.map(|b| now.saturating_sub(b.last_seen))
    }

    /// Record a direct sighting. Returns true when the tracked actor
    /// changed, so the caller can raise a threat-changed event.
    pub fn observe(
        &mut self,
        target: ActorId,
        position: Vec2Fixed,
        cover: Option<CoverId>,
        now: u64,
    ) -> bool {
        let changed = self.target() != Some(target);
        self.belief = Some(ThreatBelief {
            target: Some(target),
            position,
            last_seen: now,
            visible: true,
            actual: true,
            cover,
        });
        self.ever_seen = true;
        changed
    }

    /// Record second-hand knowledge stamped with the tick it refers
    /// to. Reports older than the current belief are dropped. Returns
    /// true when the tracked actor changed.
    pub fn observe_indirect(
        &mut self,
        target: Option<ActorId>,
        position: Vec2Fixed,
        actual: bool,
        cover: Option<CoverId>,
        seen_tick: u64,
    ) -> bool {
        if let Some(belief) = self.belief {
            if seen_tick < belief.last_seen {
                return false;
            }
        }
        let changed = self.target() != target;
        self.belief = Some(ThreatBelief {
            target,
            position,
            last_seen: seen_tick,
            visible: false,
            actual,
            cover,
        });
        changed
    }

    /// The tracked actor left sight; knowledge stays.
    pub fn lose_sight(&mut self) {
        if let Some(belief) = &mut self.belief {
            belief.visible = false;
        }
    }

    /// Replace the believed cover without touching freshness.
    pub fn set_cover(&mut self, cover: Option<CoverId>) {
        if let Some(belief) = &mut self.belief {
            belief.cover = cover;
        }
    }

    /// Drop all knowledge, including the sticky sighting flag.
    pub fn forget(&mut self) {
        self.belief = None;
        self.ever_seen = false;
    }

    /// Weigh a squadmate's belief against the local one. Adopted only
    /// when strictly fresher by `epsilon_ticks`, or when the local
    /// agent has never seen the enemy while the friend has. Returns
    /// true when the tracked actor changed.
    pub fn consider_friend_report(
        &mut self,
        target: Option<ActorId>,
        position: Vec2Fixed,
        seen_tick: u64,
        cover: Option<CoverId>,
        friend_ever_seen: bool,
        epsilon_ticks: u64,
    ) -> bool {
        let adopt = match self.belief {
            None => true,
            Some(belief) => {
                seen_tick > belief.last_seen + epsilon_ticks
                    || (!self.ever_seen && friend_ever_seen)
            }
        };
        if !adopt {
            return false;
        }
        let changed = self.target() != target;
        self.belief = Some(ThreatBelief {
            target,
            position,
            last_seen: seen_tick,
            visible: false,
            actual: false,
            cover,
        });
        changed
    }
}

/// Degrade a second-hand position the way a listener would misjudge
/// it. The error grows with distance from the listener, clamped to
/// the configured band; negligible errors pass the point through
/// untouched, larger ones land uniformly in the outer half of the
/// error disc.
#[must_use]
pub fn guess_position(
    from: Vec2Fixed,
    reported: Vec2Fixed,
    config: &ThreatConfig,
    rng: &mut SimRng,
) -> Vec2Fixed {
    let distance = from.distance(reported);
    let error = (distance * config.guess_error_per_unit)
        .clamp(config.guess_error_min, config.guess_error_max);
    if error <= config.guess_exact_below {
        return reported;
    }
    let magnitude = rng.next_range(error / 2, error);
    reported + rng.unit_vec() * magnitude
}
