//! Tunable parameters for the combat AI.
//!
//! Every component exposes its knobs as a flat struct of named fields
//! with factory defaults; [`AiConfig`] aggregates them and can be
//! loaded from RON. Distances are world units, durations are seconds,
//! angles are degrees. Defaults are tuned for roughly human-scale
//! arenas (1 unit = 1 meter).

use serde::{Deserialize, Serialize};

use crate::error::{Result, TacticsError};
use crate::math::{fixed_num_serde, Fixed};

/// Simulation ticks per second.
pub const TICK_RATE: u32 = 20;

/// Convert a duration in seconds to whole ticks, rounding up so short
/// positive durations never collapse to zero.
#[must_use]
pub fn secs_to_ticks(seconds: Fixed) -> u64 {
    if seconds <= Fixed::ZERO {
        return 0;
    }
    let ticks = (seconds * Fixed::from_num(TICK_RATE)).ceil();
    ticks.to_num::<i64>().max(1) as u64
}

/// Perception tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Maximum sight distance in the open.
    #[serde(with = "fixed_num_serde")]
    pub sight_distance: Fixed,
    /// Horizontal field of view, degrees.
    #[serde(with = "fixed_num_serde")]
    pub fov_deg: Fixed,
    /// Base delay between full sight re-scans.
    #[serde(with = "fixed_num_serde")]
    pub recheck_delay: Fixed,
    /// Re-scan delay jitter as a fraction of the base delay.
    #[serde(with = "fixed_num_serde")]
    pub recheck_jitter: Fixed,
    /// Range within which same-side agents stay in contact.
    #[serde(with = "fixed_num_serde")]
    pub communication_distance: Fixed,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            sight_distance: Fixed::from_num(35),
            fov_deg: Fixed::from_num(160),
            recheck_delay: Fixed::from_num(0.5),
            recheck_jitter: Fixed::from_num(0.2),
            communication_distance: Fixed::from_num(30),
        }
    }
}

/// Threat belief tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    /// Guess error per unit of distance to the reported position.
    #[serde(with = "fixed_num_serde")]
    pub guess_error_per_unit: Fixed,
    /// Lower clamp on the computed guess error.
    #[serde(with = "fixed_num_serde")]
    pub guess_error_min: Fixed,
    /// Upper clamp on the computed guess error.
    #[serde(with = "fixed_num_serde")]
    pub guess_error_max: Fixed,
    /// Errors at or below this are trusted without perturbation.
    #[serde(with = "fixed_num_serde")]
    pub guess_exact_below: Fixed,
    /// A friend's report must be fresher than ours by this much to be
    /// adopted.
    #[serde(with = "fixed_num_serde")]
    pub share_epsilon: Fixed,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            guess_error_per_unit: Fixed::from_num(0.1),
            guess_error_min: Fixed::from_num(1),
            guess_error_max: Fixed::from_num(6),
            guess_exact_below: Fixed::from_num(1.5),
            share_epsilon: Fixed::from_num(0.5),
        }
    }
}

/// Cover geometry and selection tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverConfig {
    /// Search radius for nearby covers.
    #[serde(with = "fixed_num_serde")]
    pub max_cover_distance: Fixed,
    /// A candidate closer than this to the threat is rejected.
    #[serde(with = "fixed_num_serde")]
    pub avoid_distance: Fixed,
    /// Maximum angle between cover forward and threat direction for
    /// tall cover to still block sight.
    #[serde(with = "fixed_num_serde")]
    pub max_tall_cover_angle_deg: Fixed,
    /// Same bound for low cover, wider since agents fire over the top.
    #[serde(with = "fixed_num_serde")]
    pub max_low_cover_angle_deg: Fixed,
    /// Covers at least this high count as tall.
    #[serde(with = "fixed_num_serde")]
    pub tall_threshold: Fixed,
    /// Two users within this distance contest the same slot.
    #[serde(with = "fixed_num_serde")]
    pub occupy_spacing: Fixed,
    /// Step for sliding a low-cover candidate sideways.
    #[serde(with = "fixed_num_serde")]
    pub slide_step: Fixed,
    /// Lateral offset past the cover end for corner positions.
    #[serde(with = "fixed_num_serde")]
    pub corner_offset: Fixed,
    /// Stand-off behind the cover line.
    #[serde(with = "fixed_num_serde")]
    pub cover_margin: Fixed,
    /// Length of the corner obstruction raycast.
    #[serde(with = "fixed_num_serde")]
    pub corner_ray_distance: Fixed,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            max_cover_distance: Fixed::from_num(30),
            avoid_distance: Fixed::from_num(8),
            max_tall_cover_angle_deg: Fixed::from_num(40),
            max_low_cover_angle_deg: Fixed::from_num(60),
            tall_threshold: Fixed::from_num(1.2),
            occupy_spacing: Fixed::from_num(1),
            slide_step: Fixed::from_num(0.5),
            corner_offset: Fixed::from_num(0.4),
            cover_margin: Fixed::from_num(0.45),
            corner_ray_distance: Fixed::from_num(100),
        }
    }
}

/// Search planning tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Spacing between generated points along a cover edge.
    #[serde(with = "fixed_num_serde")]
    pub point_spacing: Fixed,
    /// Grid step when sampling search zones.
    #[serde(with = "fixed_num_serde")]
    pub zone_grid_step: Fixed,
    /// Points within this distance of a block centroid join the block.
    #[serde(with = "fixed_num_serde")]
    pub block_radius: Fixed,
    /// Weight of directional momentum in block/point scoring.
    #[serde(with = "fixed_num_serde")]
    pub direction_bias: Fixed,
    /// Stand-off distance for approach positions.
    #[serde(with = "fixed_num_serde")]
    pub approach_distance: Fixed,
    /// Within this distance a point counts as physically reached.
    #[serde(with = "fixed_num_serde")]
    pub touch_distance: Fixed,
    /// Field of view required to verify a point by sight.
    #[serde(with = "fixed_num_serde")]
    pub verify_fov_deg: Fixed,
    /// Lateral probe offset for cover-edge verification.
    #[serde(with = "fixed_num_serde")]
    pub lateral_spread: Fixed,
    /// Squadmate investigated reports clear pending points within this
    /// radius.
    #[serde(with = "fixed_num_serde")]
    pub share_radius: Fixed,
    /// Seconds before an investigated record expires.
    #[serde(with = "fixed_num_serde")]
    pub investigated_ttl: Fixed,
    /// Cap on precomputed point visibility radii.
    #[serde(with = "fixed_num_serde")]
    pub max_visibility: Fixed,
    /// Slow from run to walk within this range of the point.
    #[serde(with = "fixed_num_serde")]
    pub walk_in_distance: Fixed,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            point_spacing: Fixed::from_num(2.5),
            zone_grid_step: Fixed::from_num(3),
            block_radius: Fixed::from_num(12),
            direction_bias: Fixed::from_num(0.4),
            approach_distance: Fixed::from_num(3),
            touch_distance: Fixed::from_num(1.2),
            verify_fov_deg: Fixed::from_num(100),
            lateral_spread: Fixed::from_num(0.7),
            share_radius: Fixed::from_num(1.5),
            investigated_ttl: Fixed::from_num(60),
            max_visibility: Fixed::from_num(18),
            walk_in_distance: Fixed::from_num(6),
        }
    }
}

/// Squad arbitration tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SquadConfig {
    /// Concurrent aggressive-attacker cap per threat.
    pub max_aggressive: u32,
    /// Seconds a granted agent keeps ranking priority.
    #[serde(with = "fixed_num_serde")]
    pub sustain_duration: Fixed,
}

impl Default for SquadConfig {
    fn default() -> Self {
        Self {
            max_aggressive: 2,
            sustain_duration: Fixed::from_num(3),
        }
    }
}

/// State machine tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Fire windows per cover position before switching.
    pub burst_count: u32,
    /// Seconds spent hidden between fire windows.
    #[serde(with = "fixed_num_serde")]
    pub hide_wait: Fixed,
    /// Total peeking time budget across one position's bursts.
    #[serde(with = "fixed_num_serde")]
    pub total_peek_duration: Fixed,
    /// Health fraction below which retreat preempts.
    #[serde(with = "fixed_num_serde")]
    pub retreat_health_ratio: Fixed,
    /// Seconds to sit on a failed retreat/cover search before
    /// escalating.
    #[serde(with = "fixed_num_serde")]
    pub retreat_grace: Fixed,
    /// Consecutive cover-search failures before degrading to approach.
    pub cover_fail_limit: u32,
    /// Seconds of unseen-threat combat before patience runs out.
    #[serde(with = "fixed_num_serde")]
    pub irritation_duration: Fixed,
    /// Trail distance maintained when following a vanished threat.
    #[serde(with = "fixed_num_serde")]
    pub follow_distance: Fixed,
    /// Default pause at a patrol waypoint.
    #[serde(with = "fixed_num_serde")]
    pub stand_duration: Fixed,
    /// Preferred hold-off range when approaching in the open.
    #[serde(with = "fixed_num_serde")]
    pub circle_distance: Fixed,
    /// Rounds in a full magazine.
    pub magazine_size: u32,
    /// Seconds to swap a magazine.
    #[serde(with = "fixed_num_serde")]
    pub reload_duration: Fixed,
    /// Rounds drained per second while firing.
    #[serde(with = "fixed_num_serde")]
    pub rounds_per_second: Fixed,
    /// Audible radius of gunfire, before hearing scaling.
    #[serde(with = "fixed_num_serde")]
    pub gunshot_radius: Fixed,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            burst_count: 3,
            hide_wait: Fixed::from_num(1),
            total_peek_duration: Fixed::from_num(3),
            retreat_health_ratio: Fixed::from_num(0.3),
            retreat_grace: Fixed::from_num(4),
            cover_fail_limit: 3,
            irritation_duration: Fixed::from_num(15),
            follow_distance: Fixed::from_num(10),
            stand_duration: Fixed::from_num(3),
            circle_distance: Fixed::from_num(7),
            magazine_size: 10,
            reload_duration: Fixed::from_num(2.2),
            rounds_per_second: Fixed::from_num(5),
            gunshot_radius: Fixed::from_num(45),
        }
    }
}

impl CombatConfig {
    /// Length of one fire window: the peek budget split across the
    /// position's bursts, never below one tick.
    #[must_use]
    pub fn fire_window_ticks(&self) -> u64 {
        let budget = secs_to_ticks(self.total_peek_duration);
        (budget / u64::from(self.burst_count.max(1))).max(1)
    }

    /// Ticks spent hidden between fire windows.
    #[must_use]
    pub fn hide_wait_ticks(&self) -> u64 {
        secs_to_ticks(self.hide_wait)
    }

    /// Ticks a magazine swap takes.
    #[must_use]
    pub fn reload_ticks(&self) -> u64 {
        secs_to_ticks(self.reload_duration)
    }

    /// Ticks to sit on a failed retreat search before escalating.
    #[must_use]
    pub fn retreat_grace_ticks(&self) -> u64 {
        secs_to_ticks(self.retreat_grace)
    }

    /// Ticks of unseen-threat combat before patience runs out.
    #[must_use]
    pub fn irritation_ticks(&self) -> u64 {
        secs_to_ticks(self.irritation_duration)
    }

    /// Ticks of the default patrol pause.
    #[must_use]
    pub fn stand_ticks(&self) -> u64 {
        secs_to_ticks(self.stand_duration)
    }

    /// Magazine drain per tick while the trigger is held.
    #[must_use]
    pub fn rounds_per_tick(&self) -> Fixed {
        self.rounds_per_second / Fixed::from_num(TICK_RATE)
    }
}

/// Grenade tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrenadeConfig {
    /// Grenades carried at spawn.
    pub count: u32,
    /// Seconds between throws.
    #[serde(with = "fixed_num_serde")]
    pub cooldown: Fixed,
    /// Shortest sensible throw.
    #[serde(with = "fixed_num_serde")]
    pub min_distance: Fixed,
    /// Longest sensible throw.
    #[serde(with = "fixed_num_serde")]
    pub max_distance: Fixed,
    /// Blast radius used for friend checks and danger records.
    #[serde(with = "fixed_num_serde")]
    pub blast_radius: Fixed,
    /// Seconds between landing and detonation.
    #[serde(with = "fixed_num_serde")]
    pub fuse: Fixed,
}

impl Default for GrenadeConfig {
    fn default() -> Self {
        Self {
            count: 2,
            cooldown: Fixed::from_num(8),
            min_distance: Fixed::from_num(8),
            max_distance: Fixed::from_num(18),
            blast_radius: Fixed::from_num(4.5),
            fuse: Fixed::from_num(3),
        }
    }
}

impl GrenadeConfig {
    /// Ticks between throws.
    #[must_use]
    pub fn cooldown_ticks(&self) -> u64 {
        secs_to_ticks(self.cooldown)
    }
}

/// Kinematic motor tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Walking speed, units per second.
    #[serde(with = "fixed_num_serde")]
    pub walk_speed: Fixed,
    /// Running speed, units per second.
    #[serde(with = "fixed_num_serde")]
    pub run_speed: Fixed,
    /// Within this distance a destination counts as reached.
    #[serde(with = "fixed_num_serde")]
    pub arrive_distance: Fixed,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            walk_speed: Fixed::from_num(2),
            run_speed: Fixed::from_num(5),
            arrive_distance: Fixed::from_num(0.3),
        }
    }
}

/// Aggregate configuration for every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Perception tunables.
    pub perception: PerceptionConfig,
    /// Threat belief tunables.
    pub threat: ThreatConfig,
    /// Cover tunables.
    pub cover: CoverConfig,
    /// Search tunables.
    pub search: SearchConfig,
    /// Squad tunables.
    pub squad: SquadConfig,
    /// State machine tunables.
    pub combat: CombatConfig,
    /// Grenade tunables.
    pub grenade: GrenadeConfig,
    /// Motor tunables.
    pub motor: MotorConfig,
}

impl AiConfig {
    /// Parse a config from a RON string, falling back to defaults for
    /// omitted sections.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source)
            .map_err(|e| TacticsError::ConfigParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break the component contracts.
    pub fn validate(&self) -> Result<()> {
        fn positive(field: &'static str, value: Fixed) -> Result<()> {
            if value <= Fixed::ZERO {
                return Err(TacticsError::InvalidConfigValue {
                    field,
                    message: format!("must be positive, got {value}"),
                });
            }
            Ok(())
        }

        positive("sight_distance", self.perception.sight_distance)?;
        positive("recheck_delay", self.perception.recheck_delay)?;
        positive("max_cover_distance", self.cover.max_cover_distance)?;
        positive("avoid_distance", self.cover.avoid_distance)?;
        positive("occupy_spacing", self.cover.occupy_spacing)?;
        positive("slide_step", self.cover.slide_step)?;
        positive("point_spacing", self.search.point_spacing)?;
        positive("zone_grid_step", self.search.zone_grid_step)?;
        positive("block_radius", self.search.block_radius)?;
        positive("walk_speed", self.motor.walk_speed)?;
        positive("run_speed", self.motor.run_speed)?;

        let angle = self.cover.max_tall_cover_angle_deg;
        if angle <= Fixed::ZERO || angle > Fixed::from_num(90) {
            return Err(TacticsError::InvalidConfigValue {
                field: "max_tall_cover_angle_deg",
                message: format!("must be in (0, 90], got {angle}"),
            });
        }

        if self.combat.burst_count == 0 {
            return Err(TacticsError::InvalidConfigValue {
                field: "burst_count",
                message: "must be at least 1".to_string(),
            });
        }
        if self.combat.magazine_size == 0 {
            return Err(TacticsError::InvalidConfigValue {
                field: "magazine_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.threat.guess_error_min > self.threat.guess_error_max {
            return Err(TacticsError::InvalidConfigValue {
                field: "guess_error_min",
                message: "must not exceed guess_error_max".to_string(),
            });
        }
        if self.search.touch_distance > self.search.max_visibility {
            return Err(TacticsError::InvalidConfigValue {
                field: "touch_distance",
                message: "must not exceed max_visibility".to_string(),
            });
        }

        Ok(())
    }
}
