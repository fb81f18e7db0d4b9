//! Line-of-sight checks and periodic enemy scanning.
//!
//! Sight combines three gates: range (attenuated when the target
//! stands in a vision zone), facing angle against the field of view,
//! and grid occlusion that respects the target's stance. Scans run on
//! a jittered timer per agent so squads do not re-scan in lockstep.

use serde::{Deserialize, Serialize};

use crate::actor::{Actor, ActorArena, ActorId};
use crate::config::{secs_to_ticks, PerceptionConfig};
use crate::math::{fixed_cos_deg, Fixed, SimRng, Vec2Fixed};
use crate::nav::OcclusionGrid;
use crate::zone::ZoneSet;

/// Cosine threshold for a full field-of-view angle in degrees.
#[must_use]
pub fn fov_cos(fov_deg: Fixed) -> Fixed {
    fixed_cos_deg(fov_deg / 2)
}

/// Whether `observer` can see `target` right now.
///
/// `sight_distance` is the base range before vision-zone attenuation,
/// `min_cos` the facing threshold from [`fov_cos`].
#[must_use]
pub fn is_in_sight(
    grid: &OcclusionGrid,
    zones: &ZoneSet,
    observer: &Actor,
    target: &Actor,
    sight_distance: Fixed,
    min_cos: Fixed,
) -> bool {
    let range = sight_distance * zones.sight_multiplier_at(target.position);
    if observer.position.distance_squared(target.position) > range * range {
        return false;
    }

    let dir = observer.position.direction_to(target.position);
    // Coincident positions see each other regardless of facing
    if dir != Vec2Fixed::ZERO && observer.facing.dot(dir) < min_cos {
        return false;
    }

    grid.has_line_of_sight(observer.position, target.position, target.is_crouched())
}

/// Result of one enemy scan, diffed against the previous scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Enemies in sight, ascending id order.
    pub visible: Vec<ActorId>,
    /// Newly sighted since the previous scan.
    pub appeared: Vec<ActorId>,
    /// Lost from sight since the previous scan.
    pub vanished: Vec<ActorId>,
}

/// Scan every living enemy of the observer's side and diff against
/// `prev_visible` (which must be sorted ascending).
#[must_use]
pub fn scan_enemies(
    arena: &ActorArena,
    grid: &OcclusionGrid,
    zones: &ZoneSet,
    observer: &Actor,
    prev_visible: &[ActorId],
    config: &PerceptionConfig,
) -> ScanOutcome {
    let min_cos = fov_cos(config.fov_deg);
    let mut visible = Vec::new();
    for id in arena.living_enemies_of(observer.side) {
        let Some(target) = arena.get(id) else {
            continue;
        };
        if is_in_sight(grid, zones, observer, target, config.sight_distance, min_cos) {
            visible.push(id);
        }
    }

    let appeared = visible
        .iter()
        .copied()
        .filter(|id| !prev_visible.contains(id))
        .collect();
    let vanished = prev_visible
        .iter()
        .copied()
        .filter(|id| !visible.contains(id))
        .collect();

    ScanOutcome {
        visible,
        appeared,
        vanished,
    }
}

/// Next scan tick: the configured delay with a uniform jitter so
/// agents spawned together drift apart. Always at least one tick out.
#[must_use]
pub fn schedule_next_scan(now: u64, config: &PerceptionConfig, rng: &mut SimRng) -> u64 {
    let base = Fixed::from_num(secs_to_ticks(config.recheck_delay));
    let delay = (base * rng.jitter(config.recheck_jitter))
        .round()
        .to_num::<i64>()
        .max(1);
    now + delay as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{GunState, Health, Stance};
    use crate::events::MoveSpeed;
    use crate::nav::CellKind;
    use crate::zone::Rect;

    fn fixed(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: f64, y: f64) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn actor_at(side: u8, position: Vec2Fixed, facing: Vec2Fixed) -> Actor {
        Actor {
            id: 0,
            side,
            position,
            facing,
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

    fn open_grid() -> OcclusionGrid {
        OcclusionGrid::new(64, 64, Fixed::ONE)
    }

    #[test]
    fn test_facing_gates_sight() {
        let grid = open_grid();
        let zones = ZoneSet::default();
        let config = PerceptionConfig::default();
        let min_cos = fov_cos(config.fov_deg);

        let observer = actor_at(0, vec2(10.0, 10.0), vec2(0.0, 1.0));
        let ahead = actor_at(1, vec2(10.0, 20.0), vec2(0.0, 1.0));
        let behind = actor_at(1, vec2(10.0, 2.0), vec2(0.0, 1.0));

        assert!(is_in_sight(&grid, &zones, &observer, &ahead, config.sight_distance, min_cos));
        assert!(!is_in_sight(&grid, &zones, &observer, &behind, config.sight_distance, min_cos));
    }

    #[test]
    fn test_vision_zone_shortens_range() {
        let grid = open_grid();
        let mut zones = ZoneSet::default();
        zones.add_vision(Rect::new(vec2(25.0, 0.0), vec2(63.0, 63.0)), fixed(0.5));
        let config = PerceptionConfig::default();
        let min_cos = fov_cos(config.fov_deg);

        let observer = actor_at(0, vec2(2.0, 10.0), vec2(1.0, 0.0));
        // 28 units out, inside the zone: effective range 17.5
        let hidden = actor_at(1, vec2(30.0, 10.0), vec2(0.0, 1.0));
        // Same distance, outside the zone
        let exposed = actor_at(1, vec2(2.0, 38.0), vec2(0.0, 1.0));

        assert!(!is_in_sight(&grid, &zones, &observer, &hidden, config.sight_distance, min_cos));
        // Observer faces east; turn to face the second target
        let mut observer_north = observer.clone();
        observer_north.facing = vec2(0.0, 1.0);
        assert!(is_in_sight(&grid, &zones, &observer_north, &exposed, config.sight_distance, min_cos));
    }

    #[test]
    fn test_low_wall_hides_crouchers_only() {
        let mut grid = open_grid();
        grid.fill_rect(vec2(9.0, 14.0), vec2(11.0, 15.0), CellKind::LowWall);
        let zones = ZoneSet::default();
        let config = PerceptionConfig::default();
        let min_cos = fov_cos(config.fov_deg);

        let observer = actor_at(0, vec2(10.0, 10.0), vec2(0.0, 1.0));
        let mut target = actor_at(1, vec2(10.0, 20.0), vec2(0.0, 1.0));

        assert!(is_in_sight(&grid, &zones, &observer, &target, config.sight_distance, min_cos));
        target.stance = Stance::Crouching;
        assert!(!is_in_sight(&grid, &zones, &observer, &target, config.sight_distance, min_cos));
    }

    #[test]
    fn test_scan_diffs_against_previous() {
        let grid = open_grid();
        let zones = ZoneSet::default();
        let config = PerceptionConfig::default();
        let mut arena = ActorArena::new();

        let observer_id = arena.insert(actor_at(0, vec2(10.0, 10.0), vec2(0.0, 1.0)));
        let near = arena.insert(actor_at(1, vec2(10.0, 20.0), vec2(0.0, 1.0)));
        let far = arena.insert(actor_at(1, vec2(10.0, 60.0), vec2(0.0, 1.0)));

        let observer = arena.get(observer_id).unwrap().clone();
        let outcome = scan_enemies(&arena, &grid, &zones, &observer, &[far], &config);

        assert_eq!(outcome.visible, vec![near]);
        assert_eq!(outcome.appeared, vec![near]);
        assert_eq!(outcome.vanished, vec![far]);
    }

    #[test]
    fn test_scan_schedule_stays_in_band() {
        let config = PerceptionConfig::default();
        let mut rng = SimRng::new(11);
        let base = secs_to_ticks(config.recheck_delay) as i64;
        let spread = (Fixed::from_num(base) * config.recheck_jitter).ceil().to_num::<i64>();

        for _ in 0..50 {
            let next = schedule_next_scan(100, &config, &mut rng);
            assert!(next > 100);
            assert!((next as i64 - 100 - base).abs() <= spread);
        }
    }
}
