//! Cover candidate enumeration and selection.
//!
//! Selection is greedy: candidates are sorted by distance to the
//! seeker and the first one passing every validity gate wins. Nearest
//! valid, never globally safest.

use serde::{Deserialize, Serialize};

use crate::actor::{Actor, ActorId};
use crate::config::CoverConfig;
use crate::cover::{Cover, CoverArena, CoverId};
use crate::math::{fixed_cos_deg, fixed_serde, Fixed, Vec2Fixed};
use crate::nav::OcclusionGrid;

/// Which end of a tall cover a candidate peeks around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CornerSide {
    /// Peek past the left end.
    Left,
    /// Peek past the right end.
    Right,
}

/// One possible hiding slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoverCandidate {
    /// The cover piece.
    pub cover: CoverId,
    /// Exact slot to stand on.
    pub position: Vec2Fixed,
    /// Corner for tall covers, `None` for low slots.
    pub corner: Option<CornerSide>,
    /// Distance from the seeker at enumeration time.
    #[serde(with = "fixed_serde")]
    pub distance: Fixed,
}

/// Reusable candidate buffer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverQuery {
    candidates: Vec<CoverCandidate>,
}

impl CoverQuery {
    /// Empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the candidate list for `seeker` standing at its current
    /// position. Covers beyond `max_distance` are skipped; low-cover
    /// slots slide sideways off occupied ground already here.
    pub fn reset(
        &mut self,
        covers: &CoverArena,
        seeker: ActorId,
        seeker_pos: Vec2Fixed,
        max_distance: Fixed,
        config: &CoverConfig,
    ) {
        self.candidates.clear();
        let max_sq = max_distance * max_distance;

        for cover in covers.iter() {
            if cover.position.distance_squared(seeker_pos) > max_sq {
                continue;
            }
            if cover.is_tall() {
                // Only unlinked ends can be peeked around
                if cover.left_link.is_none() {
                    self.push_corner(cover, CornerSide::Left, seeker_pos, config);
                }
                if cover.right_link.is_none() {
                    self.push_corner(cover, CornerSide::Right, seeker_pos, config);
                }
            } else if let Some(position) =
                slide_to_free_slot(covers, cover, seeker, seeker_pos, config)
            {
                self.candidates.push(CoverCandidate {
                    cover: cover.id,
                    position,
                    corner: None,
                    distance: seeker_pos.distance(position),
                });
            }
        }

        self.candidates
            .sort_by(|a, b| (a.distance, a.cover).cmp(&(b.distance, b.cover)));
    }

    fn push_corner(
        &mut self,
        cover: &Cover,
        side: CornerSide,
        seeker_pos: Vec2Fixed,
        config: &CoverConfig,
    ) {
        let corner = match side {
            CornerSide::Left => cover.left_corner(config.corner_offset),
            CornerSide::Right => cover.right_corner(config.corner_offset),
        };
        let position = corner - cover.forward() * config.cover_margin;
        self.candidates.push(CoverCandidate {
            cover: cover.id,
            position,
            corner: Some(side),
            distance: seeker_pos.distance(position),
        });
    }

    /// Candidates in ascending distance order.
    #[must_use]
    pub fn candidates(&self) -> &[CoverCandidate] {
        &self.candidates
    }
}

/// Find a free low-cover slot near the seeker's projection, sliding
/// sideways in alternating steps. `None` when the whole segment is
/// contested.
fn slide_to_free_slot(
    covers: &CoverArena,
    cover: &Cover,
    seeker: ActorId,
    seeker_pos: Vec2Fixed,
    config: &CoverConfig,
) -> Option<Vec2Fixed> {
    let half = cover.width() / 2;
    let ideal = (seeker_pos - cover.position).dot(cover.left()).clamp(-half, half);

    let step = config.slide_step.max(Fixed::from_num(0.1));
    let max_steps = ((half * 2) / step).to_num::<i64>().clamp(0, 32) * 2 + 1;

    for n in 0..max_steps {
        // 0, +s, -s, +2s, -2s, ...
        let magnitude = step * Fixed::from_num((n + 1) / 2);
        let lateral = if n % 2 == 0 { ideal - magnitude } else { ideal + magnitude };
        if lateral < -half || lateral > half {
            continue;
        }
        let slot = cover.position + cover.left() * lateral - cover.forward() * config.cover_margin;
        if !covers.is_position_taken(cover.id, slot, seeker, config.occupy_spacing) {
            return Some(slot);
        }
    }
    None
}

/// Every gate a candidate must pass before an agent commits to it.
#[must_use]
pub fn is_valid_cover(
    covers: &CoverArena,
    grid: &OcclusionGrid,
    candidate: &CoverCandidate,
    seeker: &Actor,
    threat_pos: Vec2Fixed,
    check_path: bool,
    config: &CoverConfig,
) -> bool {
    let Some(cover) = covers.get(candidate.cover) else {
        return false;
    };

    // (a) the slot itself keeps clear of the threat
    if candidate.position.distance_squared(threat_pos)
        < config.avoid_distance * config.avoid_distance
    {
        return false;
    }

    // (b) the cover actually faces the threat
    let max_angle = if cover.is_tall() {
        config.max_tall_cover_angle_deg
    } else {
        config.max_low_cover_angle_deg
    };
    let dir = cover.position.direction_to(threat_pos);
    if !cover.is_front(dir, fixed_cos_deg(max_angle)) {
        return false;
    }

    // (c) nobody else holds the slot, neighbors included
    if covers.is_position_taken(candidate.cover, candidate.position, seeker.id, config.occupy_spacing)
    {
        return false;
    }

    // (d) corner peeks must not wrap past their own end, and the
    // corner needs a clear firing line toward the threat
    if let Some(side) = candidate.corner {
        let corner = match side {
            CornerSide::Left => cover.left_corner(config.corner_offset),
            CornerSide::Right => cover.right_corner(config.corner_offset),
        };
        let past_end = match side {
            CornerSide::Left => (threat_pos - corner).dot(cover.left()),
            CornerSide::Right => (threat_pos - corner).dot(cover.right()),
        };
        if past_end > Fixed::ZERO && !cover.is_front_field(threat_pos, Fixed::ZERO) {
            return false;
        }

        let to_threat = corner.direction_to(threat_pos);
        if to_threat != Vec2Fixed::ZERO {
            let limit = corner.distance(threat_pos).min(config.corner_ray_distance);
            if grid.cast_free_distance(corner, to_threat, limit, false) < limit {
                return false;
            }
        }
    }

    // (e) reachable without crossing the threat's ground
    if check_path {
        let Some(path) = grid.find_path(seeker.position, candidate.position) else {
            return false;
        };
        let avoid_sq = config.avoid_distance * config.avoid_distance;
        if path
            .iter()
            .skip(1)
            .any(|corner| corner.distance_squared(threat_pos) < avoid_sq)
        {
            return false;
        }
    }

    true
}

/// Nearest valid candidate for `seeker` against a threat at
/// `threat_pos`. `exclude` drops the currently held cover so a
/// better-cover search cannot return where the agent already stands.
#[must_use]
pub fn find_cover(
    covers: &CoverArena,
    grid: &OcclusionGrid,
    seeker: &Actor,
    threat_pos: Vec2Fixed,
    check_path: bool,
    exclude: Option<CoverId>,
    config: &CoverConfig,
) -> Option<CoverCandidate> {
    let mut query = CoverQuery::new();
    query.reset(
        covers,
        seeker.id,
        seeker.position,
        config.max_cover_distance,
        config,
    );
    query
        .candidates()
        .iter()
        .filter(|c| Some(c.cover) != exclude)
        .find(|c| is_valid_cover(covers, grid, c, seeker, threat_pos, check_path, config))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{GunState, Health, Stance};
    use crate::cover::CoverParams;
    use crate::events::MoveSpeed;
    use crate::nav::CellKind;

    fn fixed(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: f64, y: f64) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn seeker_at(position: Vec2Fixed) -> Actor {
        Actor {
            id: 1,
            side: 0,
            position,
            facing: vec2(0.0, 1.0),
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

    fn insert_cover(
        covers: &mut CoverArena,
        position: Vec2Fixed,
        width: f64,
        height: f64,
    ) -> CoverId {
        covers.insert(
            CoverParams {
                position,
                forward: vec2(0.0, 1.0),
                width: fixed(width),
                height: fixed(height),
            },
            CoverConfig::default().tall_threshold,
        )
    }

    fn open_grid() -> OcclusionGrid {
        OcclusionGrid::new(64, 64, Fixed::ONE)
    }

    #[test]
    fn test_tall_cover_yields_open_corners() {
        let config = CoverConfig::default();
        let mut covers = CoverArena::new();
        let a = insert_cover(&mut covers, vec2(10.0, 10.0), 4.0, 2.0);
        let b = insert_cover(&mut covers, vec2(15.0, 10.0), 4.0, 2.0);

        let mut query = CoverQuery::new();
        query.reset(&covers, 1, vec2(12.0, 5.0), fixed(30.0), &config);
        assert_eq!(query.candidates().len(), 4);

        // Linking closes the inner corners
        covers.link(a, b);
        query.reset(&covers, 1, vec2(12.0, 5.0), fixed(30.0), &config);
        let sides: Vec<_> = query.candidates().iter().map(|c| (c.cover, c.corner)).collect();
        assert_eq!(query.candidates().len(), 2);
        assert!(sides.contains(&(a, Some(CornerSide::Left))));
        assert!(sides.contains(&(b, Some(CornerSide::Right))));
    }

    #[test]
    fn test_candidates_sorted_by_distance() {
        let config = CoverConfig::default();
        let mut covers = CoverArena::new();
        insert_cover(&mut covers, vec2(30.0, 10.0), 4.0, 2.0);
        insert_cover(&mut covers, vec2(12.0, 10.0), 4.0, 2.0);

        let mut query = CoverQuery::new();
        query.reset(&covers, 1, vec2(10.0, 10.0), fixed(40.0), &config);

        let distances: Vec<Fixed> = query.candidates().iter().map(|c| c.distance).collect();
        let mut sorted = distances.clone();
        sorted.sort_unstable();
        assert_eq!(distances, sorted);
    }

    #[test]
    fn test_low_cover_slides_off_occupied_slot() {
        let config = CoverConfig::default();
        let mut covers = CoverArena::new();
        let id = insert_cover(&mut covers, vec2(10.0, 10.0), 6.0, 1.0);

        let mut query = CoverQuery::new();
        query.reset(&covers, 1, vec2(10.0, 5.0), fixed(30.0), &config);
        let free = query.candidates()[0].position;

        // Park someone on the ideal slot; the next query slides aside
        covers.get_mut(id).unwrap().register_user(7, free);
        query.reset(&covers, 1, vec2(10.0, 5.0), fixed(30.0), &config);
        assert_eq!(query.candidates().len(), 1);
        let slid = query.candidates()[0].position;
        assert!(slid.distance(free) >= config.occupy_spacing);
    }

    #[test]
    fn test_crowded_low_cover_is_dropped() {
        let config = CoverConfig {
            occupy_spacing: fixed(2.0),
            ..Default::default()
        };
        let mut covers = CoverArena::new();
        let id = insert_cover(&mut covers, vec2(10.0, 10.0), 2.0, 1.0);

        covers.get_mut(id).unwrap().register_user(7, vec2(10.0, 9.55));

        let mut query = CoverQuery::new();
        query.reset(&covers, 1, vec2(10.0, 5.0), fixed(30.0), &config);
        assert!(query.candidates().is_empty());
    }

    #[test]
    fn test_validity_rejects_threat_side_and_close_threats() {
        let config = CoverConfig::default();
        let grid = open_grid();
        let mut covers = CoverArena::new();
        insert_cover(&mut covers, vec2(10.0, 10.0), 4.0, 1.0);
        let seeker = seeker_at(vec2(10.0, 5.0));

        let mut query = CoverQuery::new();
        query.reset(&covers, seeker.id, seeker.position, fixed(30.0), &config);
        let candidate = query.candidates()[0];

        // Threat straight ahead of the cover, far enough
        assert!(is_valid_cover(&covers, &grid, &candidate, &seeker, vec2(10.0, 30.0), false, &config));
        // Threat inside the avoid radius
        assert!(!is_valid_cover(&covers, &grid, &candidate, &seeker, vec2(10.0, 12.0), false, &config));
        // Threat behind the cover: angle gate fails
        assert!(!is_valid_cover(&covers, &grid, &candidate, &seeker, vec2(10.0, 2.0), false, &config));
    }

    #[test]
    fn test_corner_needs_clear_firing_line() {
        let config = CoverConfig::default();
        let mut grid = open_grid();
        let mut covers = CoverArena::new();
        let a = insert_cover(&mut covers, vec2(10.0, 10.0), 4.0, 2.0);
        let b = insert_cover(&mut covers, vec2(15.0, 10.0), 4.0, 2.0);
        covers.link(a, b);
        let seeker = seeker_at(vec2(12.0, 5.0));
        let threat = vec2(12.0, 30.0);

        let mut query = CoverQuery::new();
        query.reset(&covers, seeker.id, seeker.position, fixed(30.0), &config);
        let left = *query
            .candidates()
            .iter()
            .find(|c| c.corner == Some(CornerSide::Left))
            .unwrap();
        assert!(is_valid_cover(&covers, &grid, &left, &seeker, threat, false, &config));

        // Wall in front of the left corner kills the peek
        grid.fill_rect(vec2(6.0, 14.0), vec2(9.0, 16.0), CellKind::Wall);
        assert!(!is_valid_cover(&covers, &grid, &left, &seeker, threat, false, &config));
    }

    #[test]
    fn test_corner_rejects_wrapped_threat() {
        let config = CoverConfig::default();
        let grid = open_grid();
        let mut covers = CoverArena::new();
        let a = insert_cover(&mut covers, vec2(10.0, 10.0), 4.0, 2.0);
        let b = insert_cover(&mut covers, vec2(15.0, 10.0), 4.0, 2.0);
        covers.link(a, b);
        let seeker = seeker_at(vec2(12.0, 5.0));

        let mut query = CoverQuery::new();
        query.reset(&covers, seeker.id, seeker.position, fixed(30.0), &config);
        let left = *query
            .candidates()
            .iter()
            .find(|c| c.corner == Some(CornerSide::Left))
            .unwrap();

        // Still inside the 40 degree facing arc, but laterally past
        // the left end: peeking there offers no protection
        let wrapped = vec2(5.0, 25.0);
        assert!(!is_valid_cover(&covers, &grid, &left, &seeker, wrapped, false, &config));
    }

    #[test]
    fn test_path_gate_avoids_threat_ground() {
        let config = CoverConfig::default();
        let mut grid = open_grid();
        let mut covers = CoverArena::new();
        covers.insert(
            CoverParams {
                position: vec2(30.0, 30.0),
                forward: vec2(1.0, 0.0),
                width: fixed(4.0),
                height: fixed(1.0),
            },
            config.tall_threshold,
        );
        let seeker = seeker_at(vec2(30.0, 10.0));
        let threat = vec2(45.0, 26.0);

        let mut query = CoverQuery::new();
        query.reset(&covers, seeker.id, seeker.position, fixed(40.0), &config);
        let candidate = query.candidates()[0];

        // Open ground: the straight route stays well clear
        assert!(is_valid_cover(&covers, &grid, &candidate, &seeker, threat, true, &config));

        // Wall off the middle so the only gap sits right under the
        // threat; the detour corner lands inside the avoid radius
        grid.fill_rect(vec2(0.0, 19.0), vec2(43.0, 21.0), CellKind::Wall);
        grid.fill_rect(vec2(47.0, 19.0), vec2(63.0, 21.0), CellKind::Wall);
        assert!(!is_valid_cover(&covers, &grid, &candidate, &seeker, threat, true, &config));
    }
}
