//! Systematic sweep planning for lost threats.
//!
//! The planner turns static geometry into a consumable to-do list:
//! hiding spots along cover chains plus grid samples of designer
//! search zones, clustered into blocks. Agents pull one point at a
//! time, verify it with their own eyes (or feet), and share completed
//! points with the squad so nobody sweeps the same corner twice.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{secs_to_ticks, CoverConfig, SearchConfig};
use crate::cover::CoverArena;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::nav::{path_length, OcclusionGrid};
use crate::perception::fov_cos;
use crate::zone::ZoneSet;

/// One spot that might conceal an enemy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchPoint {
    /// The spot itself.
    pub position: Vec2Fixed,
    /// Stand-off position clear of the geometry, for wrong-side
    /// approaches.
    pub approach: Option<Vec2Fixed>,
    /// Side the spot must be verified from; zero means any side.
    pub normal: Vec2Fixed,
    /// How far away the spot can be cleared by sight.
    #[serde(with = "fixed_serde")]
    pub visibility: Fixed,
    /// Neighbor toward the left end of the edge, if any.
    pub left: Option<usize>,
    /// Neighbor toward the right end of the edge, if any.
    pub right: Option<usize>,
    /// Walk-around target past the left end of the edge.
    pub left_flank: Option<Vec2Fixed>,
    /// Walk-around target past the right end of the edge.
    pub right_flank: Option<Vec2Fixed>,
    /// Sight never clears this spot; it must be walked to.
    pub requires_reach: bool,
}

/// Cluster of pending points with a running centroid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchBlock {
    /// Indices into the planner's point list.
    pub points: Vec<usize>,
    /// Mean position of the members.
    pub centroid: Vec2Fixed,
}

impl SearchBlock {
    fn recompute(&mut self, points: &[SearchPoint]) {
        if self.points.is_empty() {
            return;
        }
        let mut sum = Vec2Fixed::ZERO;
        for idx in &self.points {
            sum = sum + points[*idx].position;
        }
        let count = Fixed::from_num(self.points.len() as i64);
        self.centroid = Vec2Fixed::new(sum.x / count, sum.y / count);
    }
}

/// A spot that was recently cleared.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InvestigatedPoint {
    /// Where.
    pub position: Vec2Fixed,
    /// When.
    pub tick: u64,
}

/// Where to move next while searching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMove {
    /// Movement goal for the motor.
    pub target: Vec2Fixed,
    /// Close in carefully instead of running.
    pub walk: bool,
}

/// Per-agent sweep state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPlanner {
    points: Vec<SearchPoint>,
    blocks: Vec<SearchBlock>,
    current: Option<usize>,
    active_block: Option<usize>,
    last_visited: Option<usize>,
    momentum: Vec2Fixed,
    cursor: Option<Vec2Fixed>,
    investigated: Vec<InvestigatedPoint>,
}

impl SearchPlanner {
    /// Empty planner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Nothing left to sweep. The next objective request should
    /// regenerate.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.current.is_none() && self.blocks.iter().all(|b| b.points.is_empty())
    }

    /// The point currently being swept.
    #[must_use]
    pub fn current_point(&self) -> Option<&SearchPoint> {
        self.current.map(|idx| &self.points[idx])
    }

    /// Pending points across all blocks. The current objective stays
    /// in its block until it is actually investigated.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.blocks.iter().map(|b| b.points.len()).sum()
    }

    /// Recently cleared spots, unexpired ones only at generation time.
    #[must_use]
    pub fn investigated(&self) -> &[InvestigatedPoint] {
        &self.investigated
    }

    /// Re-aim the sweep around a position: drop the current objective
    /// and block so the next selection starts there. Momentum is kept,
    /// so an ongoing pass carries its direction through.
    pub fn refocus(&mut self, position: Vec2Fixed) {
        self.current = None;
        self.active_block = None;
        self.cursor = Some(position);
    }

    /// Rebuild the point list from cover chains and search zones.
    /// Expired investigated records are dropped; unexpired ones keep
    /// their spots out of the new list.
    pub fn regenerate(
        &mut self,
        covers: &CoverArena,
        zones: &ZoneSet,
        grid: &OcclusionGrid,
        cover_config: &CoverConfig,
        config: &SearchConfig,
        now: u64,
    ) {
        let ttl = secs_to_ticks(config.investigated_ttl);
        self.investigated
            .retain(|r| now.saturating_sub(r.tick) < ttl);

        self.points.clear();
        self.blocks.clear();
        self.current = None;
        self.active_block = None;
        self.last_visited = None;

        self.generate_chain_points(covers, grid, cover_config, config);
        self.generate_zone_points(zones, grid, config);
        self.build_blocks(config);

        debug!(
            points = self.points.len(),
            blocks = self.blocks.len(),
            "search plan regenerated"
        );
    }

    fn generate_chain_points(
        &mut self,
        covers: &CoverArena,
        grid: &OcclusionGrid,
        cover_config: &CoverConfig,
        config: &SearchConfig,
    ) {
        let mut seen = vec![false; covers.len()];
        for id in 0..covers.len() as u32 {
            if seen[id as usize] {
                continue;
            }
            let chain = covers.chain_of(id);
            for c in &chain {
                seen[*c as usize] = true;
            }

            let first = chain.first().and_then(|c| covers.get(*c));
            let last = chain.last().and_then(|c| covers.get(*c));
            let (Some(first), Some(last)) = (first, last) else {
                continue;
            };
            let left_flank = first.left_corner(config.approach_distance)
                - first.forward() * cover_config.cover_margin;
            let right_flank = last.right_corner(config.approach_distance)
                - last.forward() * cover_config.cover_margin;

            let mut prev: Option<usize> = None;
            for cover_id in chain {
                let Some(cover) = covers.get(cover_id) else {
                    continue;
                };
                let count = (cover.width() / config.point_spacing)
                    .round()
                    .to_num::<i64>()
                    .max(1);
                let half = cover.width() / 2;
                for k in 0..count {
                    // Centered samples, walked left end to right end
                    let lateral =
                        half - cover.width() * Fixed::from_num(2 * k + 1) / Fixed::from_num(2 * count);
                    let position = cover.position + cover.left() * lateral
                        - cover.forward() * cover_config.cover_margin;

                    if grid.world_to_grid(position).is_none()
                        || self.recently_investigated(position, config.share_radius)
                    {
                        continue;
                    }

                    let normal = -cover.forward();
                    let (visibility, requires_reach) =
                        compute_visibility(grid, position, normal, config);
                    let idx = self.points.len();
                    self.points.push(SearchPoint {
                        position,
                        approach: Some(position + normal * config.approach_distance),
                        normal,
                        visibility,
                        left: prev,
                        right: None,
                        left_flank: Some(left_flank),
                        right_flank: Some(right_flank),
                        requires_reach,
                    });
                    if let Some(p) = prev {
                        self.points[p].right = Some(idx);
                    }
                    prev = Some(idx);
                }
            }
        }
    }

    fn generate_zone_points(&mut self, zones: &ZoneSet, grid: &OcclusionGrid, config: &SearchConfig) {
        let step = config.zone_grid_step.max(Fixed::from_num(0.5));
        for zone in zones.search_zones() {
            let mut x = zone.rect.min.x;
            while x <= zone.rect.max.x {
                let mut y = zone.rect.min.y;
                while y <= zone.rect.max.y {
                    let position = Vec2Fixed::new(x, y);
                    let walkable = grid
                        .world_to_grid(position)
                        .is_some_and(|(cx, cy)| grid.is_walkable(cx, cy));
                    if walkable && !self.recently_investigated(position, config.share_radius) {
                        let (visibility, requires_reach) =
                            compute_visibility(grid, position, Vec2Fixed::ZERO, config);
                        self.points.push(SearchPoint {
                            position,
                            approach: None,
                            normal: Vec2Fixed::ZERO,
                            visibility,
                            left: None,
                            right: None,
                            left_flank: None,
                            right_flank: None,
                            requires_reach,
                        });
                    }
                    y += step;
                }
                x += step;
            }
        }
    }

    fn build_blocks(&mut self, config: &SearchConfig) {
        for idx in 0..self.points.len() {
            let position = self.points[idx].position;
            let mut placed = false;
            for block in &mut self.blocks {
                if block.centroid.distance(position) <= config.block_radius {
                    block.points.push(idx);
                    block.recompute(&self.points);
                    placed = true;
                    break;
                }
            }
            if !placed {
                self.blocks.push(SearchBlock {
                    points: vec![idx],
                    centroid: position,
                });
            }
        }

        // Clusters can drift into each other while growing
        loop {
            let mut merge: Option<(usize, usize)> = None;
            'scan: for i in 0..self.blocks.len() {
                for j in (i + 1)..self.blocks.len() {
                    if self.blocks[i].centroid.distance(self.blocks[j].centroid)
                        <= config.block_radius
                    {
                        merge = Some((i, j));
                        break 'scan;
                    }
                }
            }
            let Some((i, j)) = merge else { break };
            let moved = std::mem::take(&mut self.blocks[j].points);
            self.blocks[i].points.extend(moved);
            self.blocks[i].recompute(&self.points);
            self.blocks.remove(j);
        }
    }

    fn recently_investigated(&self, position: Vec2Fixed, radius: Fixed) -> bool {
        self.investigated
            .iter()
            .any(|r| r.position.distance(position) <= radius)
    }

    /// Pick the next point to sweep. Keeps the current one if still
    /// pending; otherwise selects a block, then a point inside it.
    pub fn select_next(&mut self, from: Vec2Fixed, config: &SearchConfig) -> Option<usize> {
        if self.current.is_some() {
            return self.current;
        }
        let origin = self.cursor.unwrap_or(from);

        let need_block = match self.active_block {
            Some(b) => self.blocks.get(b).map_or(true, |blk| blk.points.is_empty()),
            None => true,
        };
        if need_block {
            self.active_block = self.pick_block(origin, config);
        }
        let block = self.active_block?;
        let point = self.pick_point_in_block(block, origin, config)?;
        self.current = Some(point);
        Some(point)
    }

    fn score(&self, origin: Vec2Fixed, target: Vec2Fixed, config: &SearchConfig) -> Fixed {
        let distance = origin.distance(target);
        let alignment = if self.momentum == Vec2Fixed::ZERO {
            Fixed::ZERO
        } else {
            self.momentum.dot(origin.direction_to(target))
        };
        distance * (Fixed::ONE - alignment * config.direction_bias)
    }

    fn pick_block(&self, origin: Vec2Fixed, config: &SearchConfig) -> Option<usize> {
        let mut best: Option<(Fixed, usize)> = None;
        for (idx, block) in self.blocks.iter().enumerate() {
            if block.points.is_empty() {
                continue;
            }
            let score = self.score(origin, block.centroid, config);
            if best.map_or(true, |(s, _)| score < s) {
                best = Some((score, idx));
            }
        }
        best.map(|(_, idx)| idx)
    }

    fn pick_point_in_block(
        &self,
        block: usize,
        origin: Vec2Fixed,
        config: &SearchConfig,
    ) -> Option<usize> {
        let mut best: Option<(Fixed, usize)> = None;
        for idx in &self.blocks.get(block)?.points {
            let point = &self.points[*idx];
            let mut score = self.score(origin, point.position, config);
            // Sweeping continues along the edge: the neighbor of the
            // spot just cleared wins outright
            if let Some(last) = self.last_visited {
                if point.left == Some(last) || point.right == Some(last) {
                    score = -score;
                }
            }
            if best.map_or(true, |(s, _)| score < s) {
                best = Some((score, *idx));
            }
        }
        best.map(|(_, idx)| idx)
    }

    /// Movement goal for the current point. Wrong-side edge points are
    /// approached around the cheaper flank of their cover edge.
    #[must_use]
    pub fn plan_move(
        &self,
        grid: &OcclusionGrid,
        seeker_pos: Vec2Fixed,
        config: &SearchConfig,
    ) -> Option<SearchMove> {
        let point = self.current_point()?;

        let wrong_side = point.normal != Vec2Fixed::ZERO
            && (seeker_pos - point.position).dot(point.normal) <= Fixed::ZERO;

        let target = if wrong_side {
            match (point.left_flank, point.right_flank) {
                (Some(l), Some(r)) => {
                    let left_cost = grid.find_path(seeker_pos, l).map(|p| path_length(&p));
                    let right_cost = grid.find_path(seeker_pos, r).map(|p| path_length(&p));
                    match (left_cost, right_cost) {
                        (Some(lc), Some(rc)) => {
                            if lc <= rc {
                                l
                            } else {
                                r
                            }
                        }
                        (Some(_), None) => l,
                        (None, Some(_)) => r,
                        (None, None) => point.approach.unwrap_or(point.position),
                    }
                }
                (Some(l), None) => l,
                (None, Some(r)) => r,
                (None, None) => point.approach.unwrap_or(point.position),
            }
        } else {
            point.position
        };

        let walk = seeker_pos.distance(point.position) <= config.walk_in_distance
            || grid.has_line_of_sight(seeker_pos, point.position, true);
        Some(SearchMove { target, walk })
    }

    /// Whether the seeker clears the current point from where it
    /// stands.
    #[must_use]
    pub fn verify(
        &self,
        grid: &OcclusionGrid,
        seeker_pos: Vec2Fixed,
        facing: Vec2Fixed,
        config: &SearchConfig,
    ) -> bool {
        self.current_point()
            .is_some_and(|p| point_verified(grid, p, seeker_pos, facing, config))
    }

    /// Complete the current point. Returns its position so the caller
    /// can notify the squad.
    pub fn mark_investigated(&mut self, now: u64, config: &SearchConfig) -> Option<Vec2Fixed> {
        let idx = self.current.take()?;
        let position = self.points[idx].position;

        for block in &mut self.blocks {
            block.points.retain(|p| *p != idx);
        }
        self.last_visited = Some(idx);
        if let Some(origin) = self.cursor {
            if origin != position {
                self.momentum = origin.direction_to(position);
            }
        }
        self.cursor = Some(position);
        self.record_investigated(position, now, config);
        Some(position)
    }

    /// Remember a cleared spot so regeneration skips it while the
    /// record lives.
    pub fn record_investigated(&mut self, position: Vec2Fixed, now: u64, config: &SearchConfig) {
        if let Some(existing) = self
            .investigated
            .iter_mut()
            .find(|r| r.position.distance(position) <= config.share_radius)
        {
            existing.tick = now;
            return;
        }
        self.investigated.push(InvestigatedPoint { position, tick: now });
    }

    /// A squadmate cleared a spot: drop any equivalent pending point.
    /// Applying the same report twice changes nothing.
    pub fn on_friend_investigated(&mut self, position: Vec2Fixed, now: u64, config: &SearchConfig) {
        for block in &mut self.blocks {
            let points = &self.points;
            block
                .points
                .retain(|idx| points[*idx].position.distance(position) > config.share_radius);
        }
        if let Some(idx) = self.current {
            if self.points[idx].position.distance(position) <= config.share_radius {
                self.current = None;
            }
        }
        self.record_investigated(position, now, config);
    }
}

/// Verification predicate for a single point: physically reached, or
/// seen clearly from the correct side within the verify field of view.
/// Edge points also need both lateral probes visible so nothing hides
/// just beside the edge.
#[must_use]
pub fn point_verified(
    grid: &OcclusionGrid,
    point: &SearchPoint,
    seeker_pos: Vec2Fixed,
    facing: Vec2Fixed,
    config: &SearchConfig,
) -> bool {
    let distance = seeker_pos.distance(point.position);
    if distance > point.visibility {
        return false;
    }
    if distance <= config.touch_distance {
        return true;
    }
    if point.requires_reach {
        return false;
    }

    if point.normal != Vec2Fixed::ZERO
        && (seeker_pos - point.position).dot(point.normal) <= Fixed::ZERO
    {
        return false;
    }
    let dir = seeker_pos.direction_to(point.position);
    if dir != Vec2Fixed::ZERO && facing.dot(dir) < fov_cos(config.verify_fov_deg) {
        return false;
    }
    if !grid.has_line_of_sight(seeker_pos, point.position, true) {
        return false;
    }
    if point.normal != Vec2Fixed::ZERO {
        let edge = point.normal.perp_left();
        let probes = [
            point.position + edge * config.lateral_spread,
            point.position - edge * config.lateral_spread,
        ];
        if probes
            .iter()
            .any(|probe| !grid.has_line_of_sight(seeker_pos, *probe, true))
        {
            return false;
        }
    }
    true
}

/// Minimum clear distance over a small ray fan, clamped to the
/// configured band. A radius that collapses to touch range marks the
/// point as reach-only.
fn compute_visibility(
    grid: &OcclusionGrid,
    position: Vec2Fixed,
    normal: Vec2Fixed,
    config: &SearchConfig,
) -> (Fixed, bool) {
    let dirs: Vec<Vec2Fixed> = if normal == Vec2Fixed::ZERO {
        let east = Vec2Fixed::new(Fixed::ONE, Fixed::ZERO);
        (0..8)
            .map(|i| east.rotated_deg(Fixed::from_num(i * 45)))
            .collect()
    } else {
        [-45, 0, 45]
            .iter()
            .map(|deg| normal.rotated_deg(Fixed::from_num(*deg)))
            .collect()
    };

    let mut raw = config.max_visibility;
    for dir in dirs {
        let free = grid.cast_free_distance(position, dir, config.max_visibility, true);
        raw = raw.min(free);
    }

    let requires_reach = raw <= config.touch_distance;
    (raw.clamp(config.touch_distance, config.max_visibility), requires_reach)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cover::CoverParams;
    use crate::nav::CellKind;
    use crate::zone::Rect;

    fn fixed(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: f64, y: f64) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn open_grid() -> OcclusionGrid {
        OcclusionGrid::new(64, 64, Fixed::ONE)
    }

    fn north_cover(covers: &mut CoverArena, position: Vec2Fixed, width: f64) -> u32 {
        covers.insert(
            CoverParams {
                position,
                forward: vec2(0.0, 1.0),
                width: fixed(width),
                height: fixed(2.0),
            },
            CoverConfig::default().tall_threshold,
        )
    }

    fn point_zone(zones: &mut ZoneSet, x: f64, y: f64) {
        zones.add_search(Rect::new(vec2(x, y), vec2(x, y)));
    }

    #[test]
    fn test_chain_points_are_linked_and_oriented() {
        let grid = open_grid();
        let cover_config = CoverConfig::default();
        let config = SearchConfig::default();
        let mut covers = CoverArena::new();
        let a = north_cover(&mut covers, vec2(10.0, 10.0), 5.0);
        let b = north_cover(&mut covers, vec2(15.0, 10.0), 5.0);
        covers.link(a, b);
        let zones = ZoneSet::default();

        let mut planner = SearchPlanner::new();
        planner.regenerate(&covers, &zones, &grid, &cover_config, &config, 0);

        // Two points per 5-wide cover at 2.5 spacing
        assert_eq!(planner.pending_count(), 4);

        let mut planner_probe = planner.clone();
        let first = planner_probe.select_next(vec2(5.0, 5.0), &config).unwrap();
        let point = planner_probe.current_point().unwrap();
        assert_eq!(point.normal, vec2(0.0, -1.0));
        assert!(point.approach.is_some());
        assert!(point.left_flank.is_some() && point.right_flank.is_some());
        // Leftmost point of the chain has no left neighbor
        assert_eq!(first, 0);
        assert!(point.left.is_none());
        assert_eq!(point.right, Some(1));
    }

    #[test]
    fn test_zone_sampling_skips_walls() {
        let mut grid = open_grid();
        grid.fill_rect(vec2(19.0, 9.0), vec2(21.0, 11.0), CellKind::Wall);
        let covers = CoverArena::new();
        let mut zones = ZoneSet::default();
        zones.add_search(Rect::new(vec2(10.0, 10.0), vec2(30.0, 10.0)));

        let mut planner = SearchPlanner::new();
        planner.regenerate(
            &covers,
            &zones,
            &grid,
            &CoverConfig::default(),
            &SearchConfig::default(),
            0,
        );

        // Samples at x = 10, 13, ..., 28: the one at 19 sits in the wall
        assert_eq!(planner.pending_count(), 6);
    }

    #[test]
    fn test_sweep_visits_every_point_once() {
        let grid = open_grid();
        let covers = CoverArena::new();
        let mut zones = ZoneSet::default();
        zones.add_search(Rect::new(vec2(10.0, 10.0), vec2(25.0, 25.0)));
        let config = SearchConfig::default();

        let mut planner = SearchPlanner::new();
        planner.regenerate(&covers, &zones, &grid, &CoverConfig::default(), &config, 0);
        let total = planner.pending_count();
        assert!(total > 0);

        let mut visited = Vec::new();
        let mut now = 0;
        while planner.select_next(vec2(10.0, 10.0), &config).is_some() {
            let position = planner.mark_investigated(now, &config).unwrap();
            assert!(!visited.contains(&position), "swept the same spot twice");
            visited.push(position);
            now += 1;
        }

        assert_eq!(visited.len(), total);
        assert!(planner.is_exhausted());
    }

    #[test]
    fn test_momentum_keeps_the_sweep_direction() {
        let grid = open_grid();
        let covers = CoverArena::new();
        let config = SearchConfig {
            block_radius: fixed(1.5),
            ..Default::default()
        };

        let mut zones = ZoneSet::default();
        point_zone(&mut zones, 24.0, 10.0);
        point_zone(&mut zones, 26.0, 10.0);
        point_zone(&mut zones, 20.0, 10.0);
        point_zone(&mut zones, 14.0, 10.0);
        point_zone(&mut zones, 34.0, 10.0);

        let mut planner = SearchPlanner::new();
        planner.regenerate(&covers, &zones, &grid, &CoverConfig::default(), &config, 0);

        let mut order = Vec::new();
        while planner.select_next(vec2(25.0, 10.0), &config).is_some() {
            order.push(planner.mark_investigated(0, &config).unwrap());
        }

        // After 24 -> 26 the momentum points east. The next pick is
        // the farther east point, not the nearer west one.
        assert_eq!(order[0], vec2(24.0, 10.0));
        assert_eq!(order[1], vec2(26.0, 10.0));
        assert_eq!(order[2], vec2(34.0, 10.0));
    }

    #[test]
    fn test_linked_neighbor_sweeps_the_edge_in_order() {
        let grid = open_grid();
        let cover_config = CoverConfig::default();
        let config = SearchConfig::default();
        let mut covers = CoverArena::new();
        north_cover(&mut covers, vec2(20.0, 20.0), 10.0);
        let zones = ZoneSet::default();

        let mut planner = SearchPlanner::new();
        planner.regenerate(&covers, &zones, &grid, &cover_config, &config, 0);
        assert_eq!(planner.pending_count(), 4);

        // Start near the right end; the sweep walks the edge without
        // ping-ponging
        let mut xs = Vec::new();
        while planner.select_next(vec2(25.0, 18.0), &config).is_some() {
            xs.push(planner.mark_investigated(0, &config).unwrap().x);
        }
        let mut sorted = xs.clone();
        sorted.sort_unstable();
        sorted.reverse();
        assert_eq!(xs, sorted, "edge sweep changed direction");
    }

    #[test]
    fn test_friend_share_is_idempotent() {
        let grid = open_grid();
        let covers = CoverArena::new();
        let config = SearchConfig::default();
        let mut zones = ZoneSet::default();
        zones.add_search(Rect::new(vec2(10.0, 10.0), vec2(22.0, 10.0)));

        let mut planner = SearchPlanner::new();
        planner.regenerate(&covers, &zones, &grid, &CoverConfig::default(), &config, 0);
        let before = planner.pending_count();

        planner.on_friend_investigated(vec2(13.0, 10.0), 5, &config);
        assert_eq!(planner.pending_count(), before - 1);

        planner.on_friend_investigated(vec2(13.0, 10.0), 6, &config);
        assert_eq!(planner.pending_count(), before - 1);
    }

    #[test]
    fn test_friend_share_clears_current_objective() {
        let grid = open_grid();
        let covers = CoverArena::new();
        let config = SearchConfig::default();
        let mut zones = ZoneSet::default();
        point_zone(&mut zones, 15.0, 15.0);

        let mut planner = SearchPlanner::new();
        planner.regenerate(&covers, &zones, &grid, &CoverConfig::default(), &config, 0);
        planner.select_next(vec2(10.0, 10.0), &config).unwrap();
        assert!(planner.current_point().is_some());

        planner.on_friend_investigated(vec2(15.5, 15.0), 5, &config);
        assert!(planner.current_point().is_none());
        assert!(planner.is_exhausted());
    }

    #[test]
    fn test_regeneration_skips_recent_spots() {
        let grid = open_grid();
        let covers = CoverArena::new();
        let config = SearchConfig::default();
        let mut zones = ZoneSet::default();
        point_zone(&mut zones, 15.0, 15.0);
        point_zone(&mut zones, 30.0, 30.0);

        let mut planner = SearchPlanner::new();
        planner.regenerate(&covers, &zones, &grid, &CoverConfig::default(), &config, 0);
        planner.select_next(vec2(14.0, 15.0), &config).unwrap();
        planner.mark_investigated(10, &config).unwrap();

        // Soon after: the cleared spot stays out
        planner.regenerate(&covers, &zones, &grid, &CoverConfig::default(), &config, 20);
        assert_eq!(planner.pending_count(), 1);

        // Long after: the record expired and the spot is back
        let expiry = secs_to_ticks(config.investigated_ttl) + 20;
        planner.regenerate(&covers, &zones, &grid, &CoverConfig::default(), &config, expiry);
        assert_eq!(planner.pending_count(), 2);
    }

    #[test]
    fn test_verify_needs_sight_or_touch() {
        let grid = open_grid();
        let config = SearchConfig::default();
        let point = SearchPoint {
            position: vec2(20.0, 20.0),
            approach: None,
            normal: Vec2Fixed::ZERO,
            visibility: fixed(10.0),
            left: None,
            right: None,
            left_flank: None,
            right_flank: None,
            requires_reach: false,
        };

        // Within radius, facing it: cleared
        assert!(point_verified(&grid, &point, vec2(20.0, 14.0), vec2(0.0, 1.0), &config));
        // Facing away: not cleared
        assert!(!point_verified(&grid, &point, vec2(20.0, 14.0), vec2(0.0, -1.0), &config));
        // Beyond the visibility radius
        assert!(!point_verified(&grid, &point, vec2(20.0, 5.0), vec2(0.0, 1.0), &config));
        // Touch range clears regardless of facing
        assert!(point_verified(&grid, &point, vec2(20.0, 19.2), vec2(0.0, -1.0), &config));
    }

    #[test]
    fn test_verify_respects_normal_side_and_probes() {
        let mut grid = open_grid();
        let config = SearchConfig {
            lateral_spread: fixed(3.0),
            ..Default::default()
        };
        let point = SearchPoint {
            position: vec2(20.0, 20.0),
            approach: None,
            normal: vec2(0.0, -1.0),
            visibility: fixed(10.0),
            left: None,
            right: None,
            left_flank: None,
            right_flank: None,
            requires_reach: false,
        };

        // Correct side (south), facing north
        assert!(point_verified(&grid, &point, vec2(20.0, 14.0), vec2(0.0, 1.0), &config));
        // Wrong side: the edge hides the spot
        assert!(!point_verified(&grid, &point, vec2(20.0, 26.0), vec2(0.0, -1.0), &config));

        // Cut sight to the west probe only; the spot itself stays
        // visible but its flank does not
        grid.fill_rect(vec2(18.2, 18.2), vec2(18.8, 18.8), CellKind::LowWall);
        assert!(grid.has_line_of_sight(vec2(20.0, 14.0), point.position, true));
        assert!(!point_verified(&grid, &point, vec2(20.0, 14.0), vec2(0.0, 1.0), &config));
    }

    #[test]
    fn test_boxed_in_points_require_reach() {
        let mut grid = open_grid();
        // Pocket behind walls: rays out of the point die immediately
        grid.fill_rect(vec2(18.0, 16.0), vec2(22.0, 18.0), CellKind::Wall);
        let cover_config = CoverConfig::default();
        let config = SearchConfig::default();
        let mut covers = CoverArena::new();
        north_cover(&mut covers, vec2(20.0, 20.0), 4.0);
        let zones = ZoneSet::default();

        let mut planner = SearchPlanner::new();
        planner.regenerate(&covers, &zones, &grid, &cover_config, &config, 0);

        planner.select_next(vec2(20.0, 10.0), &config).unwrap();
        let point = planner.current_point().unwrap();
        assert!(point.requires_reach);
        // Clear sight from the south is not enough for a boxed spot
        assert!(!planner.verify(&grid, vec2(20.0, 15.0), vec2(0.0, 1.0), &config));
    }
}
