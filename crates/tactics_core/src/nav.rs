//! Occlusion grid: walkability, line of sight, and A* paths.
//!
//! The grid doubles as the static-world collision model: full walls
//! block movement and sight, low walls block movement but only hide
//! crouching targets. Everything runs on fixed-point coordinates so
//! route costs and sightlines replay identically for a given seed.

use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Static contents of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellKind {
    /// Nothing here.
    #[default]
    Open,
    /// Full-height obstacle. Blocks movement and all sight.
    Wall,
    /// Waist-high obstacle. Blocks movement; hides crouching targets
    /// but standing targets are visible over it.
    LowWall,
}

impl CellKind {
    /// Returns true if agents can stand in this cell.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns true if a sightline through this cell is cut when the
    /// target has the given stance.
    #[must_use]
    pub const fn blocks_sight(self, target_crouched: bool) -> bool {
        match self {
            Self::Open => false,
            Self::Wall => true,
            Self::LowWall => target_crouched,
        }
    }
}

/// Grid of static occluders covering the playable area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcclusionGrid {
    /// Cell columns.
    width: u32,
    /// Cell rows.
    height: u32,
    /// Row-major cell contents.
    cells: Vec<CellKind>,
    /// Edge length of one cell in world units.
    #[serde(with = "fixed_serde")]
    cell_size: Fixed,
}

impl OcclusionGrid {
    /// Create a grid with all cells open.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero, or if `cell_size` is not
    /// positive.
    #[must_use]
    pub fn new(width: u32, height: u32, cell_size: Fixed) -> Self {
        assert!(width > 0, "OcclusionGrid width must be positive");
        assert!(height > 0, "OcclusionGrid height must be positive");
        assert!(
            cell_size > Fixed::ZERO,
            "OcclusionGrid cell_size must be positive"
        );

        let cell_count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            cells: vec![CellKind::Open; cell_count],
            cell_size,
        }
    }

    /// Cell columns.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Cell rows.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Edge length of one cell in world units.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    #[inline]
    fn coords_to_index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Whether the coordinates fall inside the grid.
    #[must_use]
    pub fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Get cell contents at coordinates. Returns `None` out of bounds.
    #[must_use]
    pub fn get_cell(&self, x: u32, y: u32) -> Option<CellKind> {
        if self.in_bounds(x, y) {
            Some(self.cells[self.coords_to_index(x, y)])
        } else {
            None
        }
    }

    /// Set cell contents at coordinates. Returns `false` out of bounds.
    pub fn set_cell(&mut self, x: u32, y: u32, kind: CellKind) -> bool {
        if self.in_bounds(x, y) {
            let index = self.coords_to_index(x, y);
            self.cells[index] = kind;
            true
        } else {
            false
        }
    }

    /// Whether an agent can stand at these coordinates.
    #[must_use]
    pub fn is_walkable(&self, x: u32, y: u32) -> bool {
        self.get_cell(x, y).is_some_and(|c| c.is_walkable())
    }

    /// Stamp every cell overlapping the rectangle [min, max].
    pub fn fill_rect(&mut self, min: Vec2Fixed, max: Vec2Fixed, kind: CellKind) {
        let x0 = (min.x / self.cell_size).floor().to_num::<i64>().max(0);
        let y0 = (min.y / self.cell_size).floor().to_num::<i64>().max(0);
        let x1 = (max.x / self.cell_size)
            .floor()
            .to_num::<i64>()
            .min(self.width as i64 - 1);
        let y1 = (max.y / self.cell_size)
            .floor()
            .to_num::<i64>()
            .min(self.height as i64 - 1);

        for y in y0..=y1 {
            for x in x0..=x1 {
                self.set_cell(x as u32, y as u32, kind);
            }
        }
    }

    /// Grid coordinates of a world position, `None` outside the grid.
    #[must_use]
    pub fn world_to_grid(&self, pos: Vec2Fixed) -> Option<(u32, u32)> {
        if pos.x < Fixed::ZERO || pos.y < Fixed::ZERO {
            return None;
        }

        let x = (pos.x / self.cell_size).to_num::<i64>();
        let y = (pos.y / self.cell_size).to_num::<i64>();

        if x >= 0 && x < self.width as i64 && y >= 0 && y < self.height as i64 {
            Some((x as u32, y as u32))
        } else {
            None
        }
    }

    /// World position of a cell's center.
    #[must_use]
    pub fn grid_to_world(&self, x: u32, y: u32) -> Vec2Fixed {
        let half = self.cell_size / Fixed::from_num(2);
        Vec2Fixed::new(
            Fixed::from_num(x) * self.cell_size + half,
            Fixed::from_num(y) * self.cell_size + half,
        )
    }

    /// Check whether a sightline from `from` to `to` is clear against
    /// a target with the given stance.
    #[must_use]
    pub fn has_line_of_sight(&self, from: Vec2Fixed, to: Vec2Fixed, target_crouched: bool) -> bool {
        self.trace(from, to, |kind| kind.blocks_sight(target_crouched))
    }

    /// Check whether an agent could walk in a straight line between
    /// two points without clipping an obstacle.
    #[must_use]
    pub fn has_clear_walk(&self, from: Vec2Fixed, to: Vec2Fixed) -> bool {
        self.trace(from, to, |kind| !kind.is_walkable())
    }

    /// Bresenham trace between two world positions; `blocked` decides
    /// which cell kinds cut the line. Diagonal steps also test the two
    /// adjacent cardinal cells so the line cannot slip between corners.
    fn trace(&self, from: Vec2Fixed, to: Vec2Fixed, blocked: impl Fn(CellKind) -> bool) -> bool {
        let Some((x0, y0)) = self.world_to_grid(from) else {
            return false;
        };
        let Some((x1, y1)) = self.world_to_grid(to) else {
            return false;
        };

        let is_cut = |x: u32, y: u32| self.get_cell(x, y).is_some_and(&blocked);

        let dx = (x1 as i32 - x0 as i32).abs();
        let dy = (y1 as i32 - y0 as i32).abs();
        let sx = if x0 < x1 { 1i32 } else { -1i32 };
        let sy = if y0 < y1 { 1i32 } else { -1i32 };
        let mut err = dx - dy;

        let mut x = x0 as i32;
        let mut y = y0 as i32;

        loop {
            // Endpoint cells hold the actors themselves; only cells in
            // between can cut the line.
            let at_start = x == x0 as i32 && y == y0 as i32;
            let at_end = x == x1 as i32 && y == y1 as i32;
            if !at_start && !at_end && is_cut(x as u32, y as u32) {
                return false;
            }

            if at_end {
                break;
            }

            let e2 = 2 * err;

            if e2 > -dy && e2 < dx {
                // Diagonal step: both shoulder cells must be clear
                let next_x = x + sx;
                let next_y = y + sy;
                if is_cut(next_x as u32, y as u32) || is_cut(x as u32, next_y as u32) {
                    return false;
                }
            }

            if e2 > -dy {
                err -= dy;
                x += sx;
            }
            if e2 < dx {
                err += dx;
                y += sy;
            }
        }

        true
    }

    /// March from `from` along `dir` (unit vector) and return how far
    /// the view stays clear, capped at `max_dist`. `block_low` makes
    /// waist-high walls count as occluders.
    #[must_use]
    pub fn cast_free_distance(
        &self,
        from: Vec2Fixed,
        dir: Vec2Fixed,
        max_dist: Fixed,
        block_low: bool,
    ) -> Fixed {
        let step = self.cell_size / Fixed::from_num(2);
        if step <= Fixed::ZERO || max_dist <= Fixed::ZERO {
            return Fixed::ZERO;
        }

        let mut travelled = Fixed::ZERO;
        loop {
            let next = travelled + step;
            if next > max_dist {
                return max_dist;
            }
            let sample = from + dir * next;
            let Some((gx, gy)) = self.world_to_grid(sample) else {
                return travelled;
            };
            let Some(kind) = self.get_cell(gx, gy) else {
                return travelled;
            };
            let blocked = match kind {
                CellKind::Open => false,
                CellKind::Wall => true,
                CellKind::LowWall => block_low,
            };
            if blocked {
                return travelled;
            }
            travelled = next;
        }
    }

    /// The cell itself if walkable, otherwise the first walkable
    /// neighbor in fixed direction order. Positions squeezed against
    /// geometry (cover slots, margins) resolve to the adjacent cell
    /// instead of failing.
    fn nearest_open(&self, x: u32, y: u32) -> Option<(u32, u32)> {
        if self.is_walkable(x, y) {
            return Some((x, y));
        }
        for &(dx, dy) in &DIRECTIONS {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            if nx < 0 || ny < 0 {
                continue;
            }
            if self.is_walkable(nx as u32, ny as u32) {
                return Some((nx as u32, ny as u32));
            }
        }
        None
    }

    /// Find a path between two world positions.
    ///
    /// Returns `None` when no path exists; callers treat that as a
    /// candidate rejection, never a fault. Start and goal are nudged to
    /// the nearest open cell when they fall inside geometry.
    #[must_use]
    pub fn find_path(&self, start: Vec2Fixed, goal: Vec2Fixed) -> Option<Vec<Vec2Fixed>> {
        let (sx, sy) = self.world_to_grid(start)?;
        let (gx, gy) = self.world_to_grid(goal)?;

        let (sx, sy) = self.nearest_open(sx, sy)?;
        let (gx, gy) = self.nearest_open(gx, gy)?;

        if sx == gx && sy == gy {
            return Some(vec![self.grid_to_world(sx, sy)]);
        }

        self.find_path_grid(sx, sy, gx, gy)
    }

    /// A* over cell coordinates, eight-way with blocked corner cuts.
    fn find_path_grid(
        &self,
        start_x: u32,
        start_y: u32,
        goal_x: u32,
        goal_y: u32,
    ) -> Option<Vec<Vec2Fixed>> {
        let mut open_set: BinaryHeap<AStarNode> = BinaryHeap::new();
        let mut came_from: HashMap<(u32, u32), (u32, u32)> = HashMap::new();
        let mut g_score: HashMap<(u32, u32), Fixed> = HashMap::new();

        let start_h = chebyshev_heuristic(start_x, start_y, goal_x, goal_y);
        g_score.insert((start_x, start_y), Fixed::ZERO);
        open_set.push(AStarNode {
            x: start_x,
            y: start_y,
            f_score: start_h,
            tie_breaker: coords_to_tie_breaker(start_x, start_y),
        });

        while let Some(current) = open_set.pop() {
            if current.x == goal_x && current.y == goal_y {
                return Some(self.reconstruct_path(&came_from, goal_x, goal_y));
            }

            let current_g = g_score
                .get(&(current.x, current.y))
                .copied()
                .unwrap_or(Fixed::MAX);

            for &(dx, dy) in &DIRECTIONS {
                let nx = current.x as i32 + dx;
                let ny = current.y as i32 + dy;

                if nx < 0 || ny < 0 {
                    continue;
                }

                let nx = nx as u32;
                let ny = ny as u32;

                if !self.is_walkable(nx, ny) {
                    continue;
                }

                // No corner cutting on diagonal moves
                if dx != 0 && dy != 0
                    && (!self.is_walkable(nx, current.y) || !self.is_walkable(current.x, ny))
                {
                    continue;
                }

                let tentative_g = current_g + Fixed::ONE;
                let neighbor_g = g_score.get(&(nx, ny)).copied().unwrap_or(Fixed::MAX);

                if tentative_g < neighbor_g {
                    came_from.insert((nx, ny), (current.x, current.y));
                    g_score.insert((nx, ny), tentative_g);

                    let h = chebyshev_heuristic(nx, ny, goal_x, goal_y);
                    open_set.push(AStarNode {
                        x: nx,
                        y: ny,
                        f_score: tentative_g + h,
                        tie_breaker: coords_to_tie_breaker(nx, ny),
                    });
                }
            }
        }

        None
    }

    fn reconstruct_path(
        &self,
        came_from: &HashMap<(u32, u32), (u32, u32)>,
        goal_x: u32,
        goal_y: u32,
    ) -> Vec<Vec2Fixed> {
        let mut path = Vec::new();
        let mut current = (goal_x, goal_y);

        path.push(self.grid_to_world(current.0, current.1));

        while let Some(&prev) = came_from.get(&current) {
            path.push(self.grid_to_world(prev.0, prev.1));
            current = prev;
        }

        path.reverse();
        path
    }

    /// Drop waypoints an agent can skip by walking straight.
    ///
    /// Each surviving waypoint is the farthest one reachable from its
    /// predecessor along a clear-walk segment, so the shortened route
    /// never clips geometry the full route avoided.
    #[must_use]
    pub fn smooth_path(&self, path: Vec<Vec2Fixed>) -> Vec<Vec2Fixed> {
        if path.len() <= 2 {
            return path;
        }

        let mut smoothed = Vec::with_capacity(path.len());
        smoothed.push(path[0]);

        let mut current_idx = 0;

        while current_idx < path.len() - 1 {
            let mut furthest_visible = current_idx + 1;

            for check_idx in (current_idx + 2)..path.len() {
                if self.has_clear_walk(path[current_idx], path[check_idx]) {
                    furthest_visible = check_idx;
                }
            }

            smoothed.push(path[furthest_visible]);
            current_idx = furthest_visible;
        }

        smoothed
    }
}

impl Default for OcclusionGrid {
    /// A 64x64 arena with 1-unit cells.
    fn default() -> Self {
        Self::new(64, 64, Fixed::ONE)
    }
}

/// Total length of a polyline path.
#[must_use]
pub fn path_length(path: &[Vec2Fixed]) -> Fixed {
    let mut total = Fixed::ZERO;
    for pair in path.windows(2) {
        total += pair[0].distance(pair[1]);
    }
    total
}

/// Open-set entry for the A* frontier.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    /// Cell coordinates.
    x: u32,
    y: u32,
    /// f_score = g_score + heuristic.
    f_score: Fixed,
    /// Packed coordinates breaking f_score ties, lowest first, so
    /// equal-cost frontiers pop in a fixed order.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap pops the maximum and we want the
        // cheapest node out first.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Neighbor offsets, eight-way. The order is fixed; expansion order
/// feeds the deterministic tie-breaking.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),   // East
    (1, 1),   // Southeast
    (0, 1),   // South
    (-1, 1),  // Southwest
    (-1, 0),  // West
    (-1, -1), // Northwest
    (0, -1),  // North
    (1, -1),  // Northeast
];

/// Chebyshev distance, admissible under eight-way movement.
#[inline]
fn chebyshev_heuristic(x1: u32, y1: u32, x2: u32, y2: u32) -> Fixed {
    let dx = x1.abs_diff(x2);
    let dy = y1.abs_diff(y2);
    Fixed::from_num(dx.max(dy))
}

/// Pack coordinates into one orderable word for tie-breaking.
#[inline]
fn coords_to_tie_breaker(x: u32, y: u32) -> u64 {
    ((y as u64) << 32) | (x as u64)
}
