//! Cover geometry and occupancy.
//!
//! Covers are static world props placed by the host. Each one is a
//! protected line segment: a center, a forward unit vector pointing at
//! the threat side, a width, and a height that classifies it as tall
//! (corner peeking) or low (crouch concealment). Adjacency is stored
//! as plain `Option<CoverId>` indices so chains serialize cleanly.
//! Occupancy is transient and rebuilt as agents claim and release
//! slots.

use serde::{Deserialize, Serialize};

use crate::actor::ActorId;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Index of a cover inside the arena.
pub type CoverId = u32;

/// Upper bound on chain walks. Guards against accidental link cycles.
const MAX_CHAIN_LEN: usize = 64;

/// Construction parameters for one cover piece.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoverParams {
    /// Center of the protected segment.
    pub position: Vec2Fixed,
    /// Direction the cover protects against. Normalized on insert.
    pub forward: Vec2Fixed,
    /// Lateral extent of the segment.
    #[serde(with = "fixed_serde")]
    pub width: Fixed,
    /// Physical height, compared to the crouch threshold.
    #[serde(with = "fixed_serde")]
    pub height: Fixed,
}

/// One static cover piece.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cover {
    /// Arena index.
    pub id: CoverId,
    /// Center of the protected segment.
    pub position: Vec2Fixed,
    forward: Vec2Fixed,
    #[serde(with = "fixed_serde")]
    width: Fixed,
    #[serde(with = "fixed_serde")]
    height: Fixed,
    tall: bool,
    /// Neighbor continuing the chain to the left, if linked.
    pub left_link: Option<CoverId>,
    /// Neighbor continuing the chain to the right, if linked.
    pub right_link: Option<CoverId>,
    users: Vec<(ActorId, Vec2Fixed)>,
}

impl Cover {
    /// Direction the cover protects against, unit length.
    #[must_use]
    pub const fn forward(&self) -> Vec2Fixed {
        self.forward
    }

    /// Unit vector along the segment to the left (viewed facing
    /// forward from behind the cover).
    #[must_use]
    pub fn left(&self) -> Vec2Fixed {
        self.forward.perp_left()
    }

    /// Unit vector along the segment to the right.
    #[must_use]
    pub fn right(&self) -> Vec2Fixed {
        -self.forward.perp_left()
    }

    /// Lateral extent.
    #[must_use]
    pub const fn width(&self) -> Fixed {
        self.width
    }

    /// Physical height.
    #[must_use]
    pub const fn height(&self) -> Fixed {
        self.height
    }

    /// Tall cover is peeked around; low cover is crouched behind.
    #[must_use]
    pub const fn is_tall(&self) -> bool {
        self.tall
    }

    /// World position of the left end, pushed `offset` past the edge.
    #[must_use]
    pub fn left_corner(&self, offset: Fixed) -> Vec2Fixed {
        self.position + self.left() * (self.width / 2 + offset)
    }

    /// World position of the right end, pushed `offset` past the edge.
    #[must_use]
    pub fn right_corner(&self, offset: Fixed) -> Vec2Fixed {
        self.position + self.right() * (self.width / 2 + offset)
    }

    /// Closest hiding slot to `point`: the projection onto the
    /// protected segment, clamped to its ends and pushed `margin`
    /// behind the line.
    #[must_use]
    pub fn closest_point_to(&self, point: Vec2Fixed, margin: Fixed) -> Vec2Fixed {
        let half = self.width / 2;
        let along = (point - self.position).dot(self.left());
        let clamped = along.clamp(-half, half);
        self.position + self.left() * clamped - self.forward * margin
    }

    /// Whether `dir` (unit, from the cover outward) falls within the
    /// protected arc given by a precomputed cosine threshold.
    #[must_use]
    pub fn is_front(&self, dir: Vec2Fixed, min_cos: Fixed) -> bool {
        self.forward.dot(dir) >= min_cos
    }

    /// Whether `point` lies in the strip ahead of the segment,
    /// extended sideways by `slack`. Used to keep corner peeks from
    /// wrapping past the end of the cover.
    #[must_use]
    pub fn is_front_field(&self, point: Vec2Fixed, slack: Fixed) -> bool {
        let rel = point - self.position;
        if rel.dot(self.forward) <= Fixed::ZERO {
            return false;
        }
        let lateral = rel.dot(self.left());
        let reach = self.width / 2 + slack;
        lateral >= -reach && lateral <= reach
    }

    /// Whether `dir` points to the left half-plane of the cover.
    #[must_use]
    pub fn is_left(&self, dir: Vec2Fixed) -> bool {
        self.left().dot(dir) > Fixed::ZERO
    }

    /// Whether `dir` points to the right half-plane of the cover.
    #[must_use]
    pub fn is_right(&self, dir: Vec2Fixed) -> bool {
        self.right().dot(dir) > Fixed::ZERO
    }

    /// Register (or move) an occupant slot on this cover.
    pub fn register_user(&mut self, actor: ActorId, position: Vec2Fixed) {
        if let Some(entry) = self.users.iter_mut().find(|(id, _)| *id == actor) {
            entry.1 = position;
        } else {
            self.users.push((actor, position));
        }
    }

    /// Remove an occupant slot.
    pub fn unregister_user(&mut self, actor: ActorId) {
        self.users.retain(|(id, _)| *id != actor);
    }

    /// Registered occupants in registration order.
    #[must_use]
    pub fn users(&self) -> &[(ActorId, Vec2Fixed)] {
        &self.users
    }

    /// Whether an occupant other than `requester` sits within
    /// `spacing` of `pos` on this cover alone. Chain-aware checks go
    /// through [`CoverArena::is_position_taken`].
    #[must_use]
    pub fn has_user_near(&self, pos: Vec2Fixed, requester: ActorId, spacing: Fixed) -> bool {
        let spacing_sq = spacing * spacing;
        self.users
            .iter()
            .any(|(id, p)| *id != requester && p.distance_squared(pos) <= spacing_sq)
    }
}

/// Storage for all cover pieces. Covers are never removed, so ids are
/// plain vector indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverArena {
    covers: Vec<Cover>,
}

impl CoverArena {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cover, classifying it against `tall_threshold`.
    /// A degenerate forward vector defaults to north.
    pub fn insert(&mut self, params: CoverParams, tall_threshold: Fixed) -> CoverId {
        let id = self.covers.len() as CoverId;
        let forward = if params.forward.length_squared() == Fixed::ZERO {
            Vec2Fixed::new(Fixed::ZERO, Fixed::ONE)
        } else {
            params.forward.normalize()
        };
        self.covers.push(Cover {
            id,
            position: params.position,
            forward,
            width: params.width.max(Fixed::ZERO),
            height: params.height.max(Fixed::ZERO),
            tall: params.height >= tall_threshold,
            left_link: None,
            right_link: None,
            users: Vec::new(),
        });
        id
    }

    /// Link two covers into a chain: `left` continues into `right`.
    /// Both directions are recorded so walks work from either end.
    pub fn link(&mut self, left: CoverId, right: CoverId) {
        if left == right {
            return;
        }
        if let Some(cover) = self.get_mut(left) {
            cover.right_link = Some(right);
        }
        if let Some(cover) = self.get_mut(right) {
            cover.left_link = Some(left);
        }
    }

    /// Look up a cover.
    #[must_use]
    pub fn get(&self, id: CoverId) -> Option<&Cover> {
        self.covers.get(id as usize)
    }

    /// Look up a cover mutably.
    pub fn get_mut(&mut self, id: CoverId) -> Option<&mut Cover> {
        self.covers.get_mut(id as usize)
    }

    /// Number of covers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.covers.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.covers.is_empty()
    }

    /// All covers in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Cover> {
        self.covers.iter()
    }

    /// Whether `pos` on `cover` is contested by an occupant of the
    /// cover itself or either linked neighbor.
    #[must_use]
    pub fn is_position_taken(
        &self,
        cover: CoverId,
        pos: Vec2Fixed,
        requester: ActorId,
        spacing: Fixed,
    ) -> bool {
        let Some(piece) = self.get(cover) else {
            return false;
        };
        if piece.has_user_near(pos, requester, spacing) {
            return true;
        }
        for neighbor in [piece.left_link, piece.right_link].into_iter().flatten() {
            if self
                .get(neighbor)
                .is_some_and(|n| n.has_user_near(pos, requester, spacing))
            {
                return true;
            }
        }
        false
    }

    /// Leftmost cover of the chain containing `id`, cycle-guarded.
    #[must_use]
    pub fn chain_start(&self, id: CoverId) -> CoverId {
        let mut current = id;
        for _ in 0..MAX_CHAIN_LEN {
            match self.get(current).and_then(|c| c.left_link) {
                Some(prev) if prev != id => current = prev,
                _ => break,
            }
        }
        current
    }

    /// The whole chain containing `id`, left to right, cycle-guarded.
    #[must_use]
    pub fn chain_of(&self, id: CoverId) -> Vec<CoverId> {
        let mut chain = Vec::new();
        let mut current = Some(self.chain_start(id));
        while let Some(c) = current {
            if chain.contains(&c) || chain.len() >= MAX_CHAIN_LEN {
                break;
            }
            chain.push(c);
            current = self.get(c).and_then(|cover| cover.right_link);
        }
        chain
    }

    /// Remove `actor` from every cover's occupant list.
    pub fn release_everywhere(&mut self, actor: ActorId) {
        for cover in &mut self.covers {
            cover.unregister_user(actor);
        }
    }
}
