//! Designer-placed ground rectangles.
//!
//! Search zones seed the search planner with open ground to sweep.
//! Vision zones attenuate sight range for targets standing inside
//! them (grass, shadow).

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Axis-aligned ground rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Lower corner.
    pub min: Vec2Fixed,
    /// Upper corner.
    pub max: Vec2Fixed,
}

impl Rect {
    /// Build from any two opposite corners.
    #[must_use]
    pub fn new(a: Vec2Fixed, b: Vec2Fixed) -> Self {
        Self {
            min: Vec2Fixed::new(a.x.min(b.x), a.y.min(b.y)),
            max: Vec2Fixed::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Inclusive containment test.
    #[must_use]
    pub fn contains(&self, point: Vec2Fixed) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }
}

/// Open ground the search planner samples for sweep points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchZone {
    /// Area to sample.
    pub rect: Rect,
}

/// Sight attenuation area. Applies when the *target* stands inside.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisionZone {
    /// Affected area.
    pub rect: Rect,
    /// Sight range multiplier, below one for concealment.
    #[serde(with = "fixed_serde")]
    pub sight_multiplier: Fixed,
}

/// All zones placed by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneSet {
    search: Vec<SearchZone>,
    vision: Vec<VisionZone>,
}

impl ZoneSet {
    /// Register a search zone.
    pub fn add_search(&mut self, rect: Rect) {
        self.search.push(SearchZone { rect });
    }

    /// Register a vision zone.
    pub fn add_vision(&mut self, rect: Rect, sight_multiplier: Fixed) {
        self.vision.push(VisionZone {
            rect,
            sight_multiplier: sight_multiplier.clamp(Fixed::ZERO, Fixed::ONE),
        });
    }

    /// Search zones in registration order.
    #[must_use]
    pub fn search_zones(&self) -> &[SearchZone] {
        &self.search
    }

    /// Combined sight multiplier for a target at `point`. Overlapping
    /// zones take the strongest attenuation.
    #[must_use]
    pub fn sight_multiplier_at(&self, point: Vec2Fixed) -> Fixed {
        let mut multiplier = Fixed::ONE;
        for zone in &self.vision {
            if zone.rect.contains(point) {
                multiplier = multiplier.min(zone.sight_multiplier);
            }
        }
        multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec2(x: f64, y: f64) -> Vec2Fixed {
        Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    #[test]
    fn test_rect_normalizes_corners() {
        let rect = Rect::new(vec2(5.0, 5.0), vec2(-1.0, 2.0));
        assert!(rect.contains(vec2(0.0, 3.0)));
        assert!(rect.contains(vec2(5.0, 5.0)));
        assert!(!rect.contains(vec2(6.0, 3.0)));
    }

    #[test]
    fn test_overlapping_vision_zones_take_strongest() {
        let mut zones = ZoneSet::default();
        zones.add_vision(Rect::new(vec2(0.0, 0.0), vec2(10.0, 10.0)), Fixed::from_num(0.6));
        zones.add_vision(Rect::new(vec2(5.0, 5.0), vec2(15.0, 15.0)), Fixed::from_num(0.3));

        assert_eq!(zones.sight_multiplier_at(vec2(2.0, 2.0)), Fixed::from_num(0.6));
        assert_eq!(zones.sight_multiplier_at(vec2(7.0, 7.0)), Fixed::from_num(0.3));
        assert_eq!(zones.sight_multiplier_at(vec2(20.0, 20.0)), Fixed::ONE);
    }
}
