//! Encounter scenario definitions for headless runs.
//!
//! Scenarios are loaded from RON files and describe the arena layout,
//! the actors on it and any scripted noise injections. Authoring uses
//! plain numbers; conversion to fixed-point happens once in
//! [`Scenario::build`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tactics_core::actor::{ActorSpawnParams, Side, Waypoint};
use tactics_core::config::AiConfig;
use tactics_core::cover::{CoverId, CoverParams};
use tactics_core::error::TacticsError;
use tactics_core::math::{Fixed, Vec2Fixed};
use tactics_core::nav::CellKind;
use tactics_core::world::{World, WorldConfig};

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// A cover link references a cover that does not exist.
    #[error("Cover link references index {index} but only {count} covers are defined")]
    InvalidLink {
        /// Offending index in the `cover_links` list.
        index: usize,
        /// Number of covers the scenario defines.
        count: usize,
    },
    /// The simulation rejected the scenario contents.
    #[error(transparent)]
    World(#[from] TacticsError),
}

pub(crate) fn vec2(p: (f64, f64)) -> Vec2Fixed {
    Vec2Fixed::new(Fixed::from_num(p.0), Fixed::from_num(p.1))
}

/// A full-height or waist-high obstacle rectangle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallPlacement {
    /// Lower-left corner in world units.
    pub min: (f64, f64),
    /// Upper-right corner in world units.
    pub max: (f64, f64),
    /// Waist-high instead of full-height.
    #[serde(default)]
    pub low: bool,
}

/// A cover piece agents can claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverPlacement {
    /// Center of the protected segment.
    pub position: (f64, f64),
    /// Direction the cover protects against.
    pub forward: (f64, f64),
    /// Lateral extent.
    pub width: f64,
    /// Physical height.
    pub height: f64,
}

/// An axis-aligned rectangle in world units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRect {
    /// Lower-left corner.
    pub min: (f64, f64),
    /// Upper-right corner.
    pub max: (f64, f64),
}

/// A sight attenuation area (smoke, foliage, darkness).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionZonePlacement {
    /// Lower-left corner.
    pub min: (f64, f64),
    /// Upper-right corner.
    pub max: (f64, f64),
    /// Sight distance multiplier inside the area.
    pub sight_multiplier: f64,
}

/// A stop on a patrol route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatrolStop {
    /// Position to walk to.
    pub position: (f64, f64),
    /// Seconds to hold at the waypoint.
    #[serde(default)]
    pub pause: Option<f64>,
}

/// One actor to spawn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorPlacement {
    /// Team identifier.
    pub side: Side,
    /// Spawn position.
    pub position: (f64, f64),
    /// Spawn without a brain (scripted target or civilian).
    #[serde(default)]
    pub dummy: bool,
    /// Initial facing. Defaults to the archetype's facing.
    #[serde(default)]
    pub facing: Option<(f64, f64)>,
    /// Health override.
    #[serde(default)]
    pub health: Option<u32>,
    /// Hearing multiplier override.
    #[serde(default)]
    pub hearing: Option<f64>,
    /// Aggression eligibility override.
    #[serde(default)]
    pub aggressive: Option<bool>,
    /// Grenade count override.
    #[serde(default)]
    pub grenades: Option<u32>,
    /// Patrol route, looped while idle.
    #[serde(default)]
    pub patrol: Vec<PatrolStop>,
}

/// A scripted noise injected at a fixed tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedAlert {
    /// Tick to post the alert on.
    pub tick: u64,
    /// Noise origin.
    pub position: (f64, f64),
    /// Base audible radius.
    pub radius: f64,
    /// Hostile noise (gunshot, breach) rather than ambient.
    #[serde(default)]
    pub hostile: bool,
    /// Carries an exact position rather than a rough one.
    #[serde(default)]
    pub direct: bool,
}

/// A complete encounter description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Scenario name for logs and reports.
    pub name: String,
    /// Simulation seed.
    pub seed: u64,
    /// Grid width in cells.
    pub grid_width: u32,
    /// Grid height in cells.
    pub grid_height: u32,
    /// Cell edge length in world units.
    pub cell_size: f64,
    /// Obstacle rectangles.
    pub walls: Vec<WallPlacement>,
    /// Cover pieces, indexed by list position for links.
    pub covers: Vec<CoverPlacement>,
    /// Pairs of cover indices forming traversal chains.
    pub cover_links: Vec<(usize, usize)>,
    /// Sweep areas for searches.
    pub search_zones: Vec<ZoneRect>,
    /// Sight attenuation areas.
    pub vision_zones: Vec<VisionZonePlacement>,
    /// Actors to spawn, in order.
    pub actors: Vec<ActorPlacement>,
    /// Scripted noises, applied by the runner at their ticks.
    pub alerts: Vec<ScriptedAlert>,
    /// Behavior tuning. Omitted sections keep factory values.
    pub config: AiConfig,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "empty".to_string(),
            seed: 1,
            grid_width: 64,
            grid_height: 64,
            cell_size: 1.0,
            walls: Vec::new(),
            covers: Vec::new(),
            cover_links: Vec::new(),
            search_zones: Vec::new(),
            vision_zones: Vec::new(),
            actors: Vec::new(),
            alerts: Vec::new(),
            config: AiConfig::default(),
        }
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }

    /// Parse a scenario from a RON string.
    pub fn from_ron_str(content: &str) -> Result<Self, ScenarioError> {
        Ok(ron::from_str(content)?)
    }

    /// Resolve a scenario argument: a built-in name or a file path.
    pub fn resolve(name: &str) -> Result<Self, ScenarioError> {
        match name {
            "skirmish_2v2" => Ok(Self::skirmish_2v2()),
            "patrol_intrusion" => Ok(Self::patrol_intrusion()),
            path => Self::load(path),
        }
    }

    /// Built-in 2v2 firefight across two facing cover lines.
    pub fn skirmish_2v2() -> Self {
        Self {
            name: "skirmish_2v2".to_string(),
            seed: 7,
            covers: vec![
                CoverPlacement {
                    position: (24.0, 28.0),
                    forward: (0.0, 1.0),
                    width: 6.0,
                    height: 1.0,
                },
                CoverPlacement {
                    position: (28.0, 40.0),
                    forward: (0.0, -1.0),
                    width: 6.0,
                    height: 1.0,
                },
            ],
            actors: vec![
                ActorPlacement {
                    side: 0,
                    position: (22.0, 22.0),
                    ..ActorPlacement::default()
                },
                ActorPlacement {
                    side: 0,
                    position: (28.0, 22.0),
                    ..ActorPlacement::default()
                },
                ActorPlacement {
                    side: 1,
                    position: (24.0, 46.0),
                    facing: Some((0.0, -1.0)),
                    ..ActorPlacement::default()
                },
                ActorPlacement {
                    side: 1,
                    position: (30.0, 46.0),
                    facing: Some((0.0, -1.0)),
                    ..ActorPlacement::default()
                },
            ],
            ..Self::default()
        }
    }

    /// Built-in guard-post sweep: two patrollers, a hidden intruder
    /// and a scripted disturbance that pulls them into a search.
    pub fn patrol_intrusion() -> Self {
        Self {
            name: "patrol_intrusion".to_string(),
            seed: 11,
            grid_width: 48,
            grid_height: 48,
            walls: vec![WallPlacement {
                min: (20.0, 24.0),
                max: (28.0, 26.0),
                low: true,
            }],
            covers: vec![CoverPlacement {
                position: (24.0, 25.0),
                forward: (0.0, 1.0),
                width: 6.0,
                height: 1.0,
            }],
            search_zones: vec![ZoneRect {
                min: (28.0, 28.0),
                max: (44.0, 44.0),
            }],
            // Undergrowth over the hideout; the intruder stays unseen
            // until a searcher gets close.
            vision_zones: vec![VisionZonePlacement {
                min: (34.0, 34.0),
                max: (44.0, 44.0),
                sight_multiplier: 0.2,
            }],
            actors: vec![
                ActorPlacement {
                    side: 0,
                    position: (10.0, 10.0),
                    patrol: vec![
                        PatrolStop {
                            position: (10.0, 10.0),
                            pause: Some(2.0),
                        },
                        PatrolStop {
                            position: (30.0, 10.0),
                            pause: None,
                        },
                        PatrolStop {
                            position: (30.0, 18.0),
                            pause: Some(1.0),
                        },
                        PatrolStop {
                            position: (10.0, 18.0),
                            pause: None,
                        },
                    ],
                    ..ActorPlacement::default()
                },
                ActorPlacement {
                    side: 0,
                    position: (14.0, 20.0),
                    patrol: vec![
                        PatrolStop {
                            position: (14.0, 20.0),
                            pause: Some(1.5),
                        },
                        PatrolStop {
                            position: (14.0, 36.0),
                            pause: Some(1.5),
                        },
                    ],
                    ..ActorPlacement::default()
                },
                ActorPlacement {
                    side: 1,
                    position: (40.0, 40.0),
                    dummy: true,
                    ..ActorPlacement::default()
                },
            ],
            alerts: vec![ScriptedAlert {
                tick: 40,
                position: (36.0, 36.0),
                radius: 30.0,
                hostile: true,
                direct: false,
            }],
            ..Self::default()
        }
    }

    /// Construct a world matching this scenario. Scripted alerts are
    /// not applied here; the runner injects them at their ticks.
    pub fn build(&self) -> Result<World, ScenarioError> {
        let mut world = World::new(
            self.config.clone(),
            WorldConfig {
                seed: self.seed,
                grid_width: self.grid_width,
                grid_height: self.grid_height,
                cell_size: Fixed::from_num(self.cell_size),
            },
        )?;

        for wall in &self.walls {
            let kind = if wall.low {
                CellKind::LowWall
            } else {
                CellKind::Wall
            };
            world
                .grid_mut()
                .fill_rect(vec2(wall.min), vec2(wall.max), kind);
        }

        let mut cover_ids: Vec<CoverId> = Vec::with_capacity(self.covers.len());
        for cover in &self.covers {
            cover_ids.push(world.add_cover(CoverParams {
                position: vec2(cover.position),
                forward: vec2(cover.forward),
                width: Fixed::from_num(cover.width),
                height: Fixed::from_num(cover.height),
            }));
        }
        for &(left, right) in &self.cover_links {
            let index = left.max(right);
            if index >= cover_ids.len() {
                return Err(ScenarioError::InvalidLink {
                    index,
                    count: cover_ids.len(),
                });
            }
            world.link_covers(cover_ids[left], cover_ids[right])?;
        }

        for zone in &self.search_zones {
            world.add_search_zone(vec2(zone.min), vec2(zone.max));
        }
        for zone in &self.vision_zones {
            world.add_vision_zone(
                vec2(zone.min),
                vec2(zone.max),
                Fixed::from_num(zone.sight_multiplier),
            );
        }

        for placement in &self.actors {
            world.spawn_actor(spawn_params(placement));
        }

        Ok(world)
    }
}

fn spawn_params(placement: &ActorPlacement) -> ActorSpawnParams {
    let base = if placement.dummy {
        ActorSpawnParams::dummy(placement.side, vec2(placement.position))
    } else {
        ActorSpawnParams::fighter(placement.side, vec2(placement.position))
    };
    ActorSpawnParams {
        facing: placement.facing.map(vec2).or(base.facing),
        health: placement.health.or(base.health),
        hearing: placement.hearing.map(Fixed::from_num).or(base.hearing),
        aggressive: placement.aggressive.or(base.aggressive),
        grenades: placement.grenades.or(base.grenades),
        patrol: placement
            .patrol
            .iter()
            .map(|w| Waypoint {
                position: vec2(w.position),
                pause: w.pause.map(Fixed::from_num),
            })
            .collect(),
        ..base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scenario_builds() {
        let world = Scenario::default().build().expect("build");
        assert_eq!(world.actors().len(), 0);
        assert_eq!(world.covers().len(), 0);
    }

    #[test]
    fn test_skirmish_builtin_builds() {
        let scenario = Scenario::skirmish_2v2();
        let world = scenario.build().expect("build");

        assert_eq!(world.actors().len(), 4);
        assert_eq!(world.covers().len(), 2);
        assert_eq!(world.actors().living_on_side(0).len(), 2);
        assert_eq!(world.actors().living_on_side(1).len(), 2);
    }

    #[test]
    fn test_patrol_builtin_has_routes_and_zone() {
        let scenario = Scenario::patrol_intrusion();
        let world = scenario.build().expect("build");

        let patrollers = world.actors().living_on_side(0);
        assert_eq!(patrollers.len(), 2);
        for id in patrollers {
            let actor = world.actors().get(id).expect("actor");
            assert!(!actor.patrol.is_empty(), "guards should have routes");
        }
        // The intruder is brainless
        let intruder = world.actors().living_on_side(1)[0];
        assert!(world.agent(intruder).is_none());
    }

    #[test]
    fn test_parse_ron_scenario() {
        let content = r#"(
            name: "breach_test",
            seed: 42,
            grid_width: 32,
            grid_height: 32,
            walls: [(min: (4.0, 4.0), max: (8.0, 5.0))],
            covers: [
                (position: (10.0, 10.0), forward: (0.0, 1.0), width: 4.0, height: 1.0),
                (position: (16.0, 10.0), forward: (0.0, 1.0), width: 4.0, height: 2.5),
            ],
            cover_links: [(0, 1)],
            actors: [
                (side: 0, position: (6.0, 6.0)),
                (side: 1, position: (20.0, 20.0), dummy: true, health: Some(50)),
            ],
            alerts: [(tick: 10, position: (12.0, 12.0), radius: 25.0, hostile: true)],
            config: (combat: (burst_count: 2)),
        )"#;

        let scenario = Scenario::from_ron_str(content).expect("parse");
        assert_eq!(scenario.name, "breach_test");
        assert_eq!(scenario.seed, 42);
        assert_eq!(scenario.covers.len(), 2);
        assert_eq!(scenario.alerts.len(), 1);
        assert_eq!(scenario.config.combat.burst_count, 2);

        let world = scenario.build().expect("build");
        assert_eq!(world.actors().len(), 2);
        let dummy = world.actors().living_on_side(1)[0];
        assert_eq!(world.actors().get(dummy).expect("actor").health.max, 50);
    }

    #[test]
    fn test_cover_link_out_of_range_rejected() {
        let scenario = Scenario {
            covers: vec![CoverPlacement {
                position: (10.0, 10.0),
                forward: (0.0, 1.0),
                width: 4.0,
                height: 1.0,
            }],
            cover_links: vec![(0, 5)],
            ..Scenario::default()
        };
        let err = scenario.build().expect_err("link must be rejected");
        assert!(matches!(
            err,
            ScenarioError::InvalidLink { index: 5, count: 1 }
        ));
    }

    #[test]
    fn test_missing_file_reports_not_found() {
        let err = Scenario::load("/nonexistent/scenario.ron").expect_err("missing file");
        assert!(matches!(err, ScenarioError::FileNotFound(_)));
    }

    #[test]
    fn test_bad_config_rejected_at_build() {
        let mut scenario = Scenario::skirmish_2v2();
        scenario.config.combat.burst_count = 0;
        assert!(matches!(
            scenario.build(),
            Err(ScenarioError::World(TacticsError::InvalidConfigValue { .. }))
        ));
    }
}
