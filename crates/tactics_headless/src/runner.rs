//! Encounter execution for headless testing.
//!
//! Runs a scenario tick by tick, injects its scripted alerts, and
//! resolves fire commands against a simple deterministic ballistic
//! stand-in so encounters reach an outcome without a host engine.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use tactics_core::actor::{ActorId, Side};
use tactics_core::math::Fixed;
use tactics_core::world::World;

use crate::report::{ActorReport, EncounterReport, EventTally, SideReport};
use crate::scenario::{Scenario, ScenarioError};

/// Ticks between resolved volleys while an actor holds fire.
const VOLLEY_INTERVAL: u64 = 8;

/// Damage per connecting volley.
const VOLLEY_DAMAGE: u32 = 9;

/// Maximum distance between the aim point and a hit target, in
/// world units. The core only decides where to shoot; this margin is
/// the harness standing in for the host's ballistic model.
const HIT_SLACK: i64 = 3;

/// Log progress every N ticks.
const PROGRESS_LOG_INTERVAL: u64 = 1000;

/// Warn if a single tick takes longer than this.
const SLOW_TICK_THRESHOLD_MS: u128 = 100;

/// Configuration for a single encounter run.
#[derive(Debug, Clone)]
pub struct EncounterConfig {
    /// Scenario to run.
    pub scenario: Scenario,
    /// Hard tick limit; a run ending here reports a timeout.
    pub max_ticks: u64,
    /// Identifier carried into logs and the report.
    pub encounter_id: String,
}

impl EncounterConfig {
    /// Config for a named run of the given scenario.
    #[must_use]
    pub fn new(scenario: Scenario, max_ticks: u64, encounter_id: impl Into<String>) -> Self {
        Self {
            scenario,
            max_ticks,
            encounter_id: encounter_id.into(),
        }
    }
}

/// Outcome of a completed encounter.
#[derive(Debug, Clone)]
pub struct EncounterResult {
    /// Full behavioral report.
    pub report: EncounterReport,
    /// State hash at the final tick, for determinism checks.
    pub final_state_hash: u64,
}

/// Run one encounter to elimination or the tick limit.
pub fn run_encounter(config: &EncounterConfig) -> Result<EncounterResult, ScenarioError> {
    let start_time = Instant::now();
    info!(
        encounter_id = %config.encounter_id,
        scenario = %config.scenario.name,
        seed = config.scenario.seed,
        max_ticks = config.max_ticks,
        "Starting encounter"
    );

    let mut world = config.scenario.build()?;

    let mut sides: BTreeMap<Side, SideReport> = BTreeMap::new();
    for id in world.actors().sorted_ids() {
        let actor = world.actor(id)?;
        sides.entry(actor.side).or_default().spawned += 1;
    }

    let mut tally = EventTally::default();
    let mut kills: BTreeMap<Side, u32> = BTreeMap::new();

    let mut alerts = config.scenario.alerts.clone();
    alerts.sort_by_key(|a| a.tick);
    let mut next_alert = 0;

    let mut ticks_run = 0;
    let mut winner: Option<Side> = None;
    let mut outcome = "timeout".to_string();

    while ticks_run < config.max_ticks {
        // Scripted alerts post before the tick they are scheduled on,
        // so agents hear them during the following tick.
        while next_alert < alerts.len() && alerts[next_alert].tick <= world.now() {
            let spec = &alerts[next_alert];
            world.post_alert(
                crate::scenario::vec2(spec.position),
                Fixed::from_num(spec.radius),
                spec.hostile,
                None,
                spec.direct,
            );
            debug!(tick = world.now(), position = ?spec.position, "Injected scripted alert");
            next_alert += 1;
        }

        // Volleys land between ticks, ahead of the tick that reports
        // their death events.
        if ticks_run > 0 && ticks_run % VOLLEY_INTERVAL == 0 {
            resolve_volleys(&mut world, &mut kills)?;
        }

        let tick_start = Instant::now();
        let ticked = world.tick();
        tally.record(&ticked);
        ticks_run += 1;

        let tick_elapsed = tick_start.elapsed();
        if tick_elapsed.as_millis() > SLOW_TICK_THRESHOLD_MS {
            warn!(
                tick = ticks_run,
                duration_ms = tick_elapsed.as_millis(),
                "Slow tick detected"
            );
        }
        if ticks_run % PROGRESS_LOG_INTERVAL == 0 {
            debug!(
                tick = ticks_run,
                living = world.actors().sorted_ids().len(),
                "Encounter progress"
            );
        }

        // Elimination only means something with two or more sides.
        if sides.len() > 1 {
            let standing: Vec<Side> = sides
                .keys()
                .copied()
                .filter(|&side| !world.actors().living_on_side(side).is_empty())
                .collect();
            if standing.len() == 1 {
                winner = Some(standing[0]);
                outcome = "elimination".to_string();
                break;
            }
            if standing.is_empty() {
                outcome = "mutual_elimination".to_string();
                break;
            }
        }
    }

    for (&side, report) in &mut sides {
        let alive = world.actors().living_on_side(side).len() as u32;
        report.alive = alive;
        report.lost = report.spawned.saturating_sub(alive);
        report.kills = kills.get(&side).copied().unwrap_or(0);
    }

    let mut actors = Vec::new();
    for id in world.actors().sorted_ids() {
        let actor = world.actor(id)?;
        actors.push(ActorReport {
            id,
            side: actor.side,
            alive: actor.alive,
            health: actor.health.current,
            position: (
                actor.position.x.to_num::<f64>(),
                actor.position.y.to_num::<f64>(),
            ),
            state: world.agent(id).map(|a| a.state),
            reason: world.agent(id).map(|a| a.reason),
        });
    }

    let final_state_hash = world.state_hash()?;
    info!(
        encounter_id = %config.encounter_id,
        ticks = ticks_run,
        outcome = %outcome,
        winner = ?winner,
        duration_ms = start_time.elapsed().as_millis(),
        "Encounter complete"
    );

    let mut report = EncounterReport::new(
        config.encounter_id.clone(),
        config.scenario.name.clone(),
        config.scenario.seed,
    );
    report.duration_ticks = ticks_run;
    report.winner = winner;
    report.outcome = outcome;
    report.sides = sides;
    report.tally = tally;
    report.actors = actors;
    report.final_state_hash = final_state_hash;

    Ok(EncounterResult {
        report,
        final_state_hash,
    })
}

/// Resolve one volley per firing actor against the nearest living
/// enemy within [`HIT_SLACK`] of the aim point, if line of sight
/// holds. Processing order follows ascending actor id.
fn resolve_volleys(
    world: &mut World,
    kills: &mut BTreeMap<Side, u32>,
) -> Result<(), ScenarioError> {
    let slack_sq = Fixed::from_num(HIT_SLACK * HIT_SLACK);

    let mut shots: Vec<(ActorId, Side, ActorId)> = Vec::new();
    for id in world.actors().sorted_ids() {
        let shooter = world.actor(id)?;
        if !shooter.alive || shooter.gun.magazine == 0 {
            continue;
        }
        let Some(aim) = shooter.firing_at else {
            continue;
        };

        let mut best: Option<(ActorId, Fixed)> = None;
        for enemy_id in world.actors().living_enemies_of(shooter.side) {
            let enemy = world.actor(enemy_id)?;
            let spread = enemy.position.distance_squared(aim);
            if spread > slack_sq {
                continue;
            }
            if !world
                .grid()
                .has_line_of_sight(shooter.position, enemy.position, enemy.is_crouched())
            {
                continue;
            }
            if best.map_or(true, |(_, d)| spread < d) {
                best = Some((enemy_id, spread));
            }
        }
        if let Some((victim, _)) = best {
            shots.push((id, shooter.side, victim));
        }
    }

    for (shooter, side, victim) in shots {
        if !world.actor(victim)?.alive {
            continue;
        }
        world.apply_damage(victim, VOLLEY_DAMAGE, Some(shooter))?;
        if !world.actor(victim)?.alive {
            *kills.entry(side).or_default() += 1;
        }
    }

    Ok(())
}
