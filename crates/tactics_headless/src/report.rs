//! Encounter reports for behavioral analysis.
//!
//! This module collects what an encounter produced: per-side outcomes,
//! event tallies and the final view of every actor. Reports serialize
//! to JSON so CI jobs and sweep scripts can diff them across builds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tactics_core::actor::{ActorId, Side};
use tactics_core::brain::{AiState, StateReason};
use tactics_core::events::{AiEvent, MotorCommand};
use tactics_core::world::TickEvents;

/// Complete report for a single encounter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncounterReport {
    /// Unique encounter identifier.
    pub encounter_id: String,
    /// Scenario name.
    pub scenario: String,
    /// Simulation seed used.
    pub seed: u64,
    /// Ticks the encounter ran for.
    pub duration_ticks: u64,
    /// Side left standing (None on timeout or mutual loss).
    pub winner: Option<Side>,
    /// How the encounter ended.
    pub outcome: String,
    /// Per-side aggregates.
    pub sides: BTreeMap<Side, SideReport>,
    /// Counts of observable events and commands.
    pub tally: EventTally,
    /// Final view of every actor, dead or alive.
    pub actors: Vec<ActorReport>,
    /// Final simulation state hash (for determinism validation).
    pub final_state_hash: u64,
}

impl EncounterReport {
    /// Create a new report shell.
    #[must_use]
    pub fn new(encounter_id: impl Into<String>, scenario: impl Into<String>, seed: u64) -> Self {
        Self {
            encounter_id: encounter_id.into(),
            scenario: scenario.into(),
            seed,
            ..Default::default()
        }
    }
}

/// Aggregates for one side.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SideReport {
    /// Actors spawned on this side.
    pub spawned: u32,
    /// Actors still alive at the end.
    pub alive: u32,
    /// Actors lost.
    pub lost: u32,
    /// Enemy actors this side's fire brought down.
    pub kills: u32,
}

/// Counts of everything observable an encounter produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventTally {
    /// Behavioral state transitions.
    pub state_changes: u64,
    /// Threat focus switches.
    pub threat_changes: u64,
    /// Search points verified clear.
    pub points_investigated: u64,
    /// Grenades thrown.
    pub grenades_thrown: u64,
    /// Deaths.
    pub deaths: u64,
    /// Open-fire commands issued to the motor layer.
    pub open_fire_commands: u64,
    /// Reload commands issued to the motor layer.
    pub reload_commands: u64,
    /// State entry counts, keyed by state name.
    pub state_entries: BTreeMap<String, u64>,
}

impl EventTally {
    /// Fold one tick's output into the tally.
    pub fn record(&mut self, ticked: &TickEvents) {
        for event in &ticked.events {
            match event {
                AiEvent::StateChanged { to, .. } => {
                    self.state_changes += 1;
                    *self.state_entries.entry(format!("{to:?}")).or_default() += 1;
                }
                AiEvent::ThreatChanged { .. } => self.threat_changes += 1,
                AiEvent::PointInvestigated { .. } => self.points_investigated += 1,
                AiEvent::GrenadeThrown { .. } => self.grenades_thrown += 1,
                AiEvent::Died { .. } => self.deaths += 1,
            }
        }
        for (_, command) in &ticked.commands {
            match command {
                MotorCommand::OpenFire { .. } => self.open_fire_commands += 1,
                MotorCommand::Reload => self.reload_commands += 1,
                _ => {}
            }
        }
    }
}

/// Final view of one actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorReport {
    /// Actor identifier.
    pub id: ActorId,
    /// Team identifier.
    pub side: Side,
    /// Still alive at the end.
    pub alive: bool,
    /// Remaining health.
    pub health: u32,
    /// Final position.
    pub position: (f64, f64),
    /// Behavioral state (None for brainless actors).
    pub state: Option<AiState>,
    /// Why the actor is in that state.
    pub reason: Option<StateReason>,
}

/// Aggregates across a batch of encounters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Encounters aggregated.
    pub total_encounters: u32,
    /// Wins per side.
    pub win_counts: BTreeMap<Side, u32>,
    /// Encounters that hit the tick limit.
    pub timeouts: u32,
    /// Mean encounter length in ticks.
    pub mean_duration_ticks: f64,
    /// Distinct final state hashes across the batch.
    pub distinct_final_hashes: u32,
    /// Total deaths across the batch.
    pub total_deaths: u64,
    /// Total grenades thrown across the batch.
    pub total_grenades: u64,
}

impl BatchSummary {
    /// Aggregate a batch of reports.
    #[must_use]
    pub fn from_reports(reports: &[EncounterReport]) -> Self {
        let mut summary = Self {
            total_encounters: reports.len() as u32,
            ..Self::default()
        };
        let mut hashes: Vec<u64> = Vec::with_capacity(reports.len());
        let mut total_ticks = 0u64;

        for report in reports {
            if let Some(winner) = report.winner {
                *summary.win_counts.entry(winner).or_default() += 1;
            }
            if report.outcome == "timeout" {
                summary.timeouts += 1;
            }
            total_ticks += report.duration_ticks;
            summary.total_deaths += report.tally.deaths;
            summary.total_grenades += report.tally.grenades_thrown;
            hashes.push(report.final_state_hash);
        }

        hashes.sort_unstable();
        hashes.dedup();
        summary.distinct_final_hashes = hashes.len() as u32;
        if !reports.is_empty() {
            summary.mean_duration_ticks = total_ticks as f64 / reports.len() as f64;
        }
        summary
    }
}
