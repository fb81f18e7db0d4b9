//! Batch encounter runner for behavioral sweeps.
//!
//! Runs many encounters in parallel using rayon to collect aggregate
//! behavior statistics across a seed range and catch determinism
//! regressions.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tactics_core::actor::Side;

use crate::report::{BatchSummary, EncounterReport};
use crate::runner::{run_encounter, EncounterConfig};
use crate::scenario::Scenario;

/// Configuration for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario to run: a built-in name or a RON file path.
    pub scenario: String,
    /// Number of encounters to run.
    pub encounter_count: u32,
    /// Maximum parallel encounters (0 = use rayon default).
    pub parallel_encounters: u32,
    /// Starting seed; each encounter increments from here.
    pub seed_start: u64,
    /// Maximum ticks per encounter.
    pub max_ticks: u64,
    /// Output directory for results.
    pub output_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "skirmish_2v2".to_string(),
            encounter_count: 50,
            parallel_encounters: 0,
            seed_start: 0,
            max_ticks: 6000, // 5 minutes at 20 tps
            output_dir: PathBuf::from("results"),
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario.
    #[must_use]
    pub fn new(scenario: &str, encounter_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            encounter_count,
            ..Default::default()
        }
    }

    /// Set output directory.
    #[must_use]
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used.
    pub config: BatchConfig,
    /// Individual encounter reports.
    pub encounters: Vec<EncounterReport>,
    /// Aggregate summary.
    pub summary: BatchSummary,
    /// Total runtime.
    pub duration_seconds: f64,
    /// Errors encountered.
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from a JSON file.
    pub fn load(path: &std::path::Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Error during a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Encounter index within the batch.
    pub encounter_index: u32,
    /// Seed used.
    pub seed: u64,
    /// Error message.
    pub message: String,
}

/// Progress tracking for batch runs.
#[derive(Debug)]
pub struct BatchProgress {
    /// Total encounters.
    pub total: u32,
    /// Completed encounters.
    pub completed: Arc<AtomicU32>,
    /// Start time.
    pub start_time: Instant,
    /// Partial win counts for live stats.
    partial_wins: Arc<std::sync::Mutex<std::collections::BTreeMap<Side, u32>>>,
}

impl BatchProgress {
    /// Create a new progress tracker.
    #[must_use]
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: Arc::new(AtomicU32::new(0)),
            start_time: Instant::now(),
            partial_wins: Arc::new(std::sync::Mutex::new(std::collections::BTreeMap::new())),
        }
    }

    /// Record a completed encounter.
    pub fn record_completion(&self, winner: Option<Side>) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if let Some(side) = winner {
            if let Ok(mut wins) = self.partial_wins.lock() {
                *wins.entry(side).or_insert(0) += 1;
            }
        }
    }

    /// Get current completion count.
    #[must_use]
    pub fn current(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Get completion percentage.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        f64::from(self.current()) / f64::from(self.total.max(1)) * 100.0
    }

    /// Get estimated time remaining.
    #[must_use]
    pub fn eta(&self) -> Duration {
        let completed = self.current();
        if completed == 0 {
            return Duration::from_secs(0);
        }

        let elapsed = self.start_time.elapsed();
        let per_encounter = elapsed.as_secs_f64() / f64::from(completed);
        let remaining = self.total.saturating_sub(completed);
        Duration::from_secs_f64(per_encounter * f64::from(remaining))
    }

    /// Get current win rates per side.
    #[must_use]
    pub fn current_win_rates(&self) -> std::collections::BTreeMap<Side, f64> {
        let completed = self.current();
        if completed == 0 {
            return std::collections::BTreeMap::new();
        }

        if let Ok(wins) = self.partial_wins.lock() {
            wins.iter()
                .map(|(&side, &count)| (side, f64::from(count) / f64::from(completed)))
                .collect()
        } else {
            std::collections::BTreeMap::new()
        }
    }

    /// Display progress to stderr.
    pub fn display(&self) {
        let completed = self.current();
        let eta = self.eta();
        let rates = self.current_win_rates();

        eprintln!("╔════════════════════════════════════╗");
        eprintln!(
            "║ Batch Progress: {:>4}/{:<4} ({:>5.1}%) ║",
            completed,
            self.total,
            self.percentage()
        );
        eprintln!(
            "║ ETA: {:>28} ║",
            format!("{}m {}s", eta.as_secs() / 60, eta.as_secs() % 60)
        );
        if !rates.is_empty() {
            eprintln!("╟────────────────────────────────────╢");
            eprintln!("║ Win Rates So Far:                  ║");
            for (side, rate) in &rates {
                eprintln!("║   Side {:<8}: {:>5.1}%            ║", side, rate * 100.0);
            }
        }
        eprintln!("╚════════════════════════════════════╝");
    }
}

/// Run a single seeded encounter of the named scenario.
fn run_single_encounter(
    scenario: &str,
    seed: u64,
    max_ticks: u64,
) -> Result<EncounterReport, String> {
    let mut scenario = Scenario::resolve(scenario).map_err(|e| e.to_string())?;
    scenario.seed = seed;

    let config = EncounterConfig::new(scenario, max_ticks, format!("encounter_{seed}"));
    let result = run_encounter(&config).map_err(|e| e.to_string())?;
    Ok(result.report)
}

/// Run a batch of encounters.
pub fn run_batch(config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    let progress = Arc::new(BatchProgress::new(config.encounter_count));

    info!(
        "Starting batch run: {} encounters of '{}'",
        config.encounter_count, config.scenario
    );

    // Configure thread pool if specified
    if config.parallel_encounters > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_encounters as usize)
            .build_global()
            .ok(); // Ignore if already set
    }

    let results: Vec<Result<EncounterReport, BatchError>> = (0..config.encounter_count)
        .into_par_iter()
        .map(|i| {
            let seed = config.seed_start.wrapping_add(u64::from(i));

            match run_single_encounter(&config.scenario, seed, config.max_ticks) {
                Ok(report) => {
                    progress.record_completion(report.winner);

                    let completed = progress.current();
                    if completed % 10 == 0 {
                        debug!("Progress: {}/{}", completed, config.encounter_count);
                    }
                    if completed % 100 == 0 {
                        progress.display();
                    }

                    Ok(report)
                }
                Err(e) => {
                    warn!("Encounter {} failed: {}", i, e);
                    Err(BatchError {
                        encounter_index: i,
                        seed,
                        message: e,
                    })
                }
            }
        })
        .collect();

    let (encounters, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let encounters: Vec<EncounterReport> = encounters.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_reports(&encounters);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} encounters in {:.1}s ({:.1} encounters/sec)",
        encounters.len(),
        duration_seconds,
        encounters.len() as f64 / duration_seconds
    );

    BatchResults {
        config,
        encounters,
        summary,
        duration_seconds,
        errors,
    }
}

/// Verify determinism by running the same seed multiple times and
/// comparing outcomes and final state hashes.
pub fn verify_determinism(scenario: &str, seed: u64, runs: u32, max_ticks: u64) -> bool {
    let mut reports: Vec<EncounterReport> = Vec::with_capacity(runs as usize);
    for _ in 0..runs {
        match run_single_encounter(scenario, seed, max_ticks) {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!("Determinism run failed: {}", e);
                return false;
            }
        }
    }

    let Some(first) = reports.first() else {
        return true;
    };
    reports.iter().all(|r| {
        r.winner == first.winner
            && r.duration_ticks == first.duration_ticks
            && r.outcome == first.outcome
            && r.final_state_hash == first.final_state_hash
    })
}
