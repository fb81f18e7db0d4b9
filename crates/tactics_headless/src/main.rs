//! Headless combat AI runner.
//!
//! This binary runs encounters without an engine. Reports go to stdout
//! as JSON; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run a single encounter
//! cargo run -p tactics_headless -- run --scenario skirmish_2v2
//!
//! # Run a batch sweep
//! cargo run -p tactics_headless -- batch --scenario skirmish_2v2 --count 50 --output results/
//!
//! # Verify determinism
//! cargo run -p tactics_headless -- verify --scenario skirmish_2v2 --runs 5
//!
//! # Benchmark raw tick throughput
//! cargo run -p tactics_headless -- benchmark --ticks 10000
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tactics_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    runner::{run_encounter, EncounterConfig},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "tactics_headless")]
#[command(about = "Headless combat AI runner for testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single encounter and print its report
    Run {
        /// Scenario: a built-in name or a RON file path
        #[arg(short, long, default_value = "skirmish_2v2")]
        scenario: String,

        /// Override the scenario's seed
        #[arg(long)]
        seed: Option<u64>,

        /// Maximum encounter duration in ticks
        #[arg(short, long, default_value = "2400")]
        ticks: u64,

        /// Pretty-print the JSON report
        #[arg(long)]
        pretty: bool,
    },

    /// Run a batch of encounters across a seed range
    Batch {
        /// Scenario to run
        #[arg(short, long, default_value = "skirmish_2v2")]
        scenario: String,

        /// Number of encounters to run
        #[arg(short, long, default_value = "50")]
        count: u32,

        /// Maximum parallel encounters (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Maximum encounter duration in minutes (simulation time)
        #[arg(long, default_value = "5")]
        duration_minutes: u32,
    },

    /// Verify determinism by running the same seed multiple times
    Verify {
        /// Scenario to test
        #[arg(short, long, default_value = "skirmish_2v2")]
        scenario: String,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,

        /// Maximum encounter duration in ticks
        #[arg(short, long, default_value = "2400")]
        ticks: u64,
    },

    /// Run N ticks for benchmarking
    Benchmark {
        /// Number of ticks to run
        #[arg(short, long, default_value = "10000")]
        ticks: u64,

        /// Scenario to benchmark
        #[arg(short, long)]
        scenario: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries reports.
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match cli.command {
        Some(Commands::Run {
            scenario,
            seed,
            ticks,
            pretty,
        }) => {
            cmd_run(&scenario, seed, ticks, pretty);
        }
        Some(Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed,
            duration_minutes,
        }) => {
            cmd_batch(scenario, count, parallel, output, seed, duration_minutes);
        }
        Some(Commands::Verify {
            scenario,
            seed,
            runs,
            ticks,
        }) => {
            cmd_verify(&scenario, seed, runs, ticks);
        }
        Some(Commands::Benchmark { ticks, scenario }) => {
            cmd_benchmark(ticks, scenario.as_deref());
        }
        None => {
            cmd_run("skirmish_2v2", None, 2400, false);
        }
    }
}

/// Run a single encounter and print its report to stdout
fn cmd_run(scenario: &str, seed: Option<u64>, ticks: u64, pretty: bool) {
    let mut scenario = match Scenario::resolve(scenario) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load scenario: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(seed) = seed {
        scenario.seed = seed;
    }

    let encounter_id = format!("run_{}", scenario.seed);
    let config = EncounterConfig::new(scenario, ticks, encounter_id);

    let result = match run_encounter(&config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Encounter failed: {}", e);
            std::process::exit(1);
        }
    };

    let json = if pretty {
        serde_json::to_string_pretty(&result.report)
    } else {
        serde_json::to_string(&result.report)
    };
    match json {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize report: {}", e);
            std::process::exit(1);
        }
    }

    eprintln!(
        "Outcome: {} after {} ticks (winner: {:?})",
        result.report.outcome, result.report.duration_ticks, result.report.winner
    );
    eprintln!("Final state hash: {:016x}", result.final_state_hash);
}

/// Run a batch of encounters and save aggregate results
fn cmd_batch(
    scenario: String,
    count: u32,
    parallel: u32,
    output: PathBuf,
    seed: u64,
    duration_minutes: u32,
) {
    // Ticks = minutes * 60 seconds * 20 ticks/second
    const TICKS_PER_MINUTE: u64 = 60 * 20;
    let max_ticks = u64::from(duration_minutes) * TICKS_PER_MINUTE;

    tracing::info!(
        scenario = %scenario,
        count = count,
        parallel = parallel,
        seed = seed,
        output = %output.display(),
        max_ticks = max_ticks,
        "Batch configuration"
    );

    if let Err(e) = std::fs::create_dir_all(&output) {
        tracing::error!(error = %e, path = %output.display(), "Failed to create output directory");
        eprintln!(
            "FATAL: Cannot create output directory '{}': {}",
            output.display(),
            e
        );
        std::process::exit(1);
    }

    let config = BatchConfig {
        scenario,
        encounter_count: count,
        parallel_encounters: parallel,
        seed_start: seed,
        max_ticks,
        output_dir: output.clone(),
    };

    let results = run_batch(config);

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        tracing::error!(error = %e, path = %results_path.display(), "Failed to save results");
        eprintln!("FATAL: Failed to save results: {}", e);
        std::process::exit(1);
    }

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Encounters run: {}", results.encounters.len());
    if !results.errors.is_empty() {
        eprintln!("Encounters FAILED: {}", results.errors.len());
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!(
        "Throughput: {:.1} encounters/sec",
        results.encounters.len() as f64 / results.duration_seconds.max(0.001)
    );
    eprintln!("\nOutcomes:");
    for (side, wins) in &results.summary.win_counts {
        eprintln!("  Side {} wins: {}", side, wins);
    }
    eprintln!("  Timeouts: {}", results.summary.timeouts);
    eprintln!(
        "  Mean duration: {:.0} ticks",
        results.summary.mean_duration_ticks
    );

    if !results.errors.is_empty() {
        eprintln!("\nENCOUNTER FAILURES:");
        for error in results.errors.iter().take(10) {
            eprintln!(
                "  Encounter {} (seed {}): {}",
                error.encounter_index, error.seed, error.message
            );
        }
        if results.errors.len() > 10 {
            eprintln!("  ... and {} more failures", results.errors.len() - 10);
        }
    }

    eprintln!("\nResults saved to: {}", results_path.display());
}

/// Verify determinism
fn cmd_verify(scenario: &str, seed: u64, runs: u32, ticks: u64) {
    tracing::info!(
        "Verifying determinism: {} with seed {} ({} runs)",
        scenario,
        seed,
        runs
    );

    let deterministic = verify_determinism(scenario, seed, runs, ticks);

    if deterministic {
        eprintln!("PASS: All {} runs produced identical results", runs);
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        std::process::exit(1);
    }
}

/// Run benchmark
fn cmd_benchmark(ticks: u64, scenario: Option<&str>) {
    use std::time::Instant;

    tracing::info!("Running {} tick benchmark", ticks);

    let scenario_data = if let Some(s) = scenario {
        tracing::info!("Using scenario: {}", s);
        match Scenario::resolve(s) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Failed to load scenario: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Scenario::skirmish_2v2()
    };

    let mut world = match scenario_data.build() {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Failed to build scenario: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!(
        "Starting benchmark with {} actors",
        world.actors().len()
    );
    eprintln!("Running {} ticks...", ticks);

    // Warmup
    for _ in 0..100 {
        world.tick();
    }

    // Benchmark
    let start = Instant::now();
    for _ in 0..ticks {
        world.tick();
    }
    let elapsed = start.elapsed();

    let tps = ticks as f64 / elapsed.as_secs_f64();

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BENCHMARK RESULTS");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Ticks: {}", ticks);
    eprintln!("Duration: {:.3}s", elapsed.as_secs_f64());
    eprintln!("Ticks/second: {:.1}", tps);
    eprintln!("ms/tick: {:.4}", elapsed.as_millis() as f64 / ticks as f64);
    eprintln!("Living actors: {}", world.actors().len());
    match world.state_hash() {
        Ok(hash) => eprintln!("State hash: {:016x}", hash),
        Err(e) => eprintln!("State hash unavailable: {}", e),
    }
}
