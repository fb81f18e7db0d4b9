//! Headless encounter runner for AI testing and CI verification.
//!
//! This crate drives the combat AI without an engine: scenarios
//! describe an arena and its actors, the runner ticks the simulation
//! and stands in for the host's ballistics, and reports capture what
//! the agents did. This enables:
//!
//! - **Behavior testing**: Watch full encounters resolve without a game client
//! - **Batch sweeps**: Run a scenario across many seeds and aggregate outcomes
//! - **CI verification**: Check that identical seeds produce identical runs
//!
//! # Example
//!
//! ```bash
//! # Run one encounter and print its report
//! cargo run -p tactics_headless -- run --scenario skirmish_2v2 --pretty
//!
//! # Sweep 50 seeds of a scenario file
//! cargo run -p tactics_headless -- batch --scenario arena.ron --count 50
//!
//! # Verify determinism
//! cargo run -p tactics_headless -- verify --scenario skirmish_2v2 --runs 5
//! ```

pub mod batch;
pub mod report;
pub mod runner;
pub mod scenario;

pub use batch::{
    run_batch, verify_determinism, BatchConfig, BatchError, BatchProgress, BatchResults,
};
pub use report::{ActorReport, BatchSummary, EncounterReport, EventTally, SideReport};
pub use runner::{run_encounter, EncounterConfig, EncounterResult};
pub use scenario::{Scenario, ScenarioError};
