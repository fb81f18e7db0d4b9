//! # Tactics Core
//!
//! Deterministic tactical combat AI for cover-based shooters.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! The host engine owns animation, ballistics and the navigation mesh;
//! this crate owns perception, threat memory, cover selection, squad
//! coordination, search sweeps and the per-agent combat state machine.
//! That separation enables:
//! - Headless simulation at any speed
//! - Replay and snapshot/restore debugging
//! - Determinism testing across runs
//!
//! ## Crate Structure
//!
//! - [`world`] - Simulation container and tick pipeline
//! - [`brain`] - The pure state transition function
//! - [`perception`] - Sight checks and scan scheduling
//! - [`threat`] - Single-slot threat memory
//! - [`cover`] / [`cover_search`] - Cover registry and slot selection
//! - [`search`] - Systematic sweep planning
//! - [`squad`] - Aggression slot arbitration
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod actor;
pub mod agent;
pub mod alert;
pub mod brain;
pub mod config;
pub mod cover;
pub mod cover_search;
pub mod error;
pub mod events;
pub mod math;
pub mod nav;
pub mod perception;
pub mod search;
pub mod situation;
pub mod squad;
pub mod threat;
pub mod world;
pub mod zone;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::actor::{ActorId, ActorSpawnParams, Side, Stance, Waypoint};
    pub use crate::brain::{AiState, StateReason};
    pub use crate::config::{AiConfig, TICK_RATE};
    pub use crate::cover::{CoverId, CoverParams};
    pub use crate::error::{Result, TacticsError};
    pub use crate::events::{AiEvent, MotorCommand, MoveSpeed};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::nav::CellKind;
    pub use crate::world::{TickEvents, World, WorldConfig};
}
