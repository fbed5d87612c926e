//! Agent rules for the Menagerie simulation.
//!
//! This crate contains the logic layer for agents -- everything that operates
//! on agent state without touching I/O or locks. It sits between
//! `menagerie-types` (which defines the data structures) and `menagerie-core`
//! (which handles scheduling, locking, and persistence).
//!
//! # Modules
//!
//! - [`adventure`] -- Exploration outcomes and battle resolution
//! - [`agent`] -- Agent creation from an owner ([`spawn_agent`])
//! - [`config`] -- Configurable parameters for vitals ([`VitalsConfig`])
//! - [`decay`] -- Natural decay and starvation ([`apply_decay`])
//! - [`error`] -- Error types ([`AgentError`])
//! - [`vitals`] -- Clamped vital mutations, levelling, and mood

pub mod adventure;
pub mod agent;
pub mod config;
pub mod decay;
pub mod error;
pub mod vitals;

// Re-export primary types at crate root for convenience.
pub use adventure::{BattleReport, LOCATIONS, MONSTERS, Monster, resolve_battle, roll_exploration};
pub use agent::{NAMES, spawn_agent};
pub use config::VitalsConfig;
pub use decay::{DecayOutcome, apply_decay};
pub use error::AgentError;
