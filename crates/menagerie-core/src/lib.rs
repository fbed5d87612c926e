//! Scheduling, routing, and the service handle for the Menagerie
//! simulation.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `menagerie.yaml` into
//!   strongly-typed structs.
//! - [`lock`] -- Sharded per-agent locks.
//! - [`store`] -- Live agents and the bounded, deduplicating event log.
//! - [`context`] -- [`ServiceContext`], the shared state every task uses,
//!   and the routing of agent changes to the cache and write tiers.
//! - [`decision`] -- [`DecisionSource`] trait and the weighted engine.
//! - [`scheduler`] -- Per-agent loops, timed completions, decay and
//!   maintenance.
//! - [`command`] -- Named commands sent by a transport layer.
//! - [`service`] -- [`Simulation`], the owner handle.

pub mod command;
pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod lock;
pub mod scheduler;
pub mod service;
pub mod store;

pub use command::{Command, CommandDetail, CommandOutcome};
pub use config::{ConfigError, SimulationConfig};
pub use context::ServiceContext;
pub use decision::{DecisionSource, ScriptedDecisionSource, WeightedDecisionEngine};
pub use error::CoreError;
pub use lock::{LockStats, ShardedLock};
pub use scheduler::{ActionScheduler, TickOutcome};
pub use service::{Simulation, SystemStats};
pub use store::{EntityStore, EventLog};
