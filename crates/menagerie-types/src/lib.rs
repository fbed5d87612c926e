//! Shared type definitions for the Menagerie simulation.
//!
//! This crate is the single source of truth for the data model used across
//! the workspace. Snapshot types flow to `TypeScript` via `ts-rs` for any
//! front end that consumes them.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for agents and events
//! - [`enums`] -- Personality, status, mood, action and event kinds, storage tiers
//! - [`structs`] -- Agents, events, and decided actions
//! - [`changes`] -- Observed mutations and write-pipeline operations

pub mod changes;
pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use changes::{FieldValue, MutationKind, StateChange, WriteOp, diff_agents};
pub use enums::{
    ActionKind, AgentStatus, DataPriority, EventKind, Mood, Personality, StorageLayers,
};
pub use ids::{AgentId, EventId};
pub use structs::{Action, Agent, Event, EventPayload, MEMORY_CAPACITY, NEED_MAX};
