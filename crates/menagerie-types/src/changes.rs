//! Observed mutations and the write operations derived from them.
//!
//! A [`StateChange`] records one field of one agent changing value. The
//! storage classifier maps its [`MutationKind`] to a durability tier, and
//! the write pipeline carries the resulting [`WriteOp`] to the cache and
//! the repository. Both are closed sum types so no layer has to guess at
//! the shape of a payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{AgentStatus, Mood};
use crate::ids::AgentId;
use crate::structs::{Agent, Event};

/// The field a mutation touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MutationKind {
    /// Agent level.
    Level,
    /// Experience points.
    Experience,
    /// Coin balance.
    Coins,
    /// Inventory items.
    Items,
    /// Current health.
    Health,
    /// Health cap.
    MaxHealth,
    /// Current energy.
    Energy,
    /// Satiety.
    Hunger,
    /// Social need.
    Social,
    /// Current location.
    Location,
    /// Lifecycle status.
    Status,
    /// Derived mood.
    Mood,
    /// Friends list.
    Friends,
    /// Recent memories.
    Memory,
    /// Short-lived buff.
    TempBuff,
    /// Per-session bookkeeping.
    Session,
    /// A field name with no dedicated variant.
    Other(String),
}

impl MutationKind {
    /// Map a field name to its kind. Unrecognised names become
    /// [`MutationKind::Other`].
    pub fn parse(name: &str) -> Self {
        match name {
            "level" => Self::Level,
            "experience" => Self::Experience,
            "coins" => Self::Coins,
            "items" => Self::Items,
            "health" => Self::Health,
            "max_health" => Self::MaxHealth,
            "energy" => Self::Energy,
            "hunger" => Self::Hunger,
            "social" => Self::Social,
            "location" => Self::Location,
            "status" => Self::Status,
            "mood" => Self::Mood,
            "friends" => Self::Friends,
            "memory" => Self::Memory,
            "temp_buff" => Self::TempBuff,
            "session" => Self::Session,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// A snapshot of one field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum FieldValue {
    /// Any counter or vital.
    Int(i64),
    /// Free text such as a location.
    Text(String),
    /// A status.
    Status(AgentStatus),
    /// A mood.
    Mood(Mood),
    /// A list such as friends or memory.
    List(Vec<String>),
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

/// One observed field mutation. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StateChange {
    /// The mutated agent.
    pub agent_id: AgentId,
    /// Which field changed.
    pub field: MutationKind,
    /// Value before.
    pub old: FieldValue,
    /// Value after.
    pub new: FieldValue,
    /// When the change was observed.
    pub timestamp: DateTime<Utc>,
    /// Set when the change killed the agent.
    pub is_critical: bool,
}

impl StateChange {
    /// Record a change observed now.
    pub fn new(agent_id: AgentId, field: MutationKind, old: FieldValue, new: FieldValue) -> Self {
        let is_critical = matches!(field, MutationKind::Health) && new == FieldValue::Int(0);
        Self {
            agent_id,
            field,
            old,
            new,
            timestamp: Utc::now(),
            is_critical,
        }
    }
}

/// A unit of work for the write pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Write the full agent record.
    UpsertAgent(Box<Agent>),
    /// Append an event.
    InsertEvent(Box<Event>),
    /// Live-state change that only the in-memory layer keeps.
    LiveState(StateChange),
}

impl WriteOp {
    /// The agent this op concerns.
    pub fn agent_id(&self) -> AgentId {
        match self {
            Self::UpsertAgent(agent) => agent.id,
            Self::InsertEvent(event) => event.agent_id,
            Self::LiveState(change) => change.agent_id,
        }
    }
}

/// List every field that differs between two versions of the same agent.
pub fn diff_agents(before: &Agent, after: &Agent) -> Vec<StateChange> {
    let id = after.id;
    let mut changes = Vec::new();
    let mut record = |kind: MutationKind, old: FieldValue, new: FieldValue| {
        if old != new {
            changes.push(StateChange::new(id, kind, old, new));
        }
    };

    record(MutationKind::Level, before.level.into(), after.level.into());
    record(MutationKind::Experience, before.experience.into(), after.experience.into());
    record(MutationKind::Coins, before.coins.into(), after.coins.into());
    record(MutationKind::Health, before.health.into(), after.health.into());
    record(MutationKind::MaxHealth, before.max_health.into(), after.max_health.into());
    record(MutationKind::Energy, before.energy.into(), after.energy.into());
    record(MutationKind::Hunger, before.hunger.into(), after.hunger.into());
    record(MutationKind::Social, before.social.into(), after.social.into());
    record(
        MutationKind::Location,
        FieldValue::Text(before.location.clone()),
        FieldValue::Text(after.location.clone()),
    );
    record(
        MutationKind::Status,
        FieldValue::Status(before.status),
        FieldValue::Status(after.status),
    );
    record(MutationKind::Mood, FieldValue::Mood(before.mood), FieldValue::Mood(after.mood));
    record(
        MutationKind::Friends,
        FieldValue::List(before.friends.clone()),
        FieldValue::List(after.friends.clone()),
    );
    record(
        MutationKind::Memory,
        FieldValue::List(before.memory.clone()),
        FieldValue::List(after.memory.clone()),
    );

    changes
}
