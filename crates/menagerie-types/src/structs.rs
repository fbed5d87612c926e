//! Core entity structs: agents, events, and decided actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ActionKind, AgentStatus, EventKind, Mood, Personality};
use crate::ids::{AgentId, EventId};

/// Maximum number of entries kept in [`Agent::memory`].
pub const MEMORY_CAPACITY: usize = 10;

/// Upper bound of the hunger (satiety) and social needs.
pub const NEED_MAX: u32 = 100;

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Full state of one simulated pet.
///
/// Vitals are unsigned and clamped by the mutation helpers in
/// `menagerie-agents`; nothing else should write them directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Agent {
    /// Unique identifier.
    pub id: AgentId,
    /// Owning player. At most one agent per owner.
    pub owner: String,
    /// Display name.
    pub name: String,
    /// Fixed temperament.
    pub personality: Personality,
    /// Current level, starting at 1.
    pub level: u32,
    /// Experience towards the next level.
    pub experience: u32,
    /// Current health, `0..=max_health`.
    pub health: u32,
    /// Health cap.
    pub max_health: u32,
    /// Current energy, `0..=max_energy`.
    pub energy: u32,
    /// Energy cap.
    pub max_energy: u32,
    /// Satiety, `0..=100`. Higher is fuller.
    pub hunger: u32,
    /// Social need, `0..=100`. Higher is more fulfilled.
    pub social: u32,
    /// Offensive battle stat.
    pub attack: u32,
    /// Defensive battle stat; subtracted from incoming damage.
    pub defense: u32,
    /// Coin balance.
    pub coins: u64,
    /// Where the agent currently is.
    pub location: String,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Mood derived from vitals.
    pub mood: Mood,
    /// Most recent memories, oldest first.
    pub memory: Vec<String>,
    /// Owners of befriended agents, deduplicated.
    pub friends: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last time the agent finished something.
    pub last_activity: DateTime<Utc>,
    /// Bumped on every observed change. A stored record is never replaced
    /// by one with a lower revision.
    #[serde(default)]
    pub revision: u64,
}

impl Agent {
    /// Whether the agent still has health left.
    pub const fn is_alive(&self) -> bool {
        self.health > 0 && !matches!(self.status, AgentStatus::Dead)
    }

    /// Whether the agent can start exploring.
    pub const fn can_explore(&self) -> bool {
        self.is_alive() && matches!(self.status, AgentStatus::Idle) && self.energy > 20
    }

    /// Whether the agent can start resting.
    pub const fn can_rest(&self) -> bool {
        self.is_alive() && matches!(self.status, AgentStatus::Idle)
    }

    /// Whether the agent can start socializing.
    pub const fn can_socialize(&self) -> bool {
        self.is_alive() && matches!(self.status, AgentStatus::Idle) && self.social < 90
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Structured data attached to an [`Event`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventPayload {
    /// Location reached or explored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Opponent in a battle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enemy: Option<String>,
    /// Battle outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victory: Option<bool>,
    /// Experience involved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<u32>,
    /// Signed coin delta. Zero means no coins changed hands.
    #[serde(default)]
    pub coins: i64,
    /// Name of someone met.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friend: Option<String>,
}

/// One entry in the append-only event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Unique identifier.
    pub id: EventId,
    /// The agent the event is about.
    pub agent_id: AgentId,
    /// Agent name at the time of the event.
    pub agent_name: String,
    /// Category.
    pub kind: EventKind,
    /// Human-readable description.
    pub message: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Structured details.
    pub payload: EventPayload,
}

impl Event {
    /// Create an event for `agent` stamped with the current time.
    pub fn new(agent: &Agent, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            agent_id: agent.id,
            agent_name: agent.name.clone(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            payload: EventPayload::default(),
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Attach a signed coin delta.
    #[must_use]
    pub const fn with_coins(mut self, coins: i64) -> Self {
        self.payload.coins = coins;
        self
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// A decided action. Produced fresh per decision and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Action {
    /// What to do.
    pub kind: ActionKind,
    /// Weight the action was selected with.
    pub priority: u32,
    /// Human-readable reason, used as the start event message.
    pub reason: String,
    /// How long the action takes, in seconds.
    pub duration_secs: u64,
}

impl Action {
    /// The action returned when nothing is eligible.
    pub fn idle() -> Self {
        Self {
            kind: ActionKind::Idle,
            priority: 1,
            reason: "nothing to do".to_owned(),
            duration_secs: 30,
        }
    }
}
