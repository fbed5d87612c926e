//! Enumeration types for the Menagerie simulation.
//!
//! Every enum that crosses a persistence boundary has a stable
//! lowercase string form (`as_str` / `parse`) used by the `PostgreSQL`
//! text columns.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Agent traits and state
// ---------------------------------------------------------------------------

/// Fixed temperament assigned at creation.
///
/// Personality never changes. It adjusts starting stats once and then
/// biases every decision the agent makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Personality {
    /// Favors exploring and fights harder.
    Brave,
    /// Starts richer and eats more eagerly.
    Greedy,
    /// Seeks company.
    Friendly,
    /// Rests more, explores less, has extra defense.
    Cautious,
    /// Strongest pull towards exploring.
    Curious,
}

impl Personality {
    /// All personalities in assignment order.
    pub const ALL: [Self; 5] = [
        Self::Brave,
        Self::Greedy,
        Self::Friendly,
        Self::Cautious,
        Self::Curious,
    ];

    /// Stable string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brave => "brave",
            Self::Greedy => "greedy",
            Self::Friendly => "friendly",
            Self::Cautious => "cautious",
            Self::Curious => "curious",
        }
    }

    /// Parse the string form produced by [`Personality::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

/// Lifecycle status of an agent.
///
/// `Idle` is the only state in which a new decision is taken. Every
/// in-progress state returns to `Idle` when its completion fires.
/// `Dead` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum AgentStatus {
    /// Waiting for the next decision tick.
    Idle,
    /// Out exploring; completion rolls a random outcome.
    Exploring,
    /// Recovering energy and a little health.
    Resting,
    /// Spending time with another agent.
    Socializing,
    /// Looking for free food (not enough coins to buy any).
    Foraging,
    /// Eating food that was bought at the start of the action.
    Eating,
    /// Health reached zero. Never left.
    Dead,
}

impl AgentStatus {
    /// All statuses.
    pub const ALL: [Self; 7] = [
        Self::Idle,
        Self::Exploring,
        Self::Resting,
        Self::Socializing,
        Self::Foraging,
        Self::Eating,
        Self::Dead,
    ];

    /// Stable string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Exploring => "exploring",
            Self::Resting => "resting",
            Self::Socializing => "socializing",
            Self::Foraging => "foraging",
            Self::Eating => "eating",
            Self::Dead => "dead",
        }
    }

    /// Parse the string form produced by [`AgentStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    /// Whether an action is currently in flight.
    pub const fn is_busy(self) -> bool {
        !matches!(self, Self::Idle | Self::Dead)
    }
}

impl core::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mood derived from the agent's vitals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Mood {
    /// Everything is going well.
    Excited,
    /// Mostly fine.
    Happy,
    /// Neither good nor bad.
    Neutral,
    /// Several needs unmet.
    Sad,
    /// Exhausted or starving.
    Tired,
}

impl Mood {
    /// All moods, best first.
    pub const ALL: [Self; 5] = [
        Self::Excited,
        Self::Happy,
        Self::Neutral,
        Self::Sad,
        Self::Tired,
    ];

    /// Stable string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Excited => "excited",
            Self::Happy => "happy",
            Self::Neutral => "neutral",
            Self::Sad => "sad",
            Self::Tired => "tired",
        }
    }

    /// Parse the string form produced by [`Mood::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }

    /// Multiplier applied to the urge to explore, in tenths (10 = 1.0x).
    pub const fn influence_tenths(self) -> u32 {
        match self {
            Self::Excited => 15,
            Self::Happy => 12,
            Self::Neutral => 10,
            Self::Sad => 8,
            Self::Tired => 6,
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// The kind of action an agent can decide on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ActionKind {
    /// Leave for a while and come back with a random outcome.
    Explore,
    /// Restore energy.
    Rest,
    /// Raise the social need with another agent.
    Socialize,
    /// Raise satiety, buying food when affordable.
    Eat,
    /// Do nothing this tick.
    Idle,
}

impl ActionKind {
    /// Candidate kinds evaluated by the decision engine, in evaluation order.
    pub const CANDIDATES: [Self; 4] = [Self::Explore, Self::Rest, Self::Socialize, Self::Eat];

    /// Stable string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Explore => "explore",
            Self::Rest => "rest",
            Self::Socialize => "socialize",
            Self::Eat => "eat",
            Self::Idle => "idle",
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Category of an entry in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EventKind {
    /// Agent created.
    Born,
    /// Exploration started or a new location reached.
    Explore,
    /// Fight against a monster.
    Battle,
    /// Found an item worth coins.
    Discovery,
    /// Met someone.
    Social,
    /// Rest, food, or coins gained.
    Reward,
    /// The rare jackpot outcome of exploring.
    RareFind,
    /// Experience crossed a level threshold.
    LevelUp,
    /// Hunger dropped low enough to cause damage.
    Starvation,
    /// Health reached zero.
    Death,
    /// Produced by debug commands.
    Debug,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [Self; 11] = [
        Self::Born,
        Self::Explore,
        Self::Battle,
        Self::Discovery,
        Self::Social,
        Self::Reward,
        Self::RareFind,
        Self::LevelUp,
        Self::Starvation,
        Self::Death,
        Self::Debug,
    ];

    /// Stable string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Born => "born",
            Self::Explore => "explore",
            Self::Battle => "battle",
            Self::Discovery => "discovery",
            Self::Social => "social",
            Self::Reward => "reward",
            Self::RareFind => "rare_find",
            Self::LevelUp => "level_up",
            Self::Starvation => "starvation",
            Self::Death => "death",
            Self::Debug => "debug",
        }
    }

    /// Parse the string form produced by [`EventKind::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

// ---------------------------------------------------------------------------
// Storage tiers
// ---------------------------------------------------------------------------

/// Durability class of a mutation.
///
/// Variants are declared least-durable first so the derived ordering makes
/// `Critical` the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum DataPriority {
    /// May be lost on crash; kept in memory only.
    Transient,
    /// Persisted in batches.
    Important,
    /// Persisted on the next flush, one item per batch.
    Critical,
}

impl DataPriority {
    /// All priorities, most durable first.
    pub const ALL: [Self; 3] = [Self::Critical, Self::Important, Self::Transient];

    /// Stable string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Important => "important",
            Self::Critical => "critical",
        }
    }
}

impl core::fmt::Display for DataPriority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which storage layers a tier writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum StorageLayers {
    /// In-process cache only.
    MemoryOnly,
    /// Cache plus batched database writes.
    MemoryAndDatabase,
    /// Every layer the deployment has.
    AllLayers,
}

impl StorageLayers {
    /// Whether writes reach the repository.
    pub const fn persists(self) -> bool {
        !matches!(self, Self::MemoryOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_is_the_highest_priority() {
        let highest = [DataPriority::Important, DataPriority::Critical, DataPriority::Transient]
            .into_iter()
            .max();
        assert_eq!(highest, Some(DataPriority::Critical));
        assert!(DataPriority::Transient < DataPriority::Important);
    }

    #[test]
    fn string_forms_parse_back() {
        for status in AgentStatus::ALL {
            assert_eq!(AgentStatus::parse(status.as_str()), Some(status));
        }
        for kind in EventKind::ALL {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(Mood::parse("grumpy"), None);
    }

    #[test]
    fn only_in_progress_states_are_busy() {
        assert!(!AgentStatus::Idle.is_busy());
        assert!(!AgentStatus::Dead.is_busy());
        assert!(AgentStatus::Foraging.is_busy());
    }

    #[test]
    fn memory_only_does_not_persist() {
        assert!(!StorageLayers::MemoryOnly.persists());
        assert!(StorageLayers::AllLayers.persists());
    }
}
