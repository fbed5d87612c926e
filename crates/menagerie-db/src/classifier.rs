//! Durability classification of mutations.
//!
//! [`StorageClassifier`] is a static table lookup: it maps the kind of a
//! mutation (or of an event) to a [`DataPriority`], and each priority to a
//! [`TierPolicy`] describing where and how often that tier is persisted.
//!
//! | Priority | Layers | Batch | Flush | Cache TTL | Queue |
//! |----------|--------|-------|-------|-----------|-------|
//! | Critical | all | 1 | 1 s | never | 100 |
//! | Important | memory + database | 20 | 30 s | 24 h | 500 |
//! | Transient | memory only | 100 | 5 min | 30 min | 1000 |

use std::time::Duration;

use menagerie_types::{DataPriority, EventKind, MutationKind, StateChange, StorageLayers};
use serde::Deserialize;

/// How a durability tier is stored and flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    /// Which layers the tier writes to.
    pub layers: StorageLayers,
    /// Number of queued ops that triggers an immediate flush.
    pub batch_size: usize,
    /// Flush cadence when the batch is not full.
    pub flush_interval: Duration,
    /// How long cached copies stay valid. `Duration::ZERO` means forever.
    pub cache_ttl: Duration,
    /// Bounded queue capacity; inserts beyond it are dropped.
    pub queue_capacity: usize,
}

impl TierPolicy {
    /// Default policy for `priority`.
    pub const fn default_for(priority: DataPriority) -> Self {
        match priority {
            DataPriority::Critical => Self {
                layers: StorageLayers::AllLayers,
                batch_size: 1,
                flush_interval: Duration::from_secs(1),
                cache_ttl: Duration::ZERO,
                queue_capacity: 100,
            },
            DataPriority::Important => Self {
                layers: StorageLayers::MemoryAndDatabase,
                batch_size: 20,
                flush_interval: Duration::from_secs(30),
                cache_ttl: Duration::from_secs(24 * 60 * 60),
                queue_capacity: 500,
            },
            DataPriority::Transient => Self {
                layers: StorageLayers::MemoryOnly,
                batch_size: 100,
                flush_interval: Duration::from_secs(5 * 60),
                cache_ttl: Duration::from_secs(30 * 60),
                queue_capacity: 1000,
            },
        }
    }

    /// Whether cached copies of this tier expire.
    pub const fn cache_expires(&self) -> bool {
        !self.cache_ttl.is_zero()
    }
}

/// Optional overrides for one tier, as read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TierOverrides {
    /// Batch size override.
    pub batch_size: Option<usize>,
    /// Flush interval override, in milliseconds.
    pub flush_interval_ms: Option<u64>,
    /// Cache TTL override, in seconds (0 = never expire).
    pub cache_ttl_secs: Option<u64>,
    /// Queue capacity override.
    pub queue_capacity: Option<usize>,
}

impl TierOverrides {
    fn apply(&self, mut policy: TierPolicy) -> TierPolicy {
        if let Some(size) = self.batch_size {
            policy.batch_size = size.max(1);
        }
        if let Some(ms) = self.flush_interval_ms {
            policy.flush_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(secs) = self.cache_ttl_secs {
            policy.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = self.queue_capacity {
            policy.queue_capacity = capacity.max(1);
        }
        policy
    }
}

/// Maps mutations and events to durability tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageClassifier {
    critical: TierPolicy,
    important: TierPolicy,
    transient: TierPolicy,
}

impl Default for StorageClassifier {
    fn default() -> Self {
        Self {
            critical: TierPolicy::default_for(DataPriority::Critical),
            important: TierPolicy::default_for(DataPriority::Important),
            transient: TierPolicy::default_for(DataPriority::Transient),
        }
    }
}

impl StorageClassifier {
    /// Build a classifier with per-tier overrides applied to the defaults.
    pub fn with_overrides(
        critical: &TierOverrides,
        important: &TierOverrides,
        transient: &TierOverrides,
    ) -> Self {
        let defaults = Self::default();
        Self {
            critical: critical.apply(defaults.critical),
            important: important.apply(defaults.important),
            transient: transient.apply(defaults.transient),
        }
    }

    /// Tier for a field mutation. Unknown fields are `Important`.
    pub const fn classify(&self, kind: &MutationKind) -> DataPriority {
        match kind {
            MutationKind::Level
            | MutationKind::Experience
            | MutationKind::Coins
            | MutationKind::Items => DataPriority::Critical,
            MutationKind::TempBuff | MutationKind::Mood | MutationKind::Session => {
                DataPriority::Transient
            }
            MutationKind::Health
            | MutationKind::MaxHealth
            | MutationKind::Energy
            | MutationKind::Hunger
            | MutationKind::Social
            | MutationKind::Location
            | MutationKind::Status
            | MutationKind::Friends
            | MutationKind::Memory
            | MutationKind::Other(_) => DataPriority::Important,
        }
    }

    /// Tier for a set of changes made together: the highest tier among
    /// their fields, or `Critical` if any change killed the agent.
    pub fn classify_changes(&self, changes: &[StateChange]) -> DataPriority {
        if changes.iter().any(|change| change.is_critical) {
            return DataPriority::Critical;
        }
        changes
            .iter()
            .map(|change| self.classify(&change.field))
            .max()
            .unwrap_or(DataPriority::Transient)
    }

    /// Tier for an event.
    pub const fn classify_event(&self, kind: EventKind) -> DataPriority {
        match kind {
            EventKind::RareFind | EventKind::LevelUp | EventKind::Death => DataPriority::Critical,
            EventKind::Social | EventKind::Debug => DataPriority::Transient,
            EventKind::Born
            | EventKind::Explore
            | EventKind::Battle
            | EventKind::Discovery
            | EventKind::Reward
            | EventKind::Starvation => DataPriority::Important,
        }
    }

    /// Policy for a tier.
    pub const fn policy_for(&self, priority: DataPriority) -> TierPolicy {
        match priority {
            DataPriority::Critical => self.critical,
            DataPriority::Important => self.important,
            DataPriority::Transient => self.transient,
        }
    }
}
