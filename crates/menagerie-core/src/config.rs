//! Configuration loading and typed config structures for the Menagerie simulation.
//!
//! The configuration lives in `menagerie.yaml`. This module defines
//! strongly-typed structs that mirror the YAML structure and a loader that
//! reads the file. Every section and every key is optional; missing values
//! take the defaults documented on each field.

use std::path::Path;
use std::time::Duration;

use menagerie_agents::VitalsConfig;
use menagerie_db::cache::{CacheConfig, CategoryConfig};
use menagerie_db::{StorageClassifier, TierOverrides};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Loop cadences.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Durability tier overrides and retention.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Cache TTLs and sweep cadences.
    #[serde(default)]
    pub cache: CacheSettings,

    /// In-memory event log and dedup.
    #[serde(default)]
    pub events: EventsConfig,

    /// Agent vitals, decay, and levelling.
    #[serde(default)]
    pub vitals: VitalsConfig,

    /// Database connection.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Seed for the simulation RNG. Unset means seeded from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `DATABASE_URL` overrides `infrastructure.postgres_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        let mut config = Self::default();
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }
}

/// Loop cadences.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between decisions for each agent.
    #[serde(default = "default_decision_interval_secs")]
    pub decision_interval_secs: u64,

    /// Seconds between global decay ticks.
    #[serde(default = "default_decay_interval_secs")]
    pub decay_interval_secs: u64,

    /// Seconds between maintenance passes (dedup purge, event retention).
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,

    /// Lock shards for the agent store, rounded up to a power of two.
    #[serde(default = "default_lock_shards")]
    pub lock_shards: usize,
}

impl SchedulerConfig {
    /// Decision cadence.
    pub const fn decision_interval(&self) -> Duration {
        secs_at_least_one(self.decision_interval_secs)
    }

    /// Decay cadence.
    pub const fn decay_interval(&self) -> Duration {
        secs_at_least_one(self.decay_interval_secs)
    }

    /// Maintenance cadence.
    pub const fn maintenance_interval(&self) -> Duration {
        secs_at_least_one(self.maintenance_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            decision_interval_secs: default_decision_interval_secs(),
            decay_interval_secs: default_decay_interval_secs(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            lock_shards: default_lock_shards(),
        }
    }
}

/// Durability tier overrides and retention.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Overrides for the critical tier.
    #[serde(default)]
    pub critical: TierOverrides,

    /// Overrides for the important tier.
    #[serde(default)]
    pub important: TierOverrides,

    /// Overrides for the transient tier.
    #[serde(default)]
    pub transient: TierOverrides,

    /// Persisted events older than this many days are pruned.
    #[serde(default = "default_event_retention_days")]
    pub event_retention_days: u32,

    /// Live-state changes kept per agent in the cache.
    #[serde(default = "default_live_state_limit")]
    pub live_state_limit: usize,
}

impl StorageConfig {
    /// Classifier with this section's overrides applied.
    pub fn classifier(&self) -> StorageClassifier {
        StorageClassifier::with_overrides(&self.critical, &self.important, &self.transient)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            critical: TierOverrides::default(),
            important: TierOverrides::default(),
            transient: TierOverrides::default(),
            event_retention_days: default_event_retention_days(),
            live_state_limit: default_live_state_limit(),
        }
    }
}

/// Cache TTLs and sweep cadences, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheSettings {
    /// Agent record TTL.
    #[serde(default = "default_agents_ttl_secs")]
    pub agents_ttl_secs: u64,
    /// Agent sweep cadence.
    #[serde(default = "default_agents_sweep_secs")]
    pub agents_sweep_secs: u64,
    /// Event list TTL.
    #[serde(default = "default_events_ttl_secs")]
    pub events_ttl_secs: u64,
    /// Event sweep cadence.
    #[serde(default = "default_events_sweep_secs")]
    pub events_sweep_secs: u64,
    /// Live-state TTL.
    #[serde(default = "default_live_state_ttl_secs")]
    pub live_state_ttl_secs: u64,
    /// Live-state sweep cadence.
    #[serde(default = "default_live_state_sweep_secs")]
    pub live_state_sweep_secs: u64,
    /// Stats TTL.
    #[serde(default = "default_stats_ttl_secs")]
    pub stats_ttl_secs: u64,
    /// Stats sweep cadence.
    #[serde(default = "default_stats_sweep_secs")]
    pub stats_sweep_secs: u64,
}

impl CacheSettings {
    /// Convert to the cache's own config type.
    pub const fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            agents: CategoryConfig::from_secs(self.agents_ttl_secs, self.agents_sweep_secs),
            events: CategoryConfig::from_secs(self.events_ttl_secs, self.events_sweep_secs),
            live_state: CategoryConfig::from_secs(self.live_state_ttl_secs, self.live_state_sweep_secs),
            stats: CategoryConfig::from_secs(self.stats_ttl_secs, self.stats_sweep_secs),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            agents_ttl_secs: default_agents_ttl_secs(),
            agents_sweep_secs: default_agents_sweep_secs(),
            events_ttl_secs: default_events_ttl_secs(),
            events_sweep_secs: default_events_sweep_secs(),
            live_state_ttl_secs: default_live_state_ttl_secs(),
            live_state_sweep_secs: default_live_state_sweep_secs(),
            stats_ttl_secs: default_stats_ttl_secs(),
            stats_sweep_secs: default_stats_sweep_secs(),
        }
    }
}

/// In-memory event log and dedup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventsConfig {
    /// Identical events within this many seconds collapse into one.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// Fingerprints older than this many seconds are purged.
    #[serde(default = "default_fingerprint_ttl_secs")]
    pub fingerprint_ttl_secs: u64,

    /// Maximum events held in memory.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// How many of the oldest events to drop when the log overflows.
    #[serde(default = "default_trim_batch")]
    pub trim_batch: usize,

    /// Capacity of the event fan-out channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window_secs(),
            fingerprint_ttl_secs: default_fingerprint_ttl_secs(),
            log_capacity: default_log_capacity(),
            trim_batch: default_trim_batch(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Database connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// `PostgreSQL` connection string. Unset runs on the in-memory
    /// repository.
    #[serde(default)]
    pub postgres_url: Option<String>,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl InfrastructureConfig {
    /// Override the database URL with `DATABASE_URL` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Some(val) = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()) {
            self.postgres_url = Some(val);
        }
    }
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

const fn secs_at_least_one(secs: u64) -> Duration {
    Duration::from_secs(if secs == 0 { 1 } else { secs })
}

const fn default_decision_interval_secs() -> u64 {
    15
}
const fn default_decay_interval_secs() -> u64 {
    30
}
const fn default_maintenance_interval_secs() -> u64 {
    60
}
const fn default_lock_shards() -> usize {
    crate::lock::DEFAULT_SHARDS
}
const fn default_event_retention_days() -> u32 {
    30
}
const fn default_live_state_limit() -> usize {
    50
}
const fn default_agents_ttl_secs() -> u64 {
    30 * 60
}
const fn default_agents_sweep_secs() -> u64 {
    10 * 60
}
const fn default_events_ttl_secs() -> u64 {
    5 * 60
}
const fn default_events_sweep_secs() -> u64 {
    60
}
const fn default_live_state_ttl_secs() -> u64 {
    2 * 60
}
const fn default_live_state_sweep_secs() -> u64 {
    30
}
const fn default_stats_ttl_secs() -> u64 {
    15 * 60
}
const fn default_stats_sweep_secs() -> u64 {
    5 * 60
}
const fn default_dedup_window_secs() -> u64 {
    15
}
const fn default_fingerprint_ttl_secs() -> u64 {
    60
}
const fn default_log_capacity() -> usize {
    1000
}
const fn default_trim_batch() -> usize {
    100
}
const fn default_channel_capacity() -> usize {
    256
}
const fn default_max_connections() -> u32 {
    10
}
fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SimulationConfig::default();
        assert_eq!(config.scheduler.decision_interval(), Duration::from_secs(15));
        assert_eq!(config.scheduler.decay_interval(), Duration::from_secs(30));
        assert_eq!(config.events.dedup_window_secs, 15);
        assert_eq!(config.events.log_capacity, 1000);
        assert_eq!(config.cache.to_cache_config(), CacheConfig::default());
        assert_eq!(config.storage.classifier(), StorageClassifier::default());
        assert_eq!(config.vitals.starting_health, 100);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn parse_partial_yaml() {
        let yaml = r"
scheduler:
  decision_interval_secs: 5
storage:
  important:
    batch_size: 10
    flush_interval_ms: 500
  event_retention_days: 7
events:
  dedup_window_secs: 20
vitals:
  starting_hunger: 60
logging:
  level: debug
  json: true
seed: 7
";
        let config = SimulationConfig::parse(yaml).unwrap();
        assert_eq!(config.scheduler.decision_interval_secs, 5);
        assert_eq!(config.scheduler.decay_interval_secs, 30);
        assert_eq!(config.storage.important.batch_size, Some(10));
        assert_eq!(config.storage.event_retention_days, 7);
        assert_eq!(config.events.dedup_window_secs, 20);
        assert_eq!(config.events.trim_batch, 100);
        assert_eq!(config.vitals.starting_hunger, 60);
        assert_eq!(config.vitals.starting_energy, 100);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn empty_yaml_is_all_defaults() {
        let config = SimulationConfig::parse("{}").unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.cache, CacheSettings::default());
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let scheduler = SchedulerConfig {
            decision_interval_secs: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(scheduler.decision_interval(), Duration::from_secs(1));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = SimulationConfig::parse("scheduler: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("menagerie-config-that-does-not-exist.yaml");
        let config = SimulationConfig::load_or_default(&path);
        assert!(config.is_ok());
    }
}
