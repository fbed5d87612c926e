//! In-process TTL cache split into categories.
//!
//! Each category is a [`CategoryCache`] backed by a [`DashMap`], so an
//! expiry check or eviction only locks the map shard holding the key.
//! Expired entries are removed lazily on `get` and eagerly by a periodic
//! sweep task per category.
//!
//! | Category | Default TTL | Sweep |
//! |----------|-------------|-------|
//! | agents | 30 min | 10 min |
//! | events | 5 min | 1 min |
//! | live state | 2 min | 30 s |
//! | stats | 15 min | 5 min |

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use menagerie_types::{Agent, AgentId, Event, StateChange};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Key for an agent record.
pub fn agent_key(id: AgentId) -> String {
    format!("agent:{id}")
}

/// Key for an owner-to-agent lookup.
pub fn owner_key(owner: &str) -> String {
    format!("agent:owner:{owner}")
}

/// Key for the global recent events list.
pub const RECENT_EVENTS_KEY: &str = "recent_events";

/// Key for one agent's recent events.
pub fn agent_events_key(id: AgentId) -> String {
    format!("events:agent:{id}")
}

/// Key for one agent's live-state changes.
pub fn state_key(id: AgentId) -> String {
    format!("state:{id}")
}

/// Key for a named statistic.
pub fn stats_key(name: &str) -> String {
    format!("stats:{name}")
}

/// TTL and sweep cadence for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryConfig {
    /// Default time-to-live for entries set with `Duration::ZERO`.
    pub default_ttl: Duration,
    /// How often the sweeper scans for expired entries.
    pub sweep_interval: Duration,
}

impl CategoryConfig {
    /// Build a category config from seconds.
    pub const fn from_secs(default_ttl: u64, sweep_interval: u64) -> Self {
        Self {
            default_ttl: Duration::from_secs(default_ttl),
            sweep_interval: Duration::from_secs(sweep_interval),
        }
    }
}

/// Cache settings for every category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Agent records and owner lookups.
    pub agents: CategoryConfig,
    /// Recent event lists.
    pub events: CategoryConfig,
    /// Live-state change lists.
    pub live_state: CategoryConfig,
    /// Computed statistics.
    pub stats: CategoryConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            agents: CategoryConfig::from_secs(30 * 60, 10 * 60),
            events: CategoryConfig::from_secs(5 * 60, 60),
            live_state: CategoryConfig::from_secs(2 * 60, 30),
            stats: CategoryConfig::from_secs(15 * 60, 5 * 60),
        }
    }
}

/// Hit and miss counters for one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently stored, including expired ones not yet swept.
    pub count: usize,
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0 before any lookup.
    pub hit_rate: f64,
}

impl CacheStats {
    /// Build stats from raw counters.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(count: usize, hits: u64, misses: u64) -> Self {
        let total = hits.saturating_add(misses);
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        Self {
            count,
            hits,
            misses,
            hit_rate,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// One cache category.
#[derive(Debug)]
pub struct CategoryCache<V> {
    name: &'static str,
    config: CategoryConfig,
    entries: DashMap<String, CacheEntry<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> CategoryCache<V> {
    /// Create an empty category.
    pub fn new(name: &'static str, config: CategoryConfig) -> Self {
        Self {
            name,
            config,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Category name, used in logs and stats.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Store `value` under `key`. A zero `ttl` uses the category default.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let ttl = if ttl.is_zero() { self.config.default_ttl } else { ttl };
        let entry = CacheEntry {
            value,
            expires_at: Instant::now().checked_add(ttl),
        };
        self.entries.insert(key.into(), entry);
    }

    /// Store `value` under `key` with no expiry.
    pub fn set_forever(&self, key: impl Into<String>, value: V) {
        let entry = CacheEntry {
            value,
            expires_at: None,
        };
        self.entries.insert(key.into(), entry);
    }

    /// Look up `key`. An expired entry is evicted and counts as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let found = self.entries.get(key).and_then(|entry| {
            (!entry.is_expired(now)).then(|| entry.value.clone())
        });

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats::from_counts(
            self.entries.len(),
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl<V: Clone + Send + Sync + 'static> CategoryCache<V> {
    /// Spawn the periodic sweep for this category onto `tracker`.
    pub fn spawn_sweeper(self: &Arc<Self>, tracker: &TaskTracker, token: CancellationToken) {
        let cache = Arc::clone(self);
        tracker.spawn(async move {
            let period = cache.config.sweep_interval.max(Duration::from_millis(1));
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            tracing::debug!(category = cache.name, removed, "Swept expired cache entries");
                        }
                    }
                }
            }
        });
    }
}

/// Statistics for every category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TieredCacheStats {
    /// Agent category.
    pub agents: CacheStats,
    /// Events category.
    pub events: CacheStats,
    /// Live-state category.
    pub live_state: CacheStats,
    /// Stats category.
    pub stats: CacheStats,
}

/// The four cache categories used by the simulation.
#[derive(Debug, Clone)]
pub struct TieredCache {
    /// Agent records by `agent:{id}`.
    pub agents: Arc<CategoryCache<Agent>>,
    /// Owner lookups by `agent:owner:{owner}`.
    pub owners: Arc<CategoryCache<AgentId>>,
    /// Recent events by `recent_events` and `events:agent:{id}`.
    pub events: Arc<CategoryCache<Vec<Event>>>,
    /// Live-state changes by `state:{id}`.
    pub live_state: Arc<CategoryCache<Vec<StateChange>>>,
    /// Computed statistics by `stats:{key}`.
    pub stats: Arc<CategoryCache<serde_json::Value>>,
}

impl TieredCache {
    /// Create empty categories with the given settings.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            agents: Arc::new(CategoryCache::new("agents", config.agents)),
            owners: Arc::new(CategoryCache::new("owners", config.agents)),
            events: Arc::new(CategoryCache::new("events", config.events)),
            live_state: Arc::new(CategoryCache::new("live_state", config.live_state)),
            stats: Arc::new(CategoryCache::new("stats", config.stats)),
        }
    }

    /// Cache an agent record and its owner lookup.
    pub fn put_agent(&self, agent: &Agent) {
        self.agents.set(agent_key(agent.id), agent.clone(), Duration::ZERO);
        self.owners.set(owner_key(&agent.owner), agent.id, Duration::ZERO);
    }

    /// Append live-state changes for one agent, keeping the most recent
    /// `limit`.
    pub fn push_live_state(&self, id: AgentId, changes: &[StateChange], ttl: Duration, limit: usize) {
        let key = state_key(id);
        let mut current = self
            .live_state
            .entries
            .get(&key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.clone())
            .unwrap_or_default();
        current.extend_from_slice(changes);
        let excess = current.len().saturating_sub(limit);
        current.drain(..excess);
        self.live_state.set(key, current, ttl);
    }

    /// Spawn one sweeper per category.
    pub fn spawn_sweepers(&self, tracker: &TaskTracker, token: &CancellationToken) {
        self.agents.spawn_sweeper(tracker, token.child_token());
        self.owners.spawn_sweeper(tracker, token.child_token());
        self.events.spawn_sweeper(tracker, token.child_token());
        self.live_state.spawn_sweeper(tracker, token.child_token());
        self.stats.spawn_sweeper(tracker, token.child_token());
    }

    /// Empty every category.
    pub fn clear_all(&self) {
        self.agents.clear();
        self.owners.clear();
        self.events.clear();
        self.live_state.clear();
        self.stats.clear();
    }

    /// Pre-populate agents and the recent events list.
    pub fn warmup(&self, agents: &[Agent], recent_events: Vec<Event>) {
        for agent in agents {
            self.put_agent(agent);
        }
        self.events.set(RECENT_EVENTS_KEY, recent_events, Duration::ZERO);
        tracing::info!(agents = agents.len(), "Cache warmed up");
    }

    /// Counters for every category. Owner lookups count toward `agents`.
    pub fn stats(&self) -> TieredCacheStats {
        let records = self.agents.stats();
        let owners = self.owners.stats();

        TieredCacheStats {
            agents: CacheStats::from_counts(
                records.count.saturating_add(owners.count),
                records.hits.saturating_add(owners.hits),
                records.misses.saturating_add(owners.misses),
            ),
            events: self.events.stats(),
            live_state: self.live_state.stats(),
            stats: self.stats.stats(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cache() -> CategoryCache<u32> {
        CategoryCache::new("test", CategoryConfig::from_secs(60, 10))
    }

    #[tokio::test(start_paused = true)]
    async fn hit_before_ttl_miss_after() {
        let cache = cache();
        cache.set("k", 7, Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get("k"), Some(7));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.count, 0);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_uses_category_default() {
        let cache = cache();
        cache.set("k", 1, Duration::ZERO);
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("k"), Some(1));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn forever_entries_survive_sweeps() {
        let cache = cache();
        cache.set_forever("keep", 1);
        cache.set("drop", 2, Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(3600)).await;

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.get("keep"), Some(1));
        assert_eq!(cache.stats().count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn every_get_moves_exactly_one_counter() {
        let cache = cache();
        cache.set("a", 1, Duration::ZERO);
        for _ in 0..3 {
            cache.get("a");
        }
        for _ in 0..2 {
            cache.get("missing");
        }
        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let cache = cache();
        cache.set("a", 1, Duration::ZERO);
        cache.set("b", 2, Duration::ZERO);
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        cache.clear();
        assert_eq!(cache.stats().count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_on_its_cadence() {
        let cache = Arc::new(cache());
        let tracker = TaskTracker::new();
        let token = CancellationToken::new();
        cache.spawn_sweeper(&tracker, token.clone());
        cache.set("k", 1, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(cache.stats().count, 0);

        token.cancel();
        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test]
    async fn live_state_keeps_most_recent() {
        let cache = TieredCache::new(CacheConfig::default());
        let id = AgentId::new();
        let change = |n: u32| {
            StateChange::new(
                id,
                menagerie_types::MutationKind::Energy,
                n.into(),
                n.saturating_add(1).into(),
            )
        };
        cache.push_live_state(id, &[change(1), change(2)], Duration::ZERO, 2);
        cache.push_live_state(id, &[change(3)], Duration::ZERO, 2);
        let stored = cache.live_state.get(&state_key(id)).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.last().unwrap().old, 3u32.into());
    }

    #[test]
    fn key_formats() {
        let id = AgentId::new();
        assert_eq!(agent_key(id), format!("agent:{id}"));
        assert_eq!(owner_key("alice"), "agent:owner:alice");
        assert_eq!(agent_events_key(id), format!("events:agent:{id}"));
        assert_eq!(stats_key("system"), "stats:system");
    }

    #[test]
    fn categories_are_named_for_what_they_hold() {
        let cache = TieredCache::new(CacheConfig::default());
        let names = [
            cache.agents.name(),
            cache.owners.name(),
            cache.events.name(),
            cache.live_state.name(),
            cache.stats.name(),
        ];
        assert_eq!(names, ["agents", "owners", "events", "live_state", "stats"]);
    }
}
