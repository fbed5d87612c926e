//! In-memory agents and the recent event log.
//!
//! [`EntityStore`] owns the live [`Agent`] records inside a
//! [`ShardedLock`] plus an owner index. Every mutation happens under the
//! write lock of the agent's shard; callers pass a synchronous closure so
//! no lock is ever held across an `.await` point.
//!
//! [`EventLog`] keeps the most recent events, collapses duplicates that
//! arrive within the dedup window, and forwards accepted events to an
//! optional fan-out channel without ever waiting on it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use menagerie_types::{Agent, AgentId, Event, EventKind};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::Instant;

use crate::config::EventsConfig;
use crate::error::CoreError;
use crate::lock::{LockStats, ShardedLock};

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Live agent records and their recent events.
#[derive(Debug)]
pub struct EntityStore {
    agents: ShardedLock<Agent>,
    owners: RwLock<HashMap<String, AgentId>>,
    events: EventLog,
}

impl EntityStore {
    /// Create an empty store with `shards` lock shards.
    pub fn new(shards: usize, events: EventLog) -> Self {
        Self {
            agents: ShardedLock::new(shards),
            owners: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Snapshot of one agent.
    pub async fn get(&self, id: AgentId) -> Option<Agent> {
        self.agents.read(id).await.get(&id).cloned()
    }

    /// Id of the agent belonging to `owner`.
    pub async fn owner_id(&self, owner: &str) -> Option<AgentId> {
        self.owners.read().await.get(owner).copied()
    }

    /// Insert or replace an agent record.
    pub async fn put(&self, agent: Agent) {
        let id = agent.id;
        self.owners.write().await.insert(agent.owner.clone(), id);
        self.agents.write(id).await.insert(id, agent);
    }

    /// Insert a brand-new agent, reserving its owner.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateOwner`] if the owner already has an
    /// agent in memory.
    pub async fn insert_new(&self, agent: Agent) -> Result<(), CoreError> {
        let mut owners = self.owners.write().await;
        if owners.contains_key(&agent.owner) {
            return Err(CoreError::DuplicateOwner(agent.owner));
        }
        owners.insert(agent.owner.clone(), agent.id);
        let id = agent.id;
        self.agents.write(id).await.insert(id, agent);
        Ok(())
    }

    /// Remove an agent and its owner entry.
    pub async fn remove(&self, id: AgentId) -> Option<Agent> {
        let removed = self.agents.write(id).await.remove(&id);
        if let Some(agent) = &removed {
            self.owners.write().await.remove(&agent.owner);
        }
        removed
    }

    /// Run `f` on one agent under its shard's write lock.
    ///
    /// Returns `None` if the agent does not exist.
    pub async fn with_agent_mut<R>(&self, id: AgentId, f: impl FnOnce(&mut Agent) -> R) -> Option<R> {
        let mut shard = self.agents.write(id).await;
        shard.get_mut(&id).map(f)
    }

    /// Visit every agent under read locks, one shard at a time.
    pub async fn for_each(&self, mut f: impl FnMut(&Agent)) {
        for index in 0..self.agents.shard_count() {
            let shard = self.agents.read_shard(index).await;
            shard.values().for_each(&mut f);
        }
    }

    /// Mutate every agent under write locks, one shard at a time, and
    /// collect whatever `f` reports.
    pub async fn for_each_mut<R>(&self, mut f: impl FnMut(&mut Agent) -> Option<R>) -> Vec<R> {
        let mut reports = Vec::new();
        for index in 0..self.agents.shard_count() {
            let mut shard = self.agents.write_shard(index).await;
            reports.extend(shard.values_mut().filter_map(&mut f));
        }
        reports
    }

    /// Snapshot of every agent, oldest first.
    pub async fn snapshot(&self) -> Vec<Agent> {
        let mut agents = Vec::new();
        self.for_each(|a| agents.push(a.clone())).await;
        agents.sort_by_key(|a| (a.created_at, a.id));
        agents
    }

    /// First living agent other than `exclude`, oldest first.
    ///
    /// Only the match is cloned. It is re-read after the scan, so an agent
    /// that died in between is passed over.
    pub async fn first_other_alive(&self, exclude: AgentId) -> Option<Agent> {
        let mut oldest = None;
        self.for_each(|a| {
            if a.id != exclude && a.is_alive() {
                let key = (a.created_at, a.id);
                if oldest.is_none_or(|best| key < best) {
                    oldest = Some(key);
                }
            }
        })
        .await;
        let (_, id) = oldest?;
        self.get(id).await.filter(Agent::is_alive)
    }

    /// Number of agents.
    pub async fn len(&self) -> usize {
        self.owners.read().await.len()
    }

    /// Whether the store holds no agents.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Lock counters.
    pub fn lock_stats(&self) -> LockStats {
        self.agents.stats()
    }

    /// The event log.
    pub const fn events(&self) -> &EventLog {
        &self.events
    }

    /// Append an event unless it duplicates a recent one.
    pub async fn append_event(&self, event: Event) -> bool {
        self.events.append(event).await
    }

    /// Most recent events, newest first.
    pub async fn recent_events(&self, limit: usize) -> Vec<Event> {
        self.events.recent(limit).await
    }

    /// Most recent events for one agent, newest first.
    pub async fn events_for(&self, id: AgentId, limit: usize) -> Vec<Event> {
        self.events.for_agent(id, limit).await
    }

    /// Forget stale dedup fingerprints.
    pub async fn purge_fingerprints(&self) -> usize {
        self.events.purge_fingerprints().await
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The identity used to collapse duplicate events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Fingerprint {
    agent_id: AgentId,
    kind: EventKind,
    message: String,
    coins: i64,
}

impl Fingerprint {
    fn of(event: &Event) -> Self {
        Self {
            agent_id: event.agent_id,
            kind: event.kind,
            message: event.message.clone(),
            coins: event.payload.coins,
        }
    }
}

#[derive(Debug, Default)]
struct LogState {
    entries: VecDeque<Event>,
    fingerprints: HashMap<Fingerprint, Instant>,
}

/// Recent events with dedup and fan-out.
#[derive(Debug)]
pub struct EventLog {
    state: Mutex<LogState>,
    dedup_window: Duration,
    fingerprint_ttl: Duration,
    capacity: usize,
    trim_batch: usize,
    fanout: Option<mpsc::Sender<Event>>,
    dropped: AtomicU64,
    deduplicated: AtomicU64,
}

impl EventLog {
    /// Create a log. Accepted events are also sent to `fanout` if given.
    pub fn new(config: &EventsConfig, fanout: Option<mpsc::Sender<Event>>) -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            dedup_window: Duration::from_secs(config.dedup_window_secs),
            fingerprint_ttl: Duration::from_secs(config.fingerprint_ttl_secs),
            capacity: config.log_capacity.max(1),
            trim_batch: config.trim_batch.max(1),
            fanout,
            dropped: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
        }
    }

    /// Append `event` unless an identical one was seen within the dedup
    /// window. Returns whether it was appended.
    pub async fn append(&self, event: Event) -> bool {
        let now = Instant::now();
        let fingerprint = Fingerprint::of(&event);
        let mut state = self.state.lock().await;

        let duplicate = state
            .fingerprints
            .get(&fingerprint)
            .is_some_and(|seen| now.saturating_duration_since(*seen) < self.dedup_window);
        if duplicate {
            self.deduplicated.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(agent_id = %event.agent_id, kind = event.kind.as_str(), "Duplicate event dropped");
            return false;
        }
        state.fingerprints.insert(fingerprint, now);

        let undelivered = self
            .fanout
            .as_ref()
            .is_some_and(|tx| tx.try_send(event.clone()).is_err());
        if undelivered {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }

        state.entries.push_back(event);
        if state.entries.len() > self.capacity {
            let trim = self.trim_batch.min(state.entries.len());
            state.entries.drain(..trim);
        }
        true
    }

    /// Most recent events, newest first. `limit` is capped at the log
    /// capacity.
    pub async fn recent(&self, limit: usize) -> Vec<Event> {
        let state = self.state.lock().await;
        state
            .entries
            .iter()
            .rev()
            .take(limit.min(self.capacity))
            .cloned()
            .collect()
    }

    /// Most recent events for one agent, newest first.
    pub async fn for_agent(&self, id: AgentId, limit: usize) -> Vec<Event> {
        let state = self.state.lock().await;
        state
            .entries
            .iter()
            .rev()
            .filter(|e| e.agent_id == id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Forget fingerprints older than the fingerprint TTL. Returns how many
    /// were removed.
    pub async fn purge_fingerprints(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let before = state.fingerprints.len();
        let ttl = self.fingerprint_ttl;
        state
            .fingerprints
            .retain(|_, seen| now.saturating_duration_since(*seen) < ttl);
        before.saturating_sub(state.fingerprints.len())
    }

    /// Events currently held.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Whether the log is empty.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Events that could not be forwarded to the fan-out channel.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Events collapsed as duplicates.
    pub fn deduplicated(&self) -> u64 {
        self.deduplicated.load(Ordering::Relaxed)
    }
}
