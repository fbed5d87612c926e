//! The simulation service handle.
//!
//! [`Simulation`] wires a [`ServiceContext`] to an [`ActionScheduler`] and
//! exposes the operations a transport layer calls: creating agents,
//! reading snapshots, running commands, and reading events and stats.
//! There are no globals; every task is spawned on the simulation's own
//! [`TaskTracker`] under its root cancellation token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use menagerie_agents::spawn_agent;
use menagerie_db::cache::{RECENT_EVENTS_KEY, agent_events_key, agent_key, owner_key, stats_key};
use menagerie_db::{DbError, PipelineStats, Repository, TieredCacheStats};
use menagerie_types::{Agent, AgentId, AgentStatus, Event, EventKind, EventPayload};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::command::{Command, CommandOutcome};
use crate::config::SimulationConfig;
use crate::context::ServiceContext;
use crate::decision::{DecisionSource, WeightedDecisionEngine};
use crate::error::CoreError;
use crate::lock::LockStats;
use crate::scheduler::ActionScheduler;

/// Aggregate counters for the whole simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    /// Agents in memory.
    pub agents: usize,
    /// Agents still alive.
    pub alive: usize,
    /// Running agent loops.
    pub active_loops: usize,
    /// Completions waiting on their timer.
    pub pending_completions: usize,
    /// Events held in the log.
    pub events: usize,
    /// Events the fan-out channel could not take.
    pub dropped_events: u64,
    /// Events collapsed as duplicates.
    pub deduplicated_events: u64,
    /// Cache counters per category.
    pub cache: TieredCacheStats,
    /// Write pipeline counters per tier.
    pub tiers: PipelineStats,
    /// Agent lock counters.
    pub locks: LockStats,
    /// Repository backend name.
    pub backend: &'static str,
}

/// Owner handle for a running simulation.
#[derive(Debug)]
pub struct Simulation {
    ctx: Arc<ServiceContext>,
    scheduler: Arc<ActionScheduler>,
    tracker: TaskTracker,
    event_stream: Mutex<Option<mpsc::Receiver<Event>>>,
    started: AtomicBool,
}

impl Simulation {
    /// Create a simulation using the weighted decision engine.
    pub fn new(config: SimulationConfig, repository: Repository) -> Self {
        Self::with_decisions(config, repository, Arc::new(WeightedDecisionEngine::new()))
    }

    /// Create a simulation with a custom decision source.
    pub fn with_decisions(
        config: SimulationConfig,
        repository: Repository,
        decisions: Arc<dyn DecisionSource>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.events.channel_capacity.max(1));
        let ctx = Arc::new(ServiceContext::new(config, repository, Some(tx)));
        let tracker = TaskTracker::new();
        let scheduler = Arc::new(ActionScheduler::new(Arc::clone(&ctx), decisions, tracker.clone()));
        Self {
            ctx,
            scheduler,
            tracker,
            event_stream: Mutex::new(Some(rx)),
            started: AtomicBool::new(false),
        }
    }

    /// The shared context.
    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    /// The scheduler.
    pub const fn scheduler(&self) -> &Arc<ActionScheduler> {
        &self.scheduler
    }

    /// Take the receiving end of the event fan-out. Returns `None` after
    /// the first call.
    pub fn take_event_stream(&self) -> Option<mpsc::Receiver<Event>> {
        self.event_stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Load agents, warm the cache and start every background task.
    ///
    /// Agents that were persisted mid-action come back idle, since their
    /// completions did not survive the restart. Returns the number of
    /// agent loops started. Calling `start` twice starts nothing.
    pub async fn start(&self) -> Result<usize, CoreError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }

        let mut agents = self.ctx.repository.list_all().await?;
        for agent in &mut agents {
            if agent.is_alive() && agent.status != AgentStatus::Idle {
                agent.status = AgentStatus::Idle;
            }
        }
        let events = self
            .ctx
            .repository
            .recent_events(self.ctx.config.events.log_capacity)
            .await?;
        self.ctx.cache.warmup(&agents, events);
        for agent in &agents {
            self.ctx.store.put(agent.clone()).await;
        }

        self.ctx.pipeline.start(&self.tracker, &self.ctx.token);
        self.ctx.cache.spawn_sweepers(&self.tracker, &self.ctx.token);
        self.scheduler.spawn_global_loops();

        let living = agents
            .iter()
            .filter(|agent| agent.is_alive())
            .filter(|agent| self.scheduler.spawn_agent_loop(agent.id))
            .count();

        info!(
            agents = agents.len(),
            living,
            backend = self.ctx.repository.name(),
            "Simulation started"
        );
        Ok(living)
    }

    /// Cancel every task, wait for them to finish, and flush every tier.
    pub async fn shutdown(&self) {
        info!("Shutting down simulation");
        self.ctx.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        let tiers = self.ctx.pipeline.stats();
        info!(
            critical = tiers.critical.processed,
            important = tiers.important.processed,
            transient = tiers.transient.processed,
            "Simulation stopped"
        );
    }

    /// Create an agent for `owner` and start its loop.
    ///
    /// The owner is reserved in memory first, then the record is written
    /// synchronously. A failed write releases the reservation.
    pub async fn create_agent(&self, owner: &str) -> Result<Agent, CoreError> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(CoreError::EmptyOwner);
        }
        if self.ctx.store.owner_id(owner).await.is_some()
            || self.ctx.repository.get_by_owner(owner).await?.is_some()
        {
            return Err(CoreError::DuplicateOwner(owner.to_owned()));
        }

        let agent = spawn_agent(owner, &self.ctx.config.vitals)?;
        self.ctx.store.insert_new(agent.clone()).await?;
        if let Err(err) = self.ctx.repository.create_record(&agent).await {
            self.ctx.store.remove(agent.id).await;
            return Err(match err {
                DbError::Conflict(_) => CoreError::DuplicateOwner(owner.to_owned()),
                other => other.into(),
            });
        }
        self.ctx.cache.put_agent(&agent);

        let message = format!("[{}] was born! Ready to explore the world...", agent.name);
        let born = Event::new(&agent, EventKind::Born, message).with_payload(EventPayload {
            location: Some(agent.location.clone()),
            ..EventPayload::default()
        });
        self.ctx.record_event(born).await;

        if self.started.load(Ordering::SeqCst) {
            self.scheduler.spawn_agent_loop(agent.id);
        }
        info!(agent_id = %agent.id, owner, name = %agent.name, personality = agent.personality.as_str(), "Agent created");
        Ok(agent)
    }

    /// Snapshot of one agent.
    pub async fn get_agent(&self, id: AgentId) -> Result<Agent, CoreError> {
        if let Some(agent) = self.ctx.cache.agents.get(&agent_key(id)) {
            return Ok(agent);
        }
        let agent = self.ctx.store.get(id).await.ok_or(CoreError::AgentNotFound(id))?;
        self.ctx.cache.put_agent(&agent);
        Ok(agent)
    }

    /// Snapshot of the agent belonging to `owner`, falling back to the
    /// repository for agents not loaded in memory.
    pub async fn agent_by_owner(&self, owner: &str) -> Result<Agent, CoreError> {
        let cached = self.ctx.cache.owners.get(&owner_key(owner));
        let id = match cached {
            Some(id) => Some(id),
            None => self.ctx.store.owner_id(owner).await,
        };
        if let Some(id) = id {
            return self.get_agent(id).await;
        }

        self.ctx
            .repository
            .get_by_owner(owner)
            .await?
            .ok_or_else(|| CoreError::OwnerNotFound(owner.to_owned()))
    }

    /// Snapshots of every agent, oldest first.
    pub async fn list_agents(&self) -> Vec<Agent> {
        self.ctx.store.snapshot().await
    }

    /// Parse and run a named command.
    pub async fn execute_command(&self, id: AgentId, name: &str, params: &Value) -> Result<CommandOutcome, CoreError> {
        let command = Command::parse(name, params)?;
        self.execute(id, command).await
    }

    /// Run a parsed command.
    pub async fn execute(&self, id: AgentId, command: Command) -> Result<CommandOutcome, CoreError> {
        self.scheduler.execute(id, command).await
    }

    /// Cancel an agent's in-flight action and return it to idle.
    pub async fn interrupt(&self, id: AgentId) -> Result<Agent, CoreError> {
        self.scheduler.interrupt(id).await
    }

    /// Most recent events, newest first. `limit` is capped at the log
    /// capacity. Falls back to the repository while the log is empty.
    pub async fn recent_events(&self, limit: usize) -> Result<Vec<Event>, CoreError> {
        let capacity = self.ctx.config.events.log_capacity;
        let limit = limit.min(capacity);
        if let Some(mut cached) = self.ctx.cache.events.get(RECENT_EVENTS_KEY) {
            cached.truncate(limit);
            return Ok(cached);
        }

        let mut events = self.ctx.store.recent_events(capacity).await;
        if events.is_empty() {
            events = self.ctx.repository.recent_events(capacity).await?;
        }
        self.ctx.cache.events.set(RECENT_EVENTS_KEY, events.clone(), Duration::ZERO);
        events.truncate(limit);
        Ok(events)
    }

    /// Most recent events for one agent, newest first.
    pub async fn agent_events(&self, id: AgentId, limit: usize) -> Result<Vec<Event>, CoreError> {
        let key = agent_events_key(id);
        if let Some(mut cached) = self.ctx.cache.events.get(&key) {
            cached.truncate(limit);
            return Ok(cached);
        }

        let capacity = self.ctx.config.events.log_capacity;
        let mut events = self.ctx.store.events_for(id, capacity).await;
        if events.is_empty() {
            events = self.ctx.repository.events_for_agent(id, capacity).await?;
        }
        self.ctx.cache.events.set(key, events.clone(), Duration::ZERO);
        events.truncate(limit);
        Ok(events)
    }

    /// Aggregate counters. The latest snapshot is also kept in the stats
    /// cache.
    pub async fn stats(&self) -> SystemStats {
        let store = &self.ctx.store;
        let mut agents = 0_usize;
        let mut alive = 0_usize;
        store
            .for_each(|agent| {
                agents = agents.saturating_add(1);
                if agent.is_alive() {
                    alive = alive.saturating_add(1);
                }
            })
            .await;

        let stats = SystemStats {
            agents,
            alive,
            active_loops: self.scheduler.active_loops(),
            pending_completions: self.scheduler.pending_completions(),
            events: store.events().len().await,
            dropped_events: store.events().dropped(),
            deduplicated_events: store.events().deduplicated(),
            cache: self.ctx.cache.stats(),
            tiers: self.ctx.pipeline.stats(),
            locks: store.lock_stats(),
            backend: self.ctx.repository.name(),
        };

        match serde_json::to_value(&stats) {
            Ok(value) => self.ctx.cache.stats.set(stats_key("system"), value, Duration::ZERO),
            Err(err) => warn!(%err, "Could not cache stats snapshot"),
        }
        stats
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use menagerie_db::MemoryRepository;
    use menagerie_types::{ActionKind, DataPriority};
    use serde_json::json;

    use super::*;

    fn memory_sim() -> (Simulation, Repository) {
        let repo = Repository::Memory(MemoryRepository::new());
        let mut config = SimulationConfig::default();
        config.seed = Some(11);
        let sim = Simulation::new(config, repo.clone());
        (sim, repo)
    }

    #[tokio::test]
    async fn created_agent_starts_idle_and_healthy() {
        let (sim, repo) = memory_sim();
        let agent = sim.create_agent("  alice ").await.unwrap();

        assert_eq!(agent.owner, "alice");
        assert_eq!(agent.name, "Thunder");
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.health, 100);
        assert!(repo.get_by_owner("alice").await.unwrap().is_some());

        let events = sim.recent_events(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events.first().unwrap().kind, EventKind::Born);
    }

    #[tokio::test]
    async fn duplicate_and_empty_owners_are_rejected() {
        let (sim, _) = memory_sim();
        sim.create_agent("alice").await.unwrap();

        assert!(matches!(
            sim.create_agent("alice").await,
            Err(CoreError::DuplicateOwner(owner)) if owner == "alice"
        ));
        assert!(matches!(sim.create_agent("   ").await, Err(CoreError::EmptyOwner)));
        assert_eq!(sim.list_agents().await.len(), 1);
    }

    #[tokio::test]
    async fn lookups_by_id_and_owner() {
        let (sim, _) = memory_sim();
        let agent = sim.create_agent("bob").await.unwrap();

        assert_eq!(sim.get_agent(agent.id).await.unwrap().id, agent.id);
        assert_eq!(sim.agent_by_owner("bob").await.unwrap().id, agent.id);
        assert!(matches!(
            sim.agent_by_owner("nobody").await,
            Err(CoreError::OwnerNotFound(_))
        ));
        assert!(matches!(
            sim.get_agent(AgentId::new()).await,
            Err(CoreError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn feed_command_charges_half_the_amount() {
        let (sim, _) = memory_sim();
        let agent = sim.create_agent("alice").await.unwrap();

        let broke = sim.execute_command(agent.id, "feed", &json!({"amount": 20})).await;
        assert!(matches!(
            broke,
            Err(CoreError::InsufficientCoins { needed: 10, available: 0 })
        ));

        sim.execute_command(agent.id, "addcoins", &json!({"amount": 50}))
            .await
            .unwrap();
        let outcome = sim
            .execute_command(agent.id, "feed", &json!({"amount": 20}))
            .await
            .unwrap();

        assert_eq!(outcome.agent.coins, 40);
        assert!(matches!(outcome.detail, crate::command::CommandDetail::Feed { cost: 10, .. }));
        assert_eq!(sim.context().pipeline.batcher(DataPriority::Critical).stats().queue_len, 2);
    }

    #[tokio::test]
    async fn rest_command_rejected_while_busy() {
        let (sim, _) = memory_sim();
        let agent = sim.create_agent("alice").await.unwrap();

        let outcome = sim.execute(agent.id, Command::Rest { duration_secs: 30 }).await.unwrap();
        assert_eq!(outcome.agent.status, AgentStatus::Resting);

        let second = sim.execute(agent.id, Command::Rest { duration_secs: 30 }).await;
        assert!(matches!(
            second,
            Err(CoreError::InvalidState { action, .. }) if action == ActionKind::Rest.as_str()
        ));

        let interrupted = sim.interrupt(agent.id).await.unwrap();
        assert_eq!(interrupted.status, AgentStatus::Idle);
        sim.shutdown().await;
    }

    #[tokio::test]
    async fn recent_events_are_capped_and_newest_first() {
        let (sim, _) = memory_sim();
        let alice = sim.create_agent("alice").await.unwrap();
        let bob = sim.create_agent("bob").await.unwrap();

        let events = sim.recent_events(usize::MAX).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events.first().unwrap().agent_id, bob.id);

        let own = sim.agent_events(alice.id, 5).await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own.first().unwrap().agent_id, alice.id);
    }

    #[tokio::test]
    async fn start_resets_busy_agents_and_spawns_loops() {
        let repo = Repository::Memory(MemoryRepository::new());
        let mut resting = spawn_agent("alice", &menagerie_agents::VitalsConfig::default()).unwrap();
        resting.status = AgentStatus::Resting;
        repo.create_record(&resting).await.unwrap();
        let mut dead = spawn_agent("bob", &menagerie_agents::VitalsConfig::default()).unwrap();
        dead.status = AgentStatus::Dead;
        dead.health = 0;
        repo.create_record(&dead).await.unwrap();

        let sim = Simulation::new(SimulationConfig::default(), repo);
        assert_eq!(sim.start().await.unwrap(), 1);
        assert_eq!(sim.start().await.unwrap(), 0);

        let loaded = sim.get_agent(resting.id).await.unwrap();
        assert_eq!(loaded.status, AgentStatus::Idle);
        assert_eq!(sim.scheduler().active_loops(), 1);

        sim.shutdown().await;
        assert_eq!(sim.scheduler().active_loops(), 0);
    }

    #[tokio::test]
    async fn stats_count_agents_and_cache_a_snapshot() {
        let (sim, _) = memory_sim();
        sim.create_agent("alice").await.unwrap();
        sim.create_agent("bob").await.unwrap();

        let stats = sim.stats().await;
        assert_eq!(stats.agents, 2);
        assert_eq!(stats.alive, 2);
        assert_eq!(stats.events, 2);
        assert_eq!(stats.backend, "memory");

        let cached = sim.context().cache.stats.get(&stats_key("system")).unwrap();
        assert_eq!(cached["agents"], 2);
    }

    #[test]
    fn event_stream_is_taken_once() {
        let (sim, _) = memory_sim();
        assert!(sim.take_event_stream().is_some());
        assert!(sim.take_event_stream().is_none());
    }
}
