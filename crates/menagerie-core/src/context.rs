//! Shared state handed to every simulation task.
//!
//! [`ServiceContext`] is built once by [`crate::Simulation`] and shared
//! behind an `Arc`. It owns the live agents, the tiered cache, the write
//! pipeline and the repository, and it is the only place where agent
//! mutations are turned into cache updates and queued writes.

use menagerie_db::cache::{RECENT_EVENTS_KEY, agent_events_key};
use menagerie_db::{Repository, TieredCache, WritePipeline};
use menagerie_types::{Agent, AgentId, DataPriority, Event, WriteOp, diff_agents};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::config::SimulationConfig;
use crate::error::CoreError;
use crate::store::{EntityStore, EventLog};

/// Routing work deferred until the agent's lock is released.
#[derive(Debug)]
#[must_use]
pub struct Staged {
    fallback: Vec<WriteOp>,
    events: Vec<Event>,
}

/// Everything a simulation task needs, constructed explicitly.
#[derive(Debug)]
pub struct ServiceContext {
    /// Loaded configuration.
    pub config: SimulationConfig,
    /// Live agents and the event log.
    pub store: EntityStore,
    /// Read-through cache categories.
    pub cache: TieredCache,
    /// Per-tier write batchers.
    pub pipeline: WritePipeline,
    /// Backing store.
    pub repository: Repository,
    /// Root cancellation token; every task runs under a child of it.
    pub token: CancellationToken,
}

impl ServiceContext {
    /// Build a context. Accepted events are also sent to `fanout`.
    pub fn new(config: SimulationConfig, repository: Repository, fanout: Option<mpsc::Sender<Event>>) -> Self {
        let events = EventLog::new(&config.events, fanout);
        let pipeline = WritePipeline::new(config.storage.classifier(), repository.clone());
        Self {
            store: EntityStore::new(config.scheduler.lock_shards, events),
            cache: TieredCache::new(config.cache.to_cache_config()),
            pipeline,
            repository,
            config,
            token: CancellationToken::new(),
        }
    }

    /// Mutate one agent under its shard lock and route the result.
    ///
    /// `f` returns a value and the events to append. If `f` fails the
    /// agent is restored to its previous state, so a rejected request
    /// never leaves a partial change behind. Returns `f`'s value and a
    /// snapshot of the agent afterwards.
    pub async fn mutate<R>(
        &self,
        id: AgentId,
        f: impl FnOnce(&mut Agent) -> Result<(R, Vec<Event>), CoreError>,
    ) -> Result<(R, Agent), CoreError> {
        let outcome = self
            .store
            .with_agent_mut(id, |agent| {
                let before = agent.clone();
                match f(agent) {
                    Ok((value, events)) => {
                        let staged = self.stage(&before, agent, events);
                        Ok((value, agent.clone(), staged))
                    }
                    Err(err) => {
                        *agent = before;
                        Err(err)
                    }
                }
            })
            .await
            .ok_or(CoreError::AgentNotFound(id))?;

        let (value, after, staged) = outcome?;
        self.settle(staged).await;
        Ok((value, after))
    }

    /// Route the difference between two versions of an agent.
    ///
    /// Must be called while the agent's shard lock is held, with `after`
    /// being the stored record, so cache updates and queued writes follow
    /// the order of the mutations. A change bumps the revision first.
    ///
    /// The highest tier among the changed fields decides where the change
    /// goes; a lethal change always goes to the critical tier. The cache is
    /// updated at once. Tiers that persist queue the whole record, and
    /// memory-only tiers queue the individual changes. Whatever has to
    /// wait for an `.await` is returned for [`ServiceContext::settle`].
    pub fn stage(&self, before: &Agent, after: &mut Agent, events: Vec<Event>) -> Staged {
        let mut staged = Staged {
            fallback: Vec::new(),
            events,
        };
        let changes = diff_agents(before, after);
        if changes.is_empty() {
            return staged;
        }
        after.revision = after.revision.saturating_add(1);

        let classifier = self.pipeline.classifier();
        let priority = classifier.classify_changes(&changes);
        let policy = classifier.policy_for(priority);

        self.cache.put_agent(after);
        self.cache.push_live_state(
            after.id,
            &changes,
            policy.cache_ttl,
            self.config.storage.live_state_limit,
        );
        trace!(
            agent_id = %after.id,
            changes = changes.len(),
            revision = after.revision,
            tier = %priority,
            "State changes routed"
        );

        if policy.layers.persists() {
            let op = WriteOp::UpsertAgent(Box::new(after.clone()));
            staged.fallback.extend(self.pipeline.enqueue(priority, op));
        } else {
            for change in changes {
                staged
                    .fallback
                    .extend(self.pipeline.enqueue(priority, WriteOp::LiveState(change)));
            }
        }
        staged
    }

    /// Finish what [`ServiceContext::stage`] left over, outside the lock:
    /// synchronous writes for stopped tiers, then the events.
    pub async fn settle(&self, staged: Staged) {
        if let Err(err) = self.pipeline.write_through(&staged.fallback).await {
            let agent_id = staged.fallback.first().map(WriteOp::agent_id);
            warn!(agent_id = ?agent_id, %err, "Synchronous write failed");
        }
        for event in staged.events {
            self.record_event(event).await;
        }
    }

    /// Append an event to the log and queue it for its tier. Duplicates
    /// are dropped here and never reach the pipeline.
    pub async fn record_event(&self, event: Event) {
        if !self.store.append_event(event.clone()).await {
            return;
        }
        self.cache.events.delete(RECENT_EVENTS_KEY);
        self.cache.events.delete(&agent_events_key(event.agent_id));

        let priority = self.pipeline.classifier().classify_event(event.kind);
        self.submit(priority, WriteOp::InsertEvent(Box::new(event))).await;
    }

    async fn submit(&self, priority: DataPriority, op: WriteOp) {
        let agent_id = op.agent_id();
        if let Err(err) = self.pipeline.submit(priority, op).await {
            warn!(%agent_id, tier = %priority, %err, "Synchronous write failed");
        }
    }
}
