//! The persistence collaborator used by the simulation core.
//!
//! [`Repository`] is dispatched over an enum rather than a trait object,
//! since async methods are not dyn-compatible. Two backends exist:
//!
//! - [`PgRepository`] -- the `agents` and `events` tables in `PostgreSQL`
//! - [`MemoryRepository`] -- an in-process store for tests and for running
//!   without a database, with failure injection for batch writes
//!
//! The core only calls [`Repository::apply_batch`] from write-pipeline
//! flushes, or directly as a synchronous fallback when a tier's batcher is
//! no longer running.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use menagerie_types::{Agent, AgentId, Event, WriteOp};
use tokio::sync::RwLock;

use crate::agent_store::{self, AgentStore};
use crate::error::DbError;
use crate::event_store::{self, EventStore};
use crate::postgres::PostgresPool;

// ---------------------------------------------------------------------------
// Unified repository enum
// ---------------------------------------------------------------------------

/// A backing store for agents and events.
#[derive(Debug, Clone)]
pub enum Repository {
    /// `PostgreSQL`.
    Postgres(PgRepository),
    /// In-process maps.
    Memory(MemoryRepository),
}

impl Repository {
    /// Human-readable backend name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }

    /// Insert a new agent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Conflict`] if the id or owner already exists.
    pub async fn create_record(&self, agent: &Agent) -> Result<(), DbError> {
        match self {
            Self::Postgres(repo) => repo.create_record(agent).await,
            Self::Memory(repo) => repo.create_record(agent).await,
        }
    }

    /// Fetch an agent by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails or the row cannot be decoded.
    pub async fn get_by_id(&self, id: AgentId) -> Result<Option<Agent>, DbError> {
        match self {
            Self::Postgres(repo) => AgentStore::new(repo.pool.pool()).get_by_id(id).await,
            Self::Memory(repo) => Ok(repo.tables.read().await.agents.get(&id).cloned()),
        }
    }

    /// Fetch the agent belonging to `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails or the row cannot be decoded.
    pub async fn get_by_owner(&self, owner: &str) -> Result<Option<Agent>, DbError> {
        match self {
            Self::Postgres(repo) => AgentStore::new(repo.pool.pool()).get_by_owner(owner).await,
            Self::Memory(repo) => Ok(repo
                .tables
                .read()
                .await
                .agents
                .values()
                .find(|a| a.owner == owner)
                .cloned()),
        }
    }

    /// Fetch every agent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails or a row cannot be decoded.
    pub async fn list_all(&self) -> Result<Vec<Agent>, DbError> {
        match self {
            Self::Postgres(repo) => AgentStore::new(repo.pool.pool()).list_all().await,
            Self::Memory(repo) => {
                let tables = repo.tables.read().await;
                let mut agents: Vec<Agent> = tables.agents.values().cloned().collect();
                agents.sort_by_key(|a| (a.created_at, a.id));
                Ok(agents)
            }
        }
    }

    /// Apply every op in one transaction. Either all of them land or none.
    ///
    /// [`WriteOp::LiveState`] ops are memory-only and are skipped here.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any write fails; the whole batch is rolled back.
    pub async fn apply_batch(&self, ops: &[WriteOp]) -> Result<(), DbError> {
        match self {
            Self::Postgres(repo) => repo.apply_batch(ops).await,
            Self::Memory(repo) => repo.apply_batch(ops).await,
        }
    }

    /// Most recent events across all agents, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails or a row cannot be decoded.
    pub async fn recent_events(&self, limit: usize) -> Result<Vec<Event>, DbError> {
        match self {
            Self::Postgres(repo) => EventStore::new(repo.pool.pool()).recent(limit).await,
            Self::Memory(repo) => {
                let tables = repo.tables.read().await;
                Ok(tables.events.iter().rev().take(limit).cloned().collect())
            }
        }
    }

    /// Most recent events for one agent, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails or a row cannot be decoded.
    pub async fn events_for_agent(&self, id: AgentId, limit: usize) -> Result<Vec<Event>, DbError> {
        match self {
            Self::Postgres(repo) => EventStore::new(repo.pool.pool()).for_agent(id, limit).await,
            Self::Memory(repo) => {
                let tables = repo.tables.read().await;
                Ok(tables
                    .events
                    .iter()
                    .rev()
                    .filter(|e| e.agent_id == id)
                    .take(limit)
                    .cloned()
                    .collect())
            }
        }
    }

    /// Delete events older than `cutoff`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the delete fails.
    pub async fn delete_events_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        match self {
            Self::Postgres(repo) => EventStore::new(repo.pool.pool()).delete_older_than(cutoff).await,
            Self::Memory(repo) => {
                let mut tables = repo.tables.write().await;
                let before = tables.events.len();
                tables.events.retain(|e| e.timestamp >= cutoff);
                let removed = before.saturating_sub(tables.events.len());
                Ok(u64::try_from(removed).unwrap_or(u64::MAX))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL backend
// ---------------------------------------------------------------------------

/// Repository backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PostgresPool,
}

impl PgRepository {
    /// Wrap a connected pool.
    pub const fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub const fn pool(&self) -> &PostgresPool {
        &self.pool
    }

    async fn create_record(&self, agent: &Agent) -> Result<(), DbError> {
        AgentStore::new(self.pool.pool()).insert(agent).await
    }

    async fn apply_batch(&self, ops: &[WriteOp]) -> Result<(), DbError> {
        let (agents, events) = split_batch(ops);
        if agents.is_empty() && events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.pool().begin().await?;
        for agent in agents.values() {
            agent_store::write_agent(&mut *tx, agent, true).await?;
        }
        event_store::insert_events(&mut *tx, &events).await?;
        tx.commit().await?;

        tracing::debug!(agents = agents.len(), events = events.len(), "Applied write batch");
        Ok(())
    }
}

/// Collapse a batch into the highest-revision record per agent plus all
/// events. On equal revisions the later op wins.
fn split_batch(ops: &[WriteOp]) -> (HashMap<AgentId, &Agent>, Vec<&Event>) {
    let mut agents: HashMap<AgentId, &Agent> = HashMap::new();
    let mut events = Vec::new();
    for op in ops {
        match op {
            WriteOp::UpsertAgent(agent) => match agents.entry(agent.id) {
                Entry::Occupied(mut slot) => {
                    if slot.get().revision <= agent.revision {
                        slot.insert(agent.as_ref());
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(agent.as_ref());
                }
            },
            WriteOp::InsertEvent(event) => events.push(event.as_ref()),
            WriteOp::LiveState(_) => {}
        }
    }
    (agents, events)
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryTables {
    agents: HashMap<AgentId, Agent>,
    events: Vec<Event>,
}

/// Repository kept entirely in process memory.
///
/// Batches are applied under one write lock, so they are atomic with
/// respect to readers. Like the `PostgreSQL` upsert, an agent record only
/// replaces a stored one with a lower revision. [`MemoryRepository::fail_next_batches`] makes the
/// next `n` calls to `apply_batch` fail without writing anything.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    tables: Arc<RwLock<MemoryTables>>,
    pending_failures: Arc<AtomicUsize>,
    batches_applied: Arc<AtomicU64>,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` batch applications fail.
    pub fn fail_next_batches(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of batches applied successfully.
    pub fn batches_applied(&self) -> u64 {
        self.batches_applied.load(Ordering::SeqCst)
    }

    /// Number of stored events.
    pub async fn event_count(&self) -> usize {
        self.tables.read().await.events.len()
    }

    async fn create_record(&self, agent: &Agent) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if tables.agents.values().any(|a| a.owner == agent.owner) {
            return Err(DbError::Conflict(format!(
                "agent for owner {} already exists",
                agent.owner
            )));
        }
        match tables.agents.entry(agent.id) {
            Entry::Occupied(_) => Err(DbError::Conflict(format!("agent {} already exists", agent.id))),
            Entry::Vacant(slot) => {
                slot.insert(agent.clone());
                Ok(())
            }
        }
    }

    async fn apply_batch(&self, ops: &[WriteOp]) -> Result<(), DbError> {
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(DbError::Unavailable("injected batch failure".to_owned()));
        }

        let (agents, events) = split_batch(ops);
        let mut tables = self.tables.write().await;
        for (id, agent) in agents {
            match tables.agents.entry(id) {
                Entry::Occupied(mut slot) => {
                    if slot.get().revision < agent.revision {
                        slot.insert(agent.clone());
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(agent.clone());
                }
            }
        }
        for event in events {
            if !tables.events.iter().any(|e| e.id == event.id) {
                tables.events.push(event.clone());
            }
        }
        drop(tables);

        self.batches_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
