//! Operations on the `events` table.
//!
//! Events are append-only. Writes arrive in batches from the write
//! pipeline and are inserted with a single `UNNEST` statement per batch.
//! Old rows are removed by the retention sweep via
//! [`EventStore::delete_older_than`].

use chrono::{DateTime, Utc};
use menagerie_types::{AgentId, Event, EventId, EventKind, EventPayload};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::DbError;

const TABLE: &str = "events";

/// Operations on the `events` table.
pub struct EventStore<'a> {
    pool: &'a PgPool,
}

impl<'a> EventStore<'a> {
    /// Create a new event store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Most recent events across all agents, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails and
    /// [`DbError::Decode`] if a stored row is malformed.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Event>, DbError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT id, agent_id, agent_name, kind, message, payload, created_at
              FROM events
              ORDER BY created_at DESC, id DESC
              LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    /// Most recent events for one agent, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails and
    /// [`DbError::Decode`] if a stored row is malformed.
    pub async fn for_agent(&self, agent_id: AgentId, limit: usize) -> Result<Vec<Event>, DbError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT id, agent_id, agent_name, kind, message, payload, created_at
              FROM events
              WHERE agent_id = $1
              ORDER BY created_at DESC, id DESC
              LIMIT $2",
        )
        .bind(agent_id.into_inner())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    /// Delete every event older than `cutoff`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the delete fails.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM events WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.pool)
            .await?;
        tracing::debug!(removed = result.rows_affected(), %cutoff, "Pruned old events");
        Ok(result.rows_affected())
    }
}

/// Insert a batch of events with one `UNNEST` statement.
///
/// Takes a bare connection so it can run inside a batch transaction.
/// Duplicate ids are ignored.
pub(crate) async fn insert_events(conn: &mut PgConnection, events: &[&Event]) -> Result<(), DbError> {
    if events.is_empty() {
        return Ok(());
    }

    let len = events.len();
    let mut ids = Vec::with_capacity(len);
    let mut agent_ids = Vec::with_capacity(len);
    let mut agent_names = Vec::with_capacity(len);
    let mut kinds = Vec::with_capacity(len);
    let mut messages = Vec::with_capacity(len);
    let mut payloads = Vec::with_capacity(len);
    let mut timestamps = Vec::with_capacity(len);

    for event in events {
        ids.push(event.id.into_inner());
        agent_ids.push(event.agent_id.into_inner());
        agent_names.push(event.agent_name.clone());
        kinds.push(event.kind.as_str().to_owned());
        messages.push(event.message.clone());
        payloads.push(serde_json::to_string(&event.payload)?);
        timestamps.push(event.timestamp);
    }

    sqlx::query(
        r"INSERT INTO events (id, agent_id, agent_name, kind, message, payload, created_at)
          SELECT * FROM UNNEST($1::UUID[], $2::UUID[], $3::TEXT[], $4::TEXT[], $5::TEXT[], $6::TEXT[], $7::TIMESTAMPTZ[])
          ON CONFLICT (id) DO NOTHING",
    )
    .bind(&ids)
    .bind(&agent_ids)
    .bind(&agent_names)
    .bind(&kinds)
    .bind(&messages)
    .bind(&payloads)
    .bind(&timestamps)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(count = len, "Inserted events (batch UNNEST)");
    Ok(())
}

/// A row from the `events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// Event id.
    pub id: Uuid,
    /// Agent the event is about.
    pub agent_id: Uuid,
    /// Agent name at the time.
    pub agent_name: String,
    /// Kind string form.
    pub kind: String,
    /// Message.
    pub message: String,
    /// JSON-encoded [`EventPayload`].
    pub payload: String,
    /// When it happened.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = DbError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let kind = EventKind::parse(&row.kind).ok_or_else(|| DbError::decode(TABLE, "kind", row.kind.clone()))?;
        let payload: EventPayload = serde_json::from_str(&row.payload)
            .map_err(|e| DbError::decode(TABLE, "payload", e.to_string()))?;

        Ok(Self {
            id: EventId::from(row.id),
            agent_id: AgentId::from(row.agent_id),
            agent_name: row.agent_name,
            kind,
            message: row.message,
            timestamp: row.created_at,
            payload,
        })
    }
}
