//! Operations on the `agents` table.
//!
//! One row per agent. `owner` carries a unique index, so a second agent for
//! the same owner is rejected by the database as well as by the service.
//! `memory` and `friends` are stored as JSON text; a row whose JSON does
//! not parse surfaces as [`DbError::Decode`] to the reader.

use chrono::{DateTime, Utc};
use menagerie_types::{Agent, AgentId, AgentStatus, Mood, Personality};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::DbError;

const TABLE: &str = "agents";

const SELECT_COLUMNS: &str = "id, owner, name, personality, level, experience, health, max_health, \
     energy, max_energy, hunger, social, attack, defense, coins, location, status, mood, memory, \
     friends, created_at, last_activity, revision";

/// Operations on the `agents` table.
pub struct AgentStore<'a> {
    pool: &'a PgPool,
}

impl<'a> AgentStore<'a> {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a brand-new agent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Conflict`] if the id or owner already exists and
    /// [`DbError::Postgres`] for any other failure.
    pub async fn insert(&self, agent: &Agent) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        let result = write_agent(&mut conn, agent, false).await;
        match result {
            Err(DbError::Postgres(sqlx::Error::Database(e))) if e.is_unique_violation() => Err(
                DbError::Conflict(format!("agent for owner {} already exists", agent.owner)),
            ),
            other => other,
        }
    }

    /// Fetch one agent by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails and
    /// [`DbError::Decode`] if the stored row is malformed.
    pub async fn get_by_id(&self, id: AgentId) -> Result<Option<Agent>, DbError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM agents WHERE id = $1");
        let row = sqlx::query_as::<_, AgentRow>(&sql)
            .bind(id.into_inner())
            .fetch_optional(self.pool)
            .await?;
        row.map(Agent::try_from).transpose()
    }

    /// Fetch the agent belonging to `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails and
    /// [`DbError::Decode`] if the stored row is malformed.
    pub async fn get_by_owner(&self, owner: &str) -> Result<Option<Agent>, DbError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM agents WHERE owner = $1");
        let row = sqlx::query_as::<_, AgentRow>(&sql)
            .bind(owner)
            .fetch_optional(self.pool)
            .await?;
        row.map(Agent::try_from).transpose()
    }

    /// Fetch every agent, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails and
    /// [`DbError::Decode`] on the first malformed row.
    pub async fn list_all(&self) -> Result<Vec<Agent>, DbError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM agents ORDER BY created_at, id");
        let rows = sqlx::query_as::<_, AgentRow>(&sql)
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }
}

/// Insert an agent, or update every mutable column if `upsert` is set.
///
/// An upsert only lands when its revision is newer than the stored one, so
/// a snapshot flushed late by a slower tier cannot undo a newer write.
/// Takes a bare connection so it can run inside a batch transaction.
pub(crate) async fn write_agent(
    conn: &mut PgConnection,
    agent: &Agent,
    upsert: bool,
) -> Result<(), DbError> {
    let memory = serde_json::to_string(&agent.memory)?;
    let friends = serde_json::to_string(&agent.friends)?;

    let conflict = if upsert {
        "ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name, level = EXCLUDED.level, experience = EXCLUDED.experience,
            health = EXCLUDED.health, max_health = EXCLUDED.max_health,
            energy = EXCLUDED.energy, max_energy = EXCLUDED.max_energy,
            hunger = EXCLUDED.hunger, social = EXCLUDED.social,
            attack = EXCLUDED.attack, defense = EXCLUDED.defense, coins = EXCLUDED.coins,
            location = EXCLUDED.location, status = EXCLUDED.status, mood = EXCLUDED.mood,
            memory = EXCLUDED.memory, friends = EXCLUDED.friends,
            last_activity = EXCLUDED.last_activity, revision = EXCLUDED.revision,
            updated_at = now()
         WHERE agents.revision < EXCLUDED.revision"
    } else {
        ""
    };

    let sql = format!(
        "INSERT INTO agents ({SELECT_COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
         {conflict}"
    );

    sqlx::query(&sql)
        .bind(agent.id.into_inner())
        .bind(&agent.owner)
        .bind(&agent.name)
        .bind(agent.personality.as_str())
        .bind(to_db_int(agent.level))
        .bind(to_db_int(agent.experience))
        .bind(to_db_int(agent.health))
        .bind(to_db_int(agent.max_health))
        .bind(to_db_int(agent.energy))
        .bind(to_db_int(agent.max_energy))
        .bind(to_db_int(agent.hunger))
        .bind(to_db_int(agent.social))
        .bind(to_db_int(agent.attack))
        .bind(to_db_int(agent.defense))
        .bind(i64::try_from(agent.coins).unwrap_or(i64::MAX))
        .bind(&agent.location)
        .bind(agent.status.as_str())
        .bind(agent.mood.as_str())
        .bind(memory)
        .bind(friends)
        .bind(agent.created_at)
        .bind(agent.last_activity)
        .bind(i64::try_from(agent.revision).unwrap_or(i64::MAX))
        .execute(&mut *conn)
        .await?;

    Ok(())
}

fn to_db_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn from_db_int(value: i32, column: &'static str) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|e| DbError::decode(TABLE, column, format!("{value}: {e}")))
}

fn from_db_json(value: &str, column: &'static str) -> Result<Vec<String>, DbError> {
    serde_json::from_str(value).map_err(|e| DbError::decode(TABLE, column, e.to_string()))
}

/// A row from the `agents` table.
///
/// Uses runtime types rather than compile-time checked types to
/// avoid requiring a live database during builds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentRow {
    /// Agent id.
    pub id: Uuid,
    /// Owner.
    pub owner: String,
    /// Display name.
    pub name: String,
    /// Personality string form.
    pub personality: String,
    /// Level.
    pub level: i32,
    /// Experience.
    pub experience: i32,
    /// Health.
    pub health: i32,
    /// Health cap.
    pub max_health: i32,
    /// Energy.
    pub energy: i32,
    /// Energy cap.
    pub max_energy: i32,
    /// Satiety.
    pub hunger: i32,
    /// Social need.
    pub social: i32,
    /// Attack.
    pub attack: i32,
    /// Defense.
    pub defense: i32,
    /// Coin balance.
    pub coins: i64,
    /// Location.
    pub location: String,
    /// Status string form.
    pub status: String,
    /// Mood string form.
    pub mood: String,
    /// JSON array of memories.
    pub memory: String,
    /// JSON array of friends.
    pub friends: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last activity.
    pub last_activity: DateTime<Utc>,
    /// Change counter.
    pub revision: i64,
}

impl TryFrom<AgentRow> for Agent {
    type Error = DbError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let personality = Personality::parse(&row.personality)
            .ok_or_else(|| DbError::decode(TABLE, "personality", row.personality.clone()))?;
        let status = AgentStatus::parse(&row.status)
            .ok_or_else(|| DbError::decode(TABLE, "status", row.status.clone()))?;
        let mood = Mood::parse(&row.mood).ok_or_else(|| DbError::decode(TABLE, "mood", row.mood.clone()))?;

        Ok(Self {
            id: AgentId::from(row.id),
            owner: row.owner,
            name: row.name,
            personality,
            level: from_db_int(row.level, "level")?,
            experience: from_db_int(row.experience, "experience")?,
            health: from_db_int(row.health, "health")?,
            max_health: from_db_int(row.max_health, "max_health")?,
            energy: from_db_int(row.energy, "energy")?,
            max_energy: from_db_int(row.max_energy, "max_energy")?,
            hunger: from_db_int(row.hunger, "hunger")?,
            social: from_db_int(row.social, "social")?,
            attack: from_db_int(row.attack, "attack")?,
            defense: from_db_int(row.defense, "defense")?,
            coins: u64::try_from(row.coins)
                .map_err(|e| DbError::decode(TABLE, "coins", format!("{}: {e}", row.coins)))?,
            location: row.location,
            status,
            mood,
            memory: from_db_json(&row.memory, "memory")?,
            friends: from_db_json(&row.friends, "friends")?,
            created_at: row.created_at,
            last_activity: row.last_activity,
            revision: u64::try_from(row.revision)
                .map_err(|e| DbError::decode(TABLE, "revision", format!("{}: {e}", row.revision)))?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row() -> AgentRow {
        let now = Utc::now();
        AgentRow {
            id: Uuid::now_v7(),
            owner: "alice".to_owned(),
            name: "Thunder".to_owned(),
            personality: "brave".to_owned(),
            level: 2,
            experience: 40,
            health: 90,
            max_health: 120,
            energy: 70,
            max_energy: 100,
            hunger: 55,
            social: 60,
            attack: 18,
            defense: 8,
            coins: 321,
            location: "Crystal Mine".to_owned(),
            status: "resting".to_owned(),
            mood: "happy".to_owned(),
            memory: r#"["visited Crystal Mine"]"#.to_owned(),
            friends: r#"["bob"]"#.to_owned(),
            created_at: now,
            last_activity: now,
            revision: 4,
        }
    }

    #[test]
    fn well_formed_row_decodes() {
        let agent = Agent::try_from(row()).unwrap();
        assert_eq!(agent.status, AgentStatus::Resting);
        assert_eq!(agent.friends, vec!["bob".to_owned()]);
        assert_eq!(agent.coins, 321);
        assert_eq!(agent.revision, 4);
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let mut bad = row();
        bad.memory = "{not json".to_owned();
        let err = Agent::try_from(bad).unwrap_err();
        assert!(matches!(err, DbError::Decode { column: "memory", .. }));
    }

    #[test]
    fn negative_counters_are_rejected() {
        let mut bad = row();
        bad.coins = -5;
        assert!(matches!(
            Agent::try_from(bad),
            Err(DbError::Decode { column: "coins", .. })
        ));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut bad = row();
        bad.status = "napping".to_owned();
        assert!(matches!(
            Agent::try_from(bad),
            Err(DbError::Decode { column: "status", .. })
        ));
    }
}
