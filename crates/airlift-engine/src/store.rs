//! Durable migration state store
//!
//! Entities and trackers live in SQLite so that a freshly started process
//! (or a retried tracker run) sees exactly the state the previous one left
//! behind. All status transitions are guarded UPDATEs: terminal states are
//! never overwritten, and applying the same transition twice is harmless.

use crate::config::DatabaseConfig;
use crate::entity::{Entity, EntityKind, EntityStatus, Tracker, TrackerStatus};
use crate::error::{AirliftError, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

/// State store backed by SQLite
#[derive(Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    /// Open (creating if needed) the file-backed state database
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!(path = %config.path, "State store ready");
        Ok(Self { pool })
    }

    /// Open an in-memory state database (tests, dry runs)
    ///
    /// A single connection is required: every SQLite `:memory:` connection is
    /// its own database, so a larger pool would scatter tables across them.
    pub async fn in_memory() -> Result<Self> {
        let options = "sqlite::memory:"
            .parse::<SqliteConnectOptions>()
            .map_err(AirliftError::Database)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Shared handle to the underlying pool (ledger and destination reuse it)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Create a new entity in `created` status
    pub async fn create_entity(
        &self,
        kind: EntityKind,
        source_full_path: &str,
        destination_slug: &str,
    ) -> Result<Entity> {
        let entity = Entity {
            id: Uuid::new_v4(),
            kind,
            status: EntityStatus::Created,
            source_full_path: source_full_path.to_string(),
            destination_slug: destination_slug.to_string(),
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO migration_entities
                (id, kind, status, source_full_path, destination_slug, error, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7)
            "#,
        )
        .bind(entity.id.to_string())
        .bind(entity.kind.as_str())
        .bind(entity.status.as_str())
        .bind(&entity.source_full_path)
        .bind(&entity.destination_slug)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .execute(&self.pool)
        .await?;

        info!(entity_id = %entity.id, kind = %entity.kind, path = %entity.source_full_path, "Entity created");
        Ok(entity)
    }

    /// Fetch one entity
    pub async fn entity(&self, id: Uuid) -> Result<Entity> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, status, source_full_path, destination_slug, error, created_at, updated_at
            FROM migration_entities WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => entity_from_row(&row),
            None => Err(AirliftError::NotFound(format!("entity {id}"))),
        }
    }

    /// All entities, newest first
    pub async fn entities(&self) -> Result<Vec<Entity>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, status, source_full_path, destination_slug, error, created_at, updated_at
            FROM migration_entities ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entity_from_row).collect()
    }

    /// Mark the entity started (no-op when already started or terminal)
    pub async fn start_entity(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE migration_entities SET status = 'started', updated_at = ?1
            WHERE id = ?2 AND status = 'created'
            "#,
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark the entity finished; returns false when it was already terminal
    pub async fn finish_entity(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE migration_entities SET status = 'finished', updated_at = ?1
            WHERE id = ?2 AND status NOT IN ('finished', 'failed')
            "#,
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark the entity failed; returns false when it was already terminal
    pub async fn fail_entity(&self, id: Uuid, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE migration_entities SET status = 'failed', error = ?1, updated_at = ?2
            WHERE id = ?3 AND status NOT IN ('finished', 'failed')
            "#,
        )
        .bind(error)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete an entity and (by cascade) its trackers
    pub async fn delete_entity(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM migration_entities WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Trackers
    // ========================================================================

    /// Create a tracker for one relation of an entity
    pub async fn create_tracker(&self, entity_id: Uuid, relation: &str) -> Result<Tracker> {
        let tracker = Tracker {
            id: Uuid::new_v4(),
            entity_id,
            relation: relation.to_string(),
            status: TrackerStatus::Enqueued,
            batch_cursor: None,
            error: None,
            failed_records: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO migration_trackers
                (id, entity_id, relation, status, batch_cursor, error, failed_records, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, NULL, NULL, 0, ?5, ?6)
            "#,
        )
        .bind(tracker.id.to_string())
        .bind(tracker.entity_id.to_string())
        .bind(&tracker.relation)
        .bind(tracker.status.as_str())
        .bind(tracker.created_at)
        .bind(tracker.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(entity_id = %entity_id, relation = %relation, "Tracker created");
        Ok(tracker)
    }

    /// Fetch one tracker by entity and relation
    pub async fn tracker(&self, entity_id: Uuid, relation: &str) -> Result<Tracker> {
        let row = sqlx::query(
            r#"
            SELECT id, entity_id, relation, status, batch_cursor, error, failed_records, created_at, updated_at
            FROM migration_trackers WHERE entity_id = ?1 AND relation = ?2
            "#,
        )
        .bind(entity_id.to_string())
        .bind(relation)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => tracker_from_row(&row),
            None => Err(AirliftError::NotFound(format!(
                "tracker {relation} for entity {entity_id}"
            ))),
        }
    }

    /// All trackers of an entity, in relation order (a consistent snapshot:
    /// one query, one statement)
    pub async fn trackers_for_entity(&self, entity_id: Uuid) -> Result<Vec<Tracker>> {
        let rows = sqlx::query(
            r#"
            SELECT id, entity_id, relation, status, batch_cursor, error, failed_records, created_at, updated_at
            FROM migration_trackers WHERE entity_id = ?1 ORDER BY relation
            "#,
        )
        .bind(entity_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(tracker_from_row).collect()
    }

    /// Mark a tracker started for a fresh run, clearing prior run residue
    pub async fn start_tracker(&self, tracker_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE migration_trackers
            SET status = 'started', error = NULL, failed_records = 0, updated_at = ?1
            WHERE id = ?2
            "#,
        )
        .bind(Utc::now())
        .bind(tracker_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a tracker finished, recording tolerated per-record failures
    pub async fn finish_tracker(&self, tracker_id: Uuid, failed_records: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE migration_trackers
            SET status = 'finished', failed_records = ?1, updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(failed_records)
        .bind(Utc::now())
        .bind(tracker_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a tracker failed with a human-readable cause
    pub async fn fail_tracker(
        &self,
        tracker_id: Uuid,
        error: &str,
        failed_records: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE migration_trackers
            SET status = 'failed', error = ?1, failed_records = ?2, updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(error)
        .bind(failed_records)
        .bind(Utc::now())
        .bind(tracker_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist the pagination cursor after a completed page
    pub async fn update_tracker_cursor(
        &self,
        tracker_id: Uuid,
        cursor: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE migration_trackers SET batch_cursor = ?1, updated_at = ?2 WHERE id = ?3
            "#,
        )
        .bind(cursor)
        .bind(Utc::now())
        .bind(tracker_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Abort sweep: fail every tracker of the entity that is not yet terminal
    pub async fn fail_nonterminal_trackers(&self, entity_id: Uuid, error: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE migration_trackers
            SET status = 'failed', error = ?1, updated_at = ?2
            WHERE entity_id = ?3 AND status IN ('enqueued', 'started')
            "#,
        )
        .bind(error)
        .bind(Utc::now())
        .bind(entity_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| AirliftError::InvalidState(format!("malformed uuid {value:?}: {e}")))
}

fn entity_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Entity> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Entity {
        id: parse_uuid(&id)?,
        kind: kind.parse::<EntityKind>()?,
        status: EntityStatus::from(status),
        source_full_path: row.try_get("source_full_path")?,
        destination_slug: row.try_get("destination_slug")?,
        error: row.try_get("error")?,
        created_at,
        updated_at,
    })
}

fn tracker_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Tracker> {
    let id: String = row.try_get("id")?;
    let entity_id: String = row.try_get("entity_id")?;
    let status: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Tracker {
        id: parse_uuid(&id)?,
        entity_id: parse_uuid(&entity_id)?,
        relation: row.try_get("relation")?,
        status: TrackerStatus::from(status),
        batch_cursor: row.try_get("batch_cursor")?,
        error: row.try_get("error")?,
        failed_records: row.try_get("failed_records")?,
        created_at,
        updated_at,
    })
}
