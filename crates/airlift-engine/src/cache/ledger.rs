//! Durable dedupe ledger
//!
//! The ledger is the only state shared across retries of the same tracker,
//! so it lives in SQLite next to the tracker rows. Every failure is mapped to
//! `CacheUnavailable`: callers must treat an unreadable ledger as fatal for
//! the run, never as "not seen".

use crate::cache::CacheScope;
use crate::error::{AirliftError, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

/// Keyed, expiring, per-(entity, relation) ledger of processed records
#[async_trait]
pub trait DedupeLedger: Send + Sync {
    /// Fetch a live entry, or None when absent or expired
    async fn get(&self, scope: &CacheScope, key: &str) -> Result<Option<String>>;

    /// Record (or refresh) an entry
    async fn put(&self, scope: &CacheScope, key: &str, value: &str) -> Result<()>;

    /// Drop every entry for one (entity, relation) scope
    async fn clear_scope(&self, scope: &CacheScope) -> Result<()>;

    /// Drop every entry for an entity (migration deleted)
    async fn clear_entity(&self, entity_id: Uuid) -> Result<()>;
}

/// SQLite-backed ledger with TTL-bounded entries
#[derive(Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
    ttl_hours: i64,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool, ttl_hours: i64) -> Self {
        Self { pool, ttl_hours }
    }

    fn expiry(&self) -> i64 {
        (Utc::now() + chrono::Duration::hours(self.ttl_hours)).timestamp()
    }

    /// Drop entries past their expiry; safe to call at any time
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dedupe_entries WHERE expires_at <= ?1")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        if result.rows_affected() > 0 {
            debug!(purged = result.rows_affected(), "Purged expired ledger entries");
        }
        Ok(result.rows_affected())
    }
}

fn unavailable(err: sqlx::Error) -> AirliftError {
    AirliftError::CacheUnavailable(err.to_string())
}

#[async_trait]
impl DedupeLedger for SqliteLedger {
    async fn get(&self, scope: &CacheScope, key: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT value, expires_at FROM dedupe_entries
            WHERE entity_id = ?1 AND relation = ?2 AND cache_key = ?3
            "#,
        )
        .bind(scope.entity_id.to_string())
        .bind(&scope.relation)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: i64 = row.try_get("expires_at").map_err(unavailable)?;
        if expires_at <= Utc::now().timestamp() {
            // Expired entries count as unseen; drop them eagerly.
            sqlx::query(
                r#"
                DELETE FROM dedupe_entries
                WHERE entity_id = ?1 AND relation = ?2 AND cache_key = ?3
                "#,
            )
            .bind(scope.entity_id.to_string())
            .bind(&scope.relation)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
            return Ok(None);
        }

        let value: String = row.try_get("value").map_err(unavailable)?;
        Ok(Some(value))
    }

    async fn put(&self, scope: &CacheScope, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dedupe_entries (entity_id, relation, cache_key, value, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(entity_id, relation, cache_key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(scope.entity_id.to_string())
        .bind(&scope.relation)
        .bind(key)
        .bind(value)
        .bind(self.expiry())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn clear_scope(&self, scope: &CacheScope) -> Result<()> {
        sqlx::query("DELETE FROM dedupe_entries WHERE entity_id = ?1 AND relation = ?2")
            .bind(scope.entity_id.to_string())
            .bind(&scope.relation)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn clear_entity(&self, entity_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM dedupe_entries WHERE entity_id = ?1")
            .bind(entity_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
