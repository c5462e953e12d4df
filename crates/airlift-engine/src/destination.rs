//! Destination-side persistence
//!
//! Loaders write through this store. Relational records land in SQLite keyed
//! by their natural unique key; binary payloads are copied under `files_root`
//! with a bookkeeping row. Every write is find-existing-else-create, so a
//! duplicate delivery that slips past the dedupe ledger still cannot create a
//! second destination row.

use crate::error::{AirliftError, Result};
use airlift_common::checksum;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Handle to the destination database and payload file tree
#[derive(Clone)]
pub struct DestinationStore {
    pool: SqlitePool,
    files_root: PathBuf,
}

impl DestinationStore {
    pub fn new(pool: SqlitePool, files_root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            files_root: files_root.into(),
        }
    }

    pub fn files_root(&self) -> &Path {
        &self.files_root
    }

    /// Insert a relational record unless its natural key already exists.
    /// Returns whether a row was created.
    pub async fn insert_record(
        &self,
        entity_id: Uuid,
        relation: &str,
        natural_key: &str,
        payload: &Value,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO destination_records (entity_id, relation, natural_key, payload, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(entity_id, relation, natural_key) DO NOTHING
            "#,
        )
        .bind(entity_id.to_string())
        .bind(relation)
        .bind(natural_key)
        .bind(payload.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        if !created {
            debug!(relation, natural_key, "Record already present, skipping");
        }
        Ok(created)
    }

    pub async fn record(
        &self,
        entity_id: Uuid,
        relation: &str,
        natural_key: &str,
    ) -> Result<Option<Value>> {
        let row = sqlx::query(
            r#"
            SELECT payload FROM destination_records
            WHERE entity_id = ?1 AND relation = ?2 AND natural_key = ?3
            "#,
        )
        .bind(entity_id.to_string())
        .bind(relation)
        .bind(natural_key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let payload: String = row.try_get("payload")?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }

    pub async fn record_count(&self, entity_id: Uuid, relation: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM destination_records WHERE entity_id = ?1 AND relation = ?2",
        )
        .bind(entity_id.to_string())
        .bind(relation)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("n")?)
    }

    /// Copy an uploaded file under `files_root/uploads/<entity>/<secret>/` and
    /// record it. Returns whether the upload was new.
    pub async fn store_upload(
        &self,
        entity_id: Uuid,
        secret: &str,
        filename: &str,
        source: &Path,
    ) -> Result<bool> {
        let existing = sqlx::query(
            r#"
            SELECT 1 AS present FROM destination_uploads
            WHERE entity_id = ?1 AND secret = ?2 AND filename = ?3
            "#,
        )
        .bind(entity_id.to_string())
        .bind(secret)
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;
        if existing.is_some() {
            debug!(secret, filename, "Upload already present, skipping");
            return Ok(false);
        }

        let (digest, size_bytes) = file_digest(source).await?;
        let stored = self
            .files_root
            .join("uploads")
            .join(entity_id.to_string())
            .join(secret)
            .join(filename);
        copy_into_place(source, &stored).await?;

        sqlx::query(
            r#"
            INSERT INTO destination_uploads
                (entity_id, secret, filename, size_bytes, digest, stored_path, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(entity_id, secret, filename) DO NOTHING
            "#,
        )
        .bind(entity_id.to_string())
        .bind(secret)
        .bind(filename)
        .bind(size_bytes)
        .bind(&digest)
        .bind(stored.to_string_lossy().into_owned())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    pub async fn upload_count(&self, entity_id: Uuid) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM destination_uploads WHERE entity_id = ?1")
            .bind(entity_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Copy the entity avatar under `files_root/avatars/<entity>/`. An entity
    /// has one avatar; a re-run replaces it in place.
    pub async fn store_avatar(
        &self,
        entity_id: Uuid,
        filename: &str,
        source: &Path,
    ) -> Result<()> {
        let (digest, size_bytes) = file_digest(source).await?;
        let stored = self
            .files_root
            .join("avatars")
            .join(entity_id.to_string())
            .join(filename);
        copy_into_place(source, &stored).await?;

        sqlx::query(
            r#"
            INSERT INTO destination_avatars
                (entity_id, filename, size_bytes, digest, stored_path, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(entity_id) DO UPDATE SET
                filename = excluded.filename,
                size_bytes = excluded.size_bytes,
                digest = excluded.digest,
                stored_path = excluded.stored_path
            "#,
        )
        .bind(entity_id.to_string())
        .bind(filename)
        .bind(size_bytes)
        .bind(&digest)
        .bind(stored.to_string_lossy().into_owned())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn avatar_filename(&self, entity_id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query("SELECT filename FROM destination_avatars WHERE entity_id = ?1")
            .bind(entity_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row.try_get("filename").map_err(AirliftError::from))
            .transpose()
    }

    /// Content-addressed LFS object store: an object is identified by its
    /// digest and size, shared across entities. Returns whether the object
    /// was new.
    pub async fn store_lfs_object(&self, oid: &str, size_bytes: i64, source: &Path) -> Result<bool> {
        if self.lfs_object_exists(oid, size_bytes).await? {
            debug!(oid, size_bytes, "LFS object already present, skipping copy");
            return Ok(false);
        }

        let (shard_a, shard_b) = oid
            .get(0..2)
            .zip(oid.get(2..4))
            .ok_or_else(|| AirliftError::InvalidState(format!("malformed LFS oid: {oid}")))?;
        let stored = self
            .files_root
            .join("lfs")
            .join(shard_a)
            .join(shard_b)
            .join(oid);
        copy_into_place(source, &stored).await?;

        sqlx::query(
            r#"
            INSERT INTO lfs_objects (oid, size_bytes, stored_path, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(oid, size_bytes) DO NOTHING
            "#,
        )
        .bind(oid)
        .bind(size_bytes)
        .bind(stored.to_string_lossy().into_owned())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    pub async fn lfs_object_exists(&self, oid: &str, size_bytes: i64) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS present FROM lfs_objects WHERE oid = ?1 AND size_bytes = ?2")
            .bind(oid)
            .bind(size_bytes)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Attach an LFS object to one of the entity's repository types. Returns
    /// whether the link was new.
    pub async fn link_lfs_object(
        &self,
        entity_id: Uuid,
        oid: &str,
        repository_type: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO lfs_links (entity_id, oid, repository_type, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(entity_id, oid, repository_type) DO NOTHING
            "#,
        )
        .bind(entity_id.to_string())
        .bind(oid)
        .bind(repository_type)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn lfs_links_for(&self, entity_id: Uuid) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT oid, repository_type FROM lfs_links
            WHERE entity_id = ?1
            ORDER BY oid, repository_type
            "#,
        )
        .bind(entity_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("oid")?,
                    row.try_get::<String, _>("repository_type")?,
                ))
            })
            .collect()
    }

    /// Record an imported wiki repository bundle
    pub async fn record_wiki(&self, entity_id: Uuid, digest: &str, size_bytes: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wiki_repositories (entity_id, bundle_digest, size_bytes, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(entity_id) DO UPDATE SET
                bundle_digest = excluded.bundle_digest,
                size_bytes = excluded.size_bytes
            "#,
        )
        .bind(entity_id.to_string())
        .bind(digest)
        .bind(size_bytes)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn wiki_repository(&self, entity_id: Uuid) -> Result<Option<(String, i64)>> {
        let row = sqlx::query(
            "SELECT bundle_digest, size_bytes FROM wiki_repositories WHERE entity_id = ?1",
        )
        .bind(entity_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok((
                row.try_get::<String, _>("bundle_digest")?,
                row.try_get::<i64, _>("size_bytes")?,
            ))
        })
        .transpose()
    }

    /// Remove everything loaded for one entity. Shared LFS objects stay; only
    /// the entity's links to them are dropped.
    pub async fn purge_entity(&self, entity_id: Uuid) -> Result<()> {
        let id = entity_id.to_string();
        for table in [
            "destination_records",
            "destination_uploads",
            "destination_avatars",
            "lfs_links",
            "wiki_repositories",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE entity_id = ?1"))
                .bind(&id)
                .execute(&self.pool)
                .await?;
        }

        for subdir in ["uploads", "avatars"] {
            let dir = self.files_root.join(subdir).join(&id);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        debug!(entity_id = %entity_id, "Purged destination data");
        Ok(())
    }
}

/// Digest and size of a file, computed off the async runtime
pub(crate) async fn file_digest(path: &Path) -> Result<(String, i64)> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(String, i64)> {
        let size = std::fs::metadata(&path)?.len() as i64;
        let digest = checksum::compute_file_checksum(&path)?;
        Ok((digest, size))
    })
    .await
    .map_err(|err| AirliftError::Io(std::io::Error::other(format!("checksum task failed: {err}"))))?
}

async fn copy_into_place(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(source, dest).await?;
    Ok(())
}
