//! Relational record loading

use crate::context::PipelineContext;
use crate::destination::DestinationStore;
use crate::error::{AirliftError, Result};
use crate::pipeline::Loader;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Persists records keyed by one natural-key field.
///
/// The write is find-existing-else-create, so even a duplicate delivery that
/// slips past the dedupe ledger cannot create a second row with the same key.
pub struct RecordLoader {
    destination: DestinationStore,
    key_field: String,
}

impl RecordLoader {
    pub fn new(destination: DestinationStore, key_field: impl Into<String>) -> Self {
        Self {
            destination,
            key_field: key_field.into(),
        }
    }

    fn natural_key(&self, ctx: &PipelineContext, record: &Value) -> Result<String> {
        let missing = || AirliftError::MissingKey {
            relation: ctx.relation.clone(),
            field: self.key_field.clone(),
        };

        match record.get(&self.key_field) {
            Some(Value::String(key)) if !key.is_empty() => Ok(key.clone()),
            Some(Value::Number(key)) => Ok(key.to_string()),
            _ => Err(missing()),
        }
    }
}

#[async_trait]
impl Loader for RecordLoader {
    async fn load(&self, ctx: &PipelineContext, record: &Value) -> Result<()> {
        let key = self.natural_key(ctx, record)?;
        let created = self
            .destination
            .insert_record(ctx.entity.id, &ctx.relation, &key, record)
            .await?;
        debug!(relation = %ctx.relation, key, created, "Loaded record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Page, SourceClient};
    use crate::config::EngineConfig;
    use crate::entity::{Entity, EntityKind, EntityStatus};
    use crate::store::StateStore;
    use chrono::Utc;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    struct NullClient;

    #[async_trait]
    impl SourceClient for NullClient {
        async fn fetch_page(&self, _path: &str, _cursor: Option<&str>) -> Result<Page> {
            Ok(Page {
                records: vec![],
                next_cursor: None,
            })
        }

        async fn download_relation(
            &self,
            _path: &str,
            _dest: &Path,
            _max_bytes: u64,
        ) -> Result<u64> {
            Ok(0)
        }
    }

    fn ctx(entity_id: Uuid, relation: &str) -> PipelineContext {
        let entity = Entity {
            id: entity_id,
            kind: EntityKind::Group,
            status: EntityStatus::Started,
            source_full_path: "acme".to_string(),
            destination_slug: "acme".to_string(),
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        PipelineContext::new(
            entity,
            Uuid::new_v4(),
            relation,
            Arc::new(NullClient),
            Arc::new(EngineConfig::default()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_load_is_idempotent_on_natural_key() {
        let store = StateStore::in_memory().await.unwrap();
        let files = tempfile::tempdir().unwrap();
        let destination = DestinationStore::new(store.pool().clone(), files.path());
        let loader = RecordLoader::new(destination.clone(), "title");

        let entity_id = Uuid::new_v4();
        let ctx = ctx(entity_id, "labels");
        let record = json!({"title": "bug", "color": "#ff0000"});

        loader.load(&ctx, &record).await.unwrap();
        loader.load(&ctx, &record).await.unwrap();

        assert_eq!(destination.record_count(entity_id, "labels").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_load_rejects_missing_key() {
        let store = StateStore::in_memory().await.unwrap();
        let files = tempfile::tempdir().unwrap();
        let destination = DestinationStore::new(store.pool().clone(), files.path());
        let loader = RecordLoader::new(destination, "title");

        let ctx = ctx(Uuid::new_v4(), "labels");
        let err = loader.load(&ctx, &json!({"color": "#ff0000"})).await.unwrap_err();
        assert!(matches!(
            err,
            AirliftError::MissingKey { ref field, .. } if field == "title"
        ));

        let err = loader.load(&ctx, &json!({"title": ""})).await.unwrap_err();
        assert!(matches!(err, AirliftError::MissingKey { .. }));
    }

    #[tokio::test]
    async fn test_numeric_keys_are_accepted() {
        let store = StateStore::in_memory().await.unwrap();
        let files = tempfile::tempdir().unwrap();
        let destination = DestinationStore::new(store.pool().clone(), files.path());
        let loader = RecordLoader::new(destination.clone(), "iid");

        let entity_id = Uuid::new_v4();
        let ctx = ctx(entity_id, "milestones");
        loader.load(&ctx, &json!({"iid": 7, "title": "v1"})).await.unwrap();

        assert!(destination
            .record(entity_id, "milestones", "7")
            .await
            .unwrap()
            .is_some());
    }
}
