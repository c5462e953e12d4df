//! LFS object loading
//!
//! An LFS archive holds the object payloads plus one `lfs_objects.json`
//! manifest mapping member filename to the repository types the object is
//! attached to. Objects are content-addressed: identity is the computed
//! SHA-256 digest plus size, never the member filename, so a payload shared
//! by several entities is stored once and only linked again.

use crate::context::PipelineContext;
use crate::destination::{file_digest, DestinationStore};
use crate::error::{AirliftError, Result};
use crate::extractors::file::file_record_paths;
use crate::pipeline::Loader;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Manifest member mapping filenames to repository-type tags
pub const MANIFEST_FILE: &str = "lfs_objects.json";

const VALID_REPOSITORY_TYPES: [&str; 3] = ["project", "wiki", "design"];

/// Stores LFS payloads and their repository-type links
pub struct LfsObjectsLoader {
    destination: DestinationStore,
}

impl LfsObjectsLoader {
    pub fn new(destination: DestinationStore) -> Self {
        Self { destination }
    }

    async fn manifest_for(&self, ctx: &PipelineContext, source: &Path) -> Result<HashMap<String, Value>> {
        let manifest_path = source
            .parent()
            .map(|dir| dir.join(MANIFEST_FILE))
            .filter(|path| path.is_file())
            .ok_or_else(|| AirliftError::Load {
                relation: ctx.relation.clone(),
                message: format!("missing {MANIFEST_FILE} manifest"),
            })?;

        let raw = tokio::fs::read_to_string(&manifest_path).await?;
        serde_json::from_str(&raw).map_err(|err| AirliftError::Load {
            relation: ctx.relation.clone(),
            message: format!("malformed {MANIFEST_FILE}: {err}"),
        })
    }

    async fn link_repository_types(
        &self,
        ctx: &PipelineContext,
        oid: &str,
        filename: &str,
        declared: Option<&Value>,
    ) -> Result<()> {
        let types = match declared {
            Some(Value::Array(types)) => types.as_slice(),
            // A null entry stores the object without attaching it anywhere.
            Some(Value::Null) => &[],
            Some(other) => {
                warn!(filename, entry = %other, "Malformed manifest entry, not linking");
                &[]
            }
            None => {
                warn!(filename, "Object missing from manifest, not linking");
                &[]
            }
        };

        for declared_type in types {
            let Some(repository_type) = declared_type.as_str() else {
                warn!(filename, entry = %declared_type, "Non-string repository type, skipping");
                continue;
            };
            if !VALID_REPOSITORY_TYPES.contains(&repository_type) {
                warn!(filename, repository_type, "Unknown repository type, skipping");
                continue;
            }
            self.destination
                .link_lfs_object(ctx.entity.id, oid, repository_type)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Loader for LfsObjectsLoader {
    async fn load(&self, ctx: &PipelineContext, record: &Value) -> Result<()> {
        let (source, relative) =
            file_record_paths(record).ok_or_else(|| AirliftError::MissingKey {
                relation: ctx.relation.clone(),
                field: "source_path".to_string(),
            })?;
        let source = Path::new(source);
        let filename = relative.rsplit('/').next().unwrap_or(relative);

        if filename == MANIFEST_FILE {
            debug!("Skipping manifest member");
            return Ok(());
        }

        let manifest = self.manifest_for(ctx, source).await?;
        let (oid, size_bytes) = file_digest(source).await?;

        let stored = self.destination.store_lfs_object(&oid, size_bytes, source).await?;
        debug!(oid = %oid, size_bytes, stored, "Loaded LFS object");

        self.link_repository_types(ctx, &oid, filename, manifest.get(filename))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Page, SourceClient};
    use crate::config::EngineConfig;
    use crate::entity::{Entity, EntityKind, EntityStatus};
    use crate::store::StateStore;
    use airlift_common::checksum::sha256_hex;
    use chrono::Utc;
    use serde_json::json;
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

    fn ctx(entity_id: Uuid) -> PipelineContext {
        let entity = Entity {
            id: entity_id,
            kind: EntityKind::Project,
            status: EntityStatus::Started,
            source_full_path: "acme/widgets".to_string(),
            destination_slug: "acme-widgets".to_string(),
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        PipelineContext::new(
            entity,
            Uuid::new_v4(),
            "lfs_objects",
            Arc::new(NullClient),
            Arc::new(EngineConfig::default()),
            CancellationToken::new(),
        )
    }

    fn extracted_tree(manifest: &Value, objects: &[(&str, &[u8])]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            serde_json::to_string(manifest).unwrap(),
        )
        .unwrap();
        for (name, content) in objects {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    fn record_for(dir: &Path, name: &str) -> Value {
        json!({
            "source_path": dir.join(name).to_string_lossy(),
            "relative_path": name,
        })
    }

    async fn loader() -> (StateStore, tempfile::TempDir, DestinationStore, LfsObjectsLoader) {
        let store = StateStore::in_memory().await.unwrap();
        let files = tempfile::tempdir().unwrap();
        let destination = DestinationStore::new(store.pool().clone(), files.path());
        let loader = LfsObjectsLoader::new(destination.clone());
        (store, files, destination, loader)
    }

    #[tokio::test]
    async fn test_objects_link_per_manifest_and_null_skips_links() {
        let (_store, _files, destination, loader) = loader().await;
        let tree = extracted_tree(
            &json!({"oid1": ["project"], "oid2": null}),
            &[("oid1", b"first"), ("oid2", b"second")],
        );
        let entity_id = Uuid::new_v4();
        let ctx = ctx(entity_id);

        loader.load(&ctx, &record_for(tree.path(), "oid1")).await.unwrap();
        loader.load(&ctx, &record_for(tree.path(), "oid2")).await.unwrap();

        let expected_oid = sha256_hex(b"first");
        assert_eq!(
            destination.lfs_links_for(entity_id).await.unwrap(),
            vec![(expected_oid.clone(), "project".to_string())]
        );
        assert!(destination
            .lfs_object_exists(&sha256_hex(b"second"), 6)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_manifest_member_is_skipped() {
        let (_store, _files, destination, loader) = loader().await;
        let tree = extracted_tree(&json!({}), &[]);
        let entity_id = Uuid::new_v4();

        loader
            .load(&ctx(entity_id), &record_for(tree.path(), MANIFEST_FILE))
            .await
            .unwrap();

        assert!(destination.lfs_links_for(entity_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_repository_types_are_skipped() {
        let (_store, _files, destination, loader) = loader().await;
        let tree = extracted_tree(
            &json!({"oid1": ["project", "mystery", 42]}),
            &[("oid1", b"payload")],
        );
        let entity_id = Uuid::new_v4();

        loader
            .load(&ctx(entity_id), &record_for(tree.path(), "oid1"))
            .await
            .unwrap();

        let links = destination.lfs_links_for(entity_id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].1, "project");
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_the_record() {
        let (_store, _files, _destination, loader) = loader().await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("oid1"), b"payload").unwrap();

        let err = loader
            .load(&ctx(Uuid::new_v4()), &record_for(dir.path(), "oid1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AirliftError::Load { .. }));
    }
}
