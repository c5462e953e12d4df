//! Wiki repository loading
//!
//! The wiki arrives as a git bundle inside the relation archive. Applying the
//! bundle to a destination repository is git-transport work that lives behind
//! the [`BundleImporter`] boundary; this loader only validates the handoff and
//! records the imported bundle.

use crate::context::PipelineContext;
use crate::destination::{file_digest, DestinationStore};
use crate::entity::Entity;
use crate::error::{AirliftError, Result};
use crate::extractors::file::file_record_paths;
use crate::pipeline::Loader;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Applies a git bundle to the destination repository
#[async_trait]
pub trait BundleImporter: Send + Sync {
    async fn import_bundle(&self, entity: &Entity, bundle: &Path) -> anyhow::Result<()>;
}

/// Default importer: checks the bundle is a readable, non-empty file. The
/// actual git transport is deployment-specific and injected by the embedder.
pub struct VerifyingBundleImporter;

#[async_trait]
impl BundleImporter for VerifyingBundleImporter {
    async fn import_bundle(&self, entity: &Entity, bundle: &Path) -> anyhow::Result<()> {
        let metadata = tokio::fs::metadata(bundle)
            .await
            .with_context(|| format!("bundle {} is not readable", bundle.display()))?;
        anyhow::ensure!(
            metadata.len() > 0,
            "bundle {} for {} is empty",
            bundle.display(),
            entity.source_full_path
        );
        Ok(())
    }
}

/// Hands the extracted bundle to the importer and records the result
pub struct WikiLoader {
    destination: DestinationStore,
    importer: Arc<dyn BundleImporter>,
}

impl WikiLoader {
    pub fn new(destination: DestinationStore, importer: Arc<dyn BundleImporter>) -> Self {
        Self {
            destination,
            importer,
        }
    }
}

#[async_trait]
impl Loader for WikiLoader {
    async fn load(&self, ctx: &PipelineContext, record: &Value) -> Result<()> {
        let (source, relative) =
            file_record_paths(record).ok_or_else(|| AirliftError::MissingKey {
                relation: ctx.relation.clone(),
                field: "source_path".to_string(),
            })?;

        if !relative.ends_with(".bundle") {
            warn!(path = relative, "Wiki archive member is not a bundle, skipping");
            return Ok(());
        }

        let bundle = Path::new(source);
        self.importer
            .import_bundle(&ctx.entity, bundle)
            .await
            .map_err(AirliftError::Bundle)?;

        let (digest, size_bytes) = file_digest(bundle).await?;
        self.destination
            .record_wiki(ctx.entity.id, &digest, size_bytes)
            .await?;
        debug!(bundle = relative, size_bytes, "Imported wiki bundle");
        Ok(())
    }
}
