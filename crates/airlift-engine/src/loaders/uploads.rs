//! Uploaded file loading
//!
//! Extracted upload trees carry their routing in the path itself: the entity
//! avatar lives under an `avatar/` directory, everything else under a 32-hex
//! secret that namespaces one attachment. Files matching neither pattern are
//! logged and skipped; an unroutable file must not sink the whole relation.

use crate::context::PipelineContext;
use crate::destination::DestinationStore;
use crate::error::{AirliftError, Result};
use crate::extractors::file::file_record_paths;
use crate::pipeline::Loader;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// Routes validated upload files to the avatar or attachment store
pub struct UploadsLoader {
    destination: DestinationStore,
    avatar_pattern: Regex,
    upload_pattern: Regex,
}

impl UploadsLoader {
    pub fn new(destination: DestinationStore) -> Result<Self> {
        let avatar_pattern = Regex::new(r"(^|/)avatar/(?P<identifier>.+)$")
            .map_err(|e| AirliftError::Config(format!("avatar pattern: {e}")))?;
        let upload_pattern = Regex::new(r"(^|/)(?P<secret>[0-9a-f]{32})/(?P<identifier>.+)$")
            .map_err(|e| AirliftError::Config(format!("upload pattern: {e}")))?;

        Ok(Self {
            destination,
            avatar_pattern,
            upload_pattern,
        })
    }
}

#[async_trait]
impl Loader for UploadsLoader {
    async fn load(&self, ctx: &PipelineContext, record: &Value) -> Result<()> {
        let (source, relative) =
            file_record_paths(record).ok_or_else(|| AirliftError::MissingKey {
                relation: ctx.relation.clone(),
                field: "source_path".to_string(),
            })?;
        let source = Path::new(source);

        if let Some(captures) = self.avatar_pattern.captures(relative) {
            let identifier = &captures["identifier"];
            self.destination
                .store_avatar(ctx.entity.id, identifier, source)
                .await?;
            debug!(identifier, "Loaded avatar");
            return Ok(());
        }

        if let Some(captures) = self.upload_pattern.captures(relative) {
            let secret = &captures["secret"];
            let identifier = &captures["identifier"];
            let created = self
                .destination
                .store_upload(ctx.entity.id, secret, identifier, source)
                .await?;
            debug!(secret, identifier, created, "Loaded upload");
            return Ok(());
        }

        warn!(path = relative, "Upload file matches no routing pattern, skipping");
        Ok(())
    }
}
