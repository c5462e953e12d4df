//! Archive extraction for binary relations
//!
//! Runs the download → decompress → extract → validate flow and emits one
//! record per validated file. Loaders receive the file's resolved location
//! plus its archive-relative path, which carries the routing information
//! (avatar prefix, dynamic upload secret, LFS oid).

use crate::context::PipelineContext;
use crate::error::{AirliftError, Result};
use crate::extractors::export_relation_path;
use crate::pipeline::{ExtractedData, Extractor};
use crate::transfer::{archive, FileTransferState, TransferStep};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Record field holding the validated absolute path
pub const SOURCE_PATH_FIELD: &str = "source_path";
/// Record field holding the archive-relative path
pub const RELATIVE_PATH_FIELD: &str = "relative_path";

/// Downloads one relation archive and emits its validated file tree
pub struct FileExtractor {
    relation: String,
}

impl FileExtractor {
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
        }
    }

    async fn run_transfer(
        &self,
        ctx: &PipelineContext,
        state: &mut FileTransferState,
    ) -> Result<Vec<Value>> {
        let transfer = &ctx.config.transfer;

        ctx.ensure_active()?;
        state.advance(TransferStep::Downloading);
        ctx.client
            .download_relation(
                &export_relation_path(&ctx.entity, &self.relation),
                &state.archive_path(),
                transfer.max_download_bytes,
            )
            .await?;

        ctx.ensure_active()?;
        state.advance(TransferStep::Decompressing);
        let archive_path = state.archive_path();
        let tar_path = state.tar_path();
        let max_inflated = transfer.max_decompressed_bytes;
        self.blocking(tokio::task::spawn_blocking(move || {
            archive::gunzip_file(&archive_path, &tar_path, max_inflated)
        })
        .await)??;

        ctx.ensure_active()?;
        state.advance(TransferStep::Extracting);
        let tar_path = state.tar_path();
        let extracted_dir = state.extracted_dir();
        let report = self.blocking(tokio::task::spawn_blocking(move || {
            archive::extract_validated(&tar_path, &extracted_dir)
        })
        .await)??;

        if report.rejected > 0 {
            warn!(
                relation = %self.relation,
                rejected = report.rejected,
                "Archive members failed validation"
            );
        }
        state.add_rejected(report.rejected);
        state.advance(TransferStep::Loading(report.files.len() as u64));

        Ok(report
            .files
            .into_iter()
            .map(|file| {
                json!({
                    SOURCE_PATH_FIELD: file.absolute.to_string_lossy(),
                    RELATIVE_PATH_FIELD: file.relative,
                })
            })
            .collect())
    }

    fn blocking<T>(&self, joined: std::result::Result<T, tokio::task::JoinError>) -> Result<T> {
        joined.map_err(|err| AirliftError::Extract {
            relation: self.relation.clone(),
            message: format!("transfer task failed: {err}"),
        })
    }
}

#[async_trait]
impl Extractor for FileExtractor {
    async fn extract(
        &self,
        ctx: &PipelineContext,
        _cursor: Option<&str>,
    ) -> Result<ExtractedData> {
        let mut state =
            FileTransferState::create(&ctx.config.transfer.scratch_root, &self.relation)?;

        match self.run_transfer(ctx, &mut state).await {
            Ok(records) => {
                debug!(relation = %self.relation, files = records.len(), "Archive staged for loading");
                ctx.store_transfer_state(state);
                Ok(ExtractedData::batch(records))
            }
            Err(err) => {
                state.advance(TransferStep::Failed);
                ctx.store_transfer_state(state);
                Err(err)
            }
        }
    }
}

/// Pull the two path fields out of a file record
pub fn file_record_paths(record: &Value) -> Option<(&str, &str)> {
    let source = record.get(SOURCE_PATH_FIELD)?.as_str()?;
    let relative = record.get(RELATIVE_PATH_FIELD)?.as_str()?;
    Some((source, relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record_paths() {
        let record = json!({
            SOURCE_PATH_FIELD: "/tmp/scratch/extracted/avatar/logo.png",
            RELATIVE_PATH_FIELD: "avatar/logo.png",
        });

        let (source, relative) = file_record_paths(&record).unwrap();
        assert!(source.ends_with("avatar/logo.png"));
        assert_eq!(relative, "avatar/logo.png");

        assert!(file_record_paths(&json!({"other": 1})).is_none());
    }
}
