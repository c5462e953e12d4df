//! Staged NDJSON extraction
//!
//! Relational exports arrive as a newline-delimited JSON dump, one record per
//! line, usually gzipped. The dump is downloaded into a private scratch
//! directory, inflated if needed and parsed into a single unpaginated batch.
//! The scratch directory is parked on the context so the runner's cleanup
//! hook removes it.

use crate::context::PipelineContext;
use crate::error::{AirliftError, Result};
use crate::extractors::export_relation_path;
use crate::pipeline::{ExtractedData, Extractor};
use crate::transfer::{archive, FileTransferState, TransferStep};
use async_trait::async_trait;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Downloads and parses one relation's NDJSON dump
pub struct NdjsonExtractor {
    relation: String,
}

impl NdjsonExtractor {
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
        }
    }

    async fn stage_and_parse(
        &self,
        ctx: &PipelineContext,
        state: &mut FileTransferState,
    ) -> Result<Vec<Value>> {
        let transfer = &ctx.config.transfer;
        let download_path = state.path().join(format!("{}.ndjson.gz", self.relation));
        let dump_path = state.path().join(format!("{}.ndjson", self.relation));

        ctx.ensure_active()?;
        state.advance(TransferStep::Downloading);
        ctx.client
            .download_relation(
                &export_relation_path(&ctx.entity, &self.relation),
                &download_path,
                transfer.max_download_bytes,
            )
            .await?;

        ctx.ensure_active()?;
        state.advance(TransferStep::Decompressing);
        let relation = self.relation.clone();
        let max_inflated = transfer.max_decompressed_bytes;
        let records = tokio::task::spawn_blocking(move || {
            let staged = stage_plain_ndjson(&download_path, &dump_path, max_inflated)?;
            parse_ndjson(&staged, &relation)
        })
        .await
        .map_err(|err| AirliftError::Extract {
            relation: self.relation.clone(),
            message: format!("staging task failed: {err}"),
        })??;

        state.advance(TransferStep::Done);
        Ok(records)
    }
}

#[async_trait]
impl Extractor for NdjsonExtractor {
    async fn extract(
        &self,
        ctx: &PipelineContext,
        _cursor: Option<&str>,
    ) -> Result<ExtractedData> {
        let mut state =
            FileTransferState::create(&ctx.config.transfer.scratch_root, &self.relation)?;

        match self.stage_and_parse(ctx, &mut state).await {
            Ok(records) => {
                debug!(relation = %self.relation, records = records.len(), "Parsed relation dump");
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

/// Inflate the download when it is gzipped, or use it as-is when plain.
/// Returns the path of the plain NDJSON file.
fn stage_plain_ndjson(download: &Path, dump: &Path, max_inflated: u64) -> Result<PathBuf> {
    let mut magic = [0u8; 2];
    let read = File::open(download)?.read(&mut magic)?;

    if read == 2 && magic == GZIP_MAGIC {
        archive::gunzip_file(download, dump, max_inflated)?;
        Ok(dump.to_path_buf())
    } else {
        Ok(download.to_path_buf())
    }
}

/// Parse one record per line; blank lines are allowed, malformed lines fail
/// the extraction.
fn parse_ndjson(path: &Path, relation: &str) -> Result<Vec<Value>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Value = serde_json::from_str(&line).map_err(|err| AirliftError::Extract {
            relation: relation.to_string(),
            message: format!("malformed NDJSON at line {}: {err}", number + 1),
        })?;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.ndjson");
        std::fs::write(&path, "{\"title\":\"bug\"}\n\n{\"title\":\"feature\"}\n").unwrap();

        let records = parse_ndjson(&path, "labels").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["title"], "feature");
    }

    #[test]
    fn test_parse_ndjson_reports_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.ndjson");
        std::fs::write(&path, "{\"title\":\"bug\"}\nnot json\n").unwrap();

        let err = parse_ndjson(&path, "labels").unwrap_err();
        match err {
            AirliftError::Extract { relation, message } => {
                assert_eq!(relation, "labels");
                assert!(message.contains("line 2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stage_detects_gzip_by_magic_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let download = dir.path().join("labels.ndjson.gz");
        let dump = dir.path().join("labels.ndjson");

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"title\":\"bug\"}\n").unwrap();
        std::fs::write(&download, encoder.finish().unwrap()).unwrap();

        let staged = stage_plain_ndjson(&download, &dump, 1024).unwrap();
        assert_eq!(staged, dump);
        assert_eq!(parse_ndjson(&staged, "labels").unwrap().len(), 1);
    }

    #[test]
    fn test_stage_passes_plain_dumps_through() {
        let dir = tempfile::tempdir().unwrap();
        let download = dir.path().join("labels.ndjson.gz");
        let dump = dir.path().join("labels.ndjson");
        std::fs::write(&download, "{\"title\":\"bug\"}\n").unwrap();

        let staged = stage_plain_ndjson(&download, &dump, 1024).unwrap();
        assert_eq!(staged, download);
    }
}
