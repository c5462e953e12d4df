//! Per-run pipeline context

use crate::client::SourceClient;
use crate::config::EngineConfig;
use crate::entity::Entity;
use crate::error::{AirliftError, Result};
use crate::transfer::FileTransferState;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything a pipeline stage may reach during one tracker run.
///
/// Cheap to clone: the entity snapshot is small and the rest are handles.
#[derive(Clone)]
pub struct PipelineContext {
    pub entity: Entity,
    pub tracker_id: Uuid,
    pub relation: String,
    pub client: Arc<dyn SourceClient>,
    pub config: Arc<EngineConfig>,
    cancel: CancellationToken,
    /// Scratch state parked by a file extractor until the runner's after_run
    /// hook fires
    transfer: Arc<Mutex<Option<FileTransferState>>>,
}

impl PipelineContext {
    pub fn new(
        entity: Entity,
        tracker_id: Uuid,
        relation: impl Into<String>,
        client: Arc<dyn SourceClient>,
        config: Arc<EngineConfig>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            entity,
            tracker_id,
            relation: relation.into(),
            client,
            config,
            cancel,
            transfer: Arc::new(Mutex::new(None)),
        }
    }

    /// Error out if the run has been aborted. Checked between records so an
    /// abort lands at a record boundary, never mid-load.
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(AirliftError::Aborted)
        } else {
            Ok(())
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Park transfer scratch state for cleanup at the end of the run. A
    /// replaced state (one run creates at most one) is cleaned up immediately.
    pub fn store_transfer_state(&self, state: FileTransferState) {
        if let Ok(mut slot) = self.transfer.lock() {
            if let Some(previous) = slot.replace(state) {
                previous.cleanup();
            }
        }
    }

    /// Take ownership of any parked transfer state
    pub fn take_transfer_state(&self) -> Option<FileTransferState> {
        self.transfer.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Page;
    use crate::entity::{EntityKind, EntityStatus};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::Path;

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

    fn entity() -> Entity {
        Entity {
            id: Uuid::new_v4(),
            kind: EntityKind::Group,
            status: EntityStatus::Started,
            source_full_path: "acme/widgets".to_string(),
            destination_slug: "acme-widgets".to_string(),
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_ensure_active_tracks_cancellation() {
        let cancel = CancellationToken::new();
        let ctx = PipelineContext::new(
            entity(),
            Uuid::new_v4(),
            "labels",
            Arc::new(NullClient),
            Arc::new(EngineConfig::default()),
            cancel.clone(),
        );

        assert!(ctx.ensure_active().is_ok());
        cancel.cancel();
        assert!(matches!(ctx.ensure_active(), Err(AirliftError::Aborted)));
    }

    #[test]
    fn test_transfer_slot_is_shared_across_clones() {
        let ctx = PipelineContext::new(
            entity(),
            Uuid::new_v4(),
            "uploads",
            Arc::new(NullClient),
            Arc::new(EngineConfig::default()),
            CancellationToken::new(),
        );

        let scratch_root = tempfile::tempdir().unwrap();
        let state = FileTransferState::create(scratch_root.path(), "uploads").unwrap();
        ctx.clone().store_transfer_state(state);

        assert!(ctx.take_transfer_state().is_some());
        assert!(ctx.take_transfer_state().is_none());
    }
}
