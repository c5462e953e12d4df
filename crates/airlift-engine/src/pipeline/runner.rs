//! Pipeline execution
//!
//! One runner invocation drives one tracker: extract a page, gate each raw
//! record against the dedupe ledger, transform, load, mark seen, repeat until
//! the source is exhausted. The tracker row carries everything needed to
//! resume (status, cursor, counters); the runner itself keeps no state between
//! invocations.

use crate::cache::ledger::DedupeLedger;
use crate::cache::CacheScope;
use crate::context::PipelineContext;
use crate::entity::TrackerStatus;
use crate::error::{AirliftError, Result};
use crate::pipeline::{PipelineDescriptor, RunResult, RunStats};
use crate::store::StateStore;
use crate::transfer::TransferStep;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Executes pipeline descriptors against trackers
pub struct PipelineRunner {
    store: StateStore,
    ledger: Arc<dyn DedupeLedger>,
}

enum Processed {
    Loaded,
    Dropped,
}

impl PipelineRunner {
    pub fn new(store: StateStore, ledger: Arc<dyn DedupeLedger>) -> Self {
        Self { store, ledger }
    }

    /// Run one tracker to a terminal state. The returned result mirrors what
    /// was persisted on the tracker; an `Err` here means the state store
    /// itself failed.
    pub async fn run(
        &self,
        descriptor: &PipelineDescriptor,
        ctx: &PipelineContext,
    ) -> Result<RunResult> {
        info!(
            entity_id = %ctx.entity.id,
            relation = %ctx.relation,
            "Starting pipeline run"
        );

        self.store.start_tracker(ctx.tracker_id).await?;
        let tracker = self.store.tracker(ctx.entity.id, &ctx.relation).await?;
        let scope = CacheScope::new(ctx.entity.id, ctx.relation.clone());
        let mut stats = RunStats::default();

        let outcome = self
            .execute(descriptor, ctx, &scope, tracker.batch_cursor, &mut stats)
            .await;

        // after_run: the scratch directory is released on every exit path,
        // and archive members rejected by validation are folded into the
        // per-record failure counter.
        if let Some(mut state) = ctx.take_transfer_state() {
            stats.failed_records += state.rejected_members();
            state.advance(if outcome.is_ok() {
                TransferStep::Done
            } else {
                TransferStep::Failed
            });
            state.cleanup();
        }

        match outcome {
            Ok(()) => {
                self.store
                    .finish_tracker(ctx.tracker_id, stats.failed_records as i64)
                    .await?;
                info!(
                    entity_id = %ctx.entity.id,
                    relation = %ctx.relation,
                    loaded = stats.loaded,
                    cached_hits = stats.cached_hits,
                    failed_records = stats.failed_records,
                    "Pipeline run finished"
                );
                Ok(RunResult {
                    relation: ctx.relation.clone(),
                    status: TrackerStatus::Finished,
                    error: None,
                    stats,
                })
            }
            Err(err) => {
                let message = err.to_string();
                warn!(
                    entity_id = %ctx.entity.id,
                    relation = %ctx.relation,
                    error = %message,
                    "Pipeline run failed"
                );
                self.store
                    .fail_tracker(ctx.tracker_id, &message, stats.failed_records as i64)
                    .await?;
                Ok(RunResult {
                    relation: ctx.relation.clone(),
                    status: TrackerStatus::Failed,
                    error: Some(message),
                    stats,
                })
            }
        }
    }

    async fn execute(
        &self,
        descriptor: &PipelineDescriptor,
        ctx: &PipelineContext,
        scope: &CacheScope,
        mut cursor: Option<String>,
        stats: &mut RunStats,
    ) -> Result<()> {
        let ledger = self.ledger.as_ref();
        let mut index: u64 = 0;

        loop {
            ctx.ensure_active()?;
            let data = descriptor.extractor.extract(ctx, cursor.as_deref()).await?;
            stats.pages += 1;
            stats.extracted += data.records.len() as u64;
            let page_was_empty = data.records.is_empty();

            for record in &data.records {
                // Checked per record, not per page, so an abort lands promptly
                // even on a huge single batch.
                ctx.ensure_active()?;
                let record_index = index;
                index += 1;

                if descriptor
                    .cache_strategy
                    .seen(ledger, scope, record, record_index)
                    .await?
                {
                    stats.cached_hits += 1;
                    continue;
                }

                match self.process(descriptor, ctx, record).await {
                    Ok(Processed::Loaded) => {
                        stats.loaded += 1;
                        descriptor
                            .cache_strategy
                            .mark_seen(ledger, scope, record, record_index)
                            .await?;
                    }
                    Ok(Processed::Dropped) => {
                        // A dropped record is fully processed; retries skip it.
                        stats.dropped += 1;
                        descriptor
                            .cache_strategy
                            .mark_seen(ledger, scope, record, record_index)
                            .await?;
                    }
                    Err(err) if !descriptor.abort_on_failure && !fails_run(&err) => {
                        warn!(
                            relation = %ctx.relation,
                            record_index,
                            error = %err,
                            "Record failed, continuing"
                        );
                        stats.failed_records += 1;
                    }
                    Err(err) => return Err(err),
                }
            }

            match data.next_cursor {
                Some(next) if !page_was_empty => {
                    self.store
                        .update_tracker_cursor(ctx.tracker_id, Some(&next))
                        .await?;
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(())
    }

    async fn process(
        &self,
        descriptor: &PipelineDescriptor,
        ctx: &PipelineContext,
        record: &Value,
    ) -> Result<Processed> {
        match descriptor.run_transformers(ctx, record.clone())? {
            Some(loadable) => {
                descriptor.loader.load(ctx, &loadable).await?;
                Ok(Processed::Loaded)
            }
            None => Ok(Processed::Dropped),
        }
    }
}

/// Errors that fail the run regardless of the relation's record-failure
/// policy: cancellation, ledger loss and infrastructure faults would hit
/// every remaining record the same way.
fn fails_run(err: &AirliftError) -> bool {
    matches!(
        err,
        AirliftError::Aborted
            | AirliftError::CacheUnavailable(_)
            | AirliftError::Database(_)
            | AirliftError::Migrate(_)
            | AirliftError::Http(_)
            | AirliftError::Source(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_errors_always_fail_the_run() {
        assert!(fails_run(&AirliftError::Aborted));
        assert!(fails_run(&AirliftError::CacheUnavailable("down".into())));
        assert!(fails_run(&AirliftError::Source("HTTP 502".into())));

        assert!(!fails_run(&AirliftError::Load {
            relation: "uploads".into(),
            message: "bad file".into(),
        }));
        assert!(!fails_run(&AirliftError::MissingKey {
            relation: "labels".into(),
            field: "title".into(),
        }));
        assert!(!fails_run(&AirliftError::UnsafePath {
            path: "../x".into(),
            reason: "escape".into(),
        }));
    }
}
