//! Migration service
//!
//! The service owns the long-lived handles (state store, ledger, registry,
//! source client) and exposes the operations the CLI and embedding callers
//! drive: create an entity, run it, abort it, inspect it, delete it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::ledger::DedupeLedger;
use crate::cache::SqliteLedger;
use crate::client::{HttpSourceClient, SourceClient};
use crate::config::EngineConfig;
use crate::context::PipelineContext;
use crate::destination::DestinationStore;
use crate::entity::{Entity, EntityKind, EntityStatusReport, TrackerStatus};
use crate::error::{AirliftError, Result};
use crate::finisher::EntityFinisher;
use crate::loaders::{BundleImporter, VerifyingBundleImporter};
use crate::pipeline::{PipelineRegistry, PipelineRunner, RunResult};
use crate::store::StateStore;

const ABORT_MESSAGE: &str = "aborted by operator";

pub struct MigrationService {
    store: StateStore,
    destination: DestinationStore,
    ledger: Arc<dyn DedupeLedger>,
    client: Arc<dyn SourceClient>,
    registry: Arc<PipelineRegistry>,
    runner: Arc<PipelineRunner>,
    finisher: EntityFinisher,
    config: Arc<EngineConfig>,
    /// Cancellation handles for entities currently running in this process
    active: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl MigrationService {
    /// Open the state database and wire up the production stack.
    pub async fn new(config: EngineConfig) -> Result<Self> {
        let store = StateStore::connect(&config.database).await?;
        let ledger = SqliteLedger::new(store.pool().clone(), config.cache.ttl_hours);
        ledger.purge_expired().await?;

        let destination =
            DestinationStore::new(store.pool().clone(), config.destination.files_root.clone());
        let client = Arc::new(HttpSourceClient::new(&config.source)?);

        Self::with_parts(
            store,
            Arc::new(ledger),
            destination,
            client,
            Arc::new(VerifyingBundleImporter),
            Arc::new(config),
        )
    }

    /// Assemble a service from pre-built parts. Lets callers substitute the
    /// source client, ledger or bundle importer.
    pub fn with_parts(
        store: StateStore,
        ledger: Arc<dyn DedupeLedger>,
        destination: DestinationStore,
        client: Arc<dyn SourceClient>,
        importer: Arc<dyn BundleImporter>,
        config: Arc<EngineConfig>,
    ) -> Result<Self> {
        let registry = Arc::new(PipelineRegistry::build(destination.clone(), importer)?);
        let runner = Arc::new(PipelineRunner::new(store.clone(), ledger.clone()));
        let finisher = EntityFinisher::new(store.clone());

        Ok(Self {
            store,
            destination,
            ledger,
            client,
            registry,
            runner,
            finisher,
            config,
            active: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    /// Register a migration entity along with one tracker per relation its
    /// kind migrates.
    pub async fn create_entity(
        &self,
        kind: EntityKind,
        source_full_path: &str,
        destination_slug: &str,
    ) -> Result<Entity> {
        let entity = self
            .store
            .create_entity(kind, source_full_path, destination_slug)
            .await?;

        let relations = self.registry.relations(kind);
        for relation in &relations {
            self.store.create_tracker(entity.id, relation).await?;
        }

        info!(
            entity_id = %entity.id,
            source = source_full_path,
            relations = relations.len(),
            "Entity created"
        );
        Ok(entity)
    }

    /// Run every unfinished tracker of an entity to a terminal state and
    /// settle the entity. Trackers run concurrently; each settles its own
    /// row, so a crash midway leaves a resumable mix of finished and open
    /// trackers.
    pub async fn run_entity(&self, entity_id: Uuid) -> Result<EntityStatusReport> {
        let entity = self.store.entity(entity_id).await?;
        if entity.status.is_terminal() {
            warn!(entity_id = %entity_id, status = entity.status.as_str(), "Entity already settled, nothing to run");
            return self.status(entity_id).await;
        }

        self.store.start_entity(entity_id).await?;
        let entity = self.store.entity(entity_id).await?;

        // Finished trackers stay finished; everything else (enqueued, failed,
        // or stale started rows from a crashed run) is executed. The dedupe
        // ledger makes the re-execution skip records already loaded.
        let pending: Vec<_> = self
            .store
            .trackers_for_entity(entity_id)
            .await?
            .into_iter()
            .filter(|t| t.status != TrackerStatus::Finished)
            .collect();

        let mut runs = Vec::with_capacity(pending.len());
        for tracker in &pending {
            let descriptor = self.registry.get(entity.kind, &tracker.relation)?.clone();
            runs.push((descriptor, tracker.id, tracker.relation.clone()));
        }

        let cancel = self.checkout_token(entity_id);
        let mut set = JoinSet::new();
        for (descriptor, tracker_id, relation) in runs {
            let ctx = PipelineContext::new(
                entity.clone(),
                tracker_id,
                relation,
                self.client.clone(),
                self.config.clone(),
                cancel.clone(),
            );
            let runner = self.runner.clone();
            set.spawn(async move { runner.run(&descriptor, &ctx).await });
        }

        let outcome = self.drive(&mut set, entity_id).await;
        self.release_token(entity_id);
        outcome?;

        self.finisher.finish(entity_id).await?;
        self.status(entity_id).await
    }

    async fn drive(
        &self,
        set: &mut JoinSet<Result<RunResult>>,
        entity_id: Uuid,
    ) -> Result<()> {
        while let Some(joined) = set.join_next().await {
            let result = joined
                .map_err(|e| AirliftError::InvalidState(format!("pipeline task failed: {e}")))??;
            debug!(
                entity_id = %entity_id,
                relation = %result.relation,
                status = result.status.as_str(),
                "Tracker settled"
            );
            // Whichever invocation sees the last tracker settle moves the
            // entity; the rest are no-ops.
            self.finisher.finish(entity_id).await?;
        }
        Ok(())
    }

    /// Run a single relation's tracker, then give the finisher a chance to
    /// settle the entity.
    pub async fn run_tracker(&self, entity_id: Uuid, relation: &str) -> Result<RunResult> {
        let entity = self.store.entity(entity_id).await?;
        if entity.status.is_terminal() {
            return Err(AirliftError::InvalidState(format!(
                "entity {entity_id} is already {}",
                entity.status.as_str()
            )));
        }

        let tracker = self.store.tracker(entity_id, relation).await?;
        let descriptor = self.registry.get(entity.kind, relation)?.clone();

        self.store.start_entity(entity_id).await?;
        let cancel = self.checkout_token(entity_id);
        let ctx = PipelineContext::new(
            entity,
            tracker.id,
            relation,
            self.client.clone(),
            self.config.clone(),
            cancel,
        );

        let outcome = self.runner.run(&descriptor, &ctx).await;
        self.release_token(entity_id);
        let result = outcome?;

        self.finisher.finish(entity_id).await?;
        Ok(result)
    }

    /// Abort an entity: signal any in-process pipelines, then force every
    /// open tracker and the entity itself to failed so the record is terminal
    /// even if nothing was running here.
    pub async fn abort(&self, entity_id: Uuid) -> Result<EntityStatusReport> {
        if let Some(token) = self.lock_active().remove(&entity_id) {
            token.cancel();
        }

        let swept = self
            .store
            .fail_nonterminal_trackers(entity_id, ABORT_MESSAGE)
            .await?;
        let failed = self.store.fail_entity(entity_id, ABORT_MESSAGE).await?;
        if failed {
            warn!(entity_id = %entity_id, swept_trackers = swept, "Entity aborted");
        }

        self.status(entity_id).await
    }

    /// Entity row plus all tracker rows, as one report
    pub async fn status(&self, entity_id: Uuid) -> Result<EntityStatusReport> {
        let entity = self.store.entity(entity_id).await?;
        let trackers = self.store.trackers_for_entity(entity_id).await?;
        Ok(EntityStatusReport::new(&entity, &trackers))
    }

    pub async fn list_entities(&self) -> Result<Vec<Entity>> {
        self.store.entities().await
    }

    /// Remove an entity and everything derived from it: tracker rows,
    /// ledger entries, migrated records and files. Shared LFS objects stay;
    /// only their links go with the entity.
    pub async fn delete_entity(&self, entity_id: Uuid) -> Result<()> {
        if self.lock_active().contains_key(&entity_id) {
            return Err(AirliftError::InvalidState(format!(
                "entity {entity_id} is currently running; abort it first"
            )));
        }

        // The state row goes last so an interrupted delete stays retryable.
        self.ledger.clear_entity(entity_id).await?;
        self.destination.purge_entity(entity_id).await?;
        self.store.delete_entity(entity_id).await?;
        info!(entity_id = %entity_id, "Entity deleted");
        Ok(())
    }

    fn checkout_token(&self, entity_id: Uuid) -> CancellationToken {
        self.lock_active().entry(entity_id).or_default().clone()
    }

    fn release_token(&self, entity_id: Uuid) {
        self.lock_active().remove(&entity_id);
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
