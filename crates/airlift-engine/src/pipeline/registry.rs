//! Compiled pipeline registry
//!
//! Every relation the engine can migrate is declared here, once, at startup.
//! Descriptors are immutable and shared; per-run state lives in the
//! [`PipelineContext`](crate::context::PipelineContext), so a single registry
//! serves any number of concurrent entities.

use std::sync::Arc;

use crate::cache::CacheStrategy;
use crate::destination::DestinationStore;
use crate::entity::EntityKind;
use crate::error::{AirliftError, Result};
use crate::extractors::{FileExtractor, NdjsonExtractor, RestExtractor};
use crate::loaders::{
    BundleImporter, LfsObjectsLoader, RecordLoader, UploadsLoader, WikiLoader,
};
use crate::pipeline::PipelineDescriptor;
use crate::transformers::ProhibitedAttributes;

/// All pipelines the engine knows how to run, keyed by entity kind
pub struct PipelineRegistry {
    group: Vec<PipelineDescriptor>,
    project: Vec<PipelineDescriptor>,
}

impl PipelineRegistry {
    /// Compile the full relation table. Fails only if a transformer or
    /// loader pattern does not compile, which a smoke test catches.
    pub fn build(
        destination: DestinationStore,
        importer: Arc<dyn BundleImporter>,
    ) -> Result<Self> {
        let strip = Arc::new(ProhibitedAttributes::new()?);

        let mut group = Vec::new();
        for (relation, key_field) in [
            ("labels", "title"),
            ("milestones", "title"),
            ("boards", "name"),
        ] {
            group.push(ndjson_pipeline(
                relation,
                key_field,
                &destination,
                strip.clone(),
            ));
        }
        for (relation, key_field) in [("members", "username"), ("badges", "name")] {
            group.push(rest_pipeline(
                relation,
                key_field,
                &destination,
                strip.clone(),
            ));
        }
        group.push(uploads_pipeline(&destination)?);

        // Projects migrate everything a group does, plus their repositories'
        // file sidecars.
        let mut project = group.clone();
        project.push(lfs_pipeline(&destination));
        project.push(wiki_pipeline(&destination, importer));

        Ok(Self { group, project })
    }

    pub fn descriptors(&self, kind: EntityKind) -> &[PipelineDescriptor] {
        match kind {
            EntityKind::Group => &self.group,
            EntityKind::Project => &self.project,
        }
    }

    /// Relation names for an entity kind, in execution order
    pub fn relations(&self, kind: EntityKind) -> Vec<String> {
        self.descriptors(kind)
            .iter()
            .map(|d| d.relation.clone())
            .collect()
    }

    pub fn get(&self, kind: EntityKind, relation: &str) -> Result<&PipelineDescriptor> {
        self.descriptors(kind)
            .iter()
            .find(|d| d.relation == relation)
            .ok_or_else(|| AirliftError::UnknownRelation(relation.to_string()))
    }
}

/// Exported relation trees: downloaded as NDJSON, deduplicated by content
/// digest so a re-export that reorders records still skips what was loaded.
fn ndjson_pipeline(
    relation: &str,
    key_field: &str,
    destination: &DestinationStore,
    strip: Arc<ProhibitedAttributes>,
) -> PipelineDescriptor {
    PipelineDescriptor::new(
        relation,
        Arc::new(NdjsonExtractor::new(relation)),
        Arc::new(RecordLoader::new(destination.clone(), key_field)),
    )
    .with_transformer(strip)
    .with_cache_strategy(CacheStrategy::Hexdigest)
    .abort_on_failure(true)
}

/// Relations only reachable through the paginated REST surface
fn rest_pipeline(
    relation: &str,
    key_field: &str,
    destination: &DestinationStore,
    strip: Arc<ProhibitedAttributes>,
) -> PipelineDescriptor {
    PipelineDescriptor::new(
        relation,
        Arc::new(RestExtractor::new(relation)),
        Arc::new(RecordLoader::new(destination.clone(), key_field)),
    )
    .with_transformer(strip)
    .with_cache_strategy(CacheStrategy::Hexdigest)
    .abort_on_failure(true)
}

fn uploads_pipeline(destination: &DestinationStore) -> Result<PipelineDescriptor> {
    Ok(PipelineDescriptor::new(
        "uploads",
        Arc::new(FileExtractor::new("uploads")),
        Arc::new(UploadsLoader::new(destination.clone())?),
    )
    .with_cache_strategy(CacheStrategy::Index)
    .abort_on_failure(false))
}

fn lfs_pipeline(destination: &DestinationStore) -> PipelineDescriptor {
    PipelineDescriptor::new(
        "lfs_objects",
        Arc::new(FileExtractor::new("lfs_objects")),
        Arc::new(LfsObjectsLoader::new(destination.clone())),
    )
    .with_cache_strategy(CacheStrategy::Index)
    .abort_on_failure(false)
}

fn wiki_pipeline(
    destination: &DestinationStore,
    importer: Arc<dyn BundleImporter>,
) -> PipelineDescriptor {
    PipelineDescriptor::new(
        "wiki",
        Arc::new(FileExtractor::new("wiki")),
        Arc::new(WikiLoader::new(destination.clone(), importer)),
    )
    .with_cache_strategy(CacheStrategy::Index)
    .abort_on_failure(false)
}
