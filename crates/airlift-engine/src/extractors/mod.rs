//! Extraction strategies
//!
//! Three interchangeable extractors feed the runner: paged REST collections,
//! staged NDJSON relation dumps, and validated archive trees. All of them
//! produce the same [`ExtractedData`](crate::pipeline::ExtractedData) envelope.

pub mod file;
pub mod ndjson;
pub mod rest;

pub use file::FileExtractor;
pub use ndjson::NdjsonExtractor;
pub use rest::RestExtractor;

use crate::entity::{Entity, EntityKind};

/// API path segment for the entity: `groups/<path>` or `projects/<path>`.
/// Source full paths are slash-separated slugs, so escaping the separator is
/// all that is needed to embed them as one path parameter.
pub(crate) fn entity_api_path(entity: &Entity) -> String {
    let segment = match entity.kind {
        EntityKind::Group => "groups",
        EntityKind::Project => "projects",
    };
    format!("{segment}/{}", entity.source_full_path.replace('/', "%2F"))
}

/// Path of the staged-export download endpoint for one relation
pub(crate) fn export_relation_path(entity: &Entity, relation: &str) -> String {
    format!(
        "{}/export_relations/download?relation={relation}",
        entity_api_path(entity)
    )
}
