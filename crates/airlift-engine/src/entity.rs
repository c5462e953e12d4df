//! Core migration state types
//!
//! An **Entity** is the top-level unit being transferred (one group or one
//! project). Each of its migratable relations gets a **Tracker** row that a
//! single pipeline run owns. Status flows one way:
//!
//! - Entity:  `created -> started -> {finished|failed}`
//! - Tracker: `enqueued -> started -> {finished|failed}`
//!
//! Entities are mutated only by the finisher and by explicit abort; trackers
//! only by their own run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of top-level entity being migrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Group,
    Project,
}

impl EntityKind {
    pub fn as_str(&self) -> &str {
        match self {
            EntityKind::Group => "group",
            EntityKind::Project => "project",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = crate::error::AirliftError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "group" => Ok(EntityKind::Group),
            "project" => Ok(EntityKind::Project),
            other => Err(crate::error::AirliftError::InvalidState(format!(
                "unknown entity kind: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entity lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Created,
    Started,
    Finished,
    Failed,
}

impl EntityStatus {
    pub fn as_str(&self) -> &str {
        match self {
            EntityStatus::Created => "created",
            EntityStatus::Started => "started",
            EntityStatus::Finished => "finished",
            EntityStatus::Failed => "failed",
        }
    }

    /// Terminal statuses are never left again
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntityStatus::Finished | EntityStatus::Failed)
    }
}

impl From<String> for EntityStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "created" => EntityStatus::Created,
            "started" => EntityStatus::Started,
            "finished" => EntityStatus::Finished,
            "failed" => EntityStatus::Failed,
            _ => EntityStatus::Created,
        }
    }
}

/// Tracker lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    Enqueued,
    Started,
    Finished,
    Failed,
}

impl TrackerStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TrackerStatus::Enqueued => "enqueued",
            TrackerStatus::Started => "started",
            TrackerStatus::Finished => "finished",
            TrackerStatus::Failed => "failed",
        }
    }

    /// Terminal statuses are never left again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackerStatus::Finished | TrackerStatus::Failed)
    }
}

impl From<String> for TrackerStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "enqueued" => TrackerStatus::Enqueued,
            "started" => TrackerStatus::Started,
            "finished" => TrackerStatus::Finished,
            "failed" => TrackerStatus::Failed,
            _ => TrackerStatus::Enqueued,
        }
    }
}

/// Top-level migration unit (maps to migration_entities)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub kind: EntityKind,
    pub status: EntityStatus,
    /// Full path of the source group/project (e.g. "acme/widgets")
    pub source_full_path: String,
    /// Destination namespace slug the entity lands under
    pub destination_slug: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-relation migration state (maps to migration_trackers)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tracker {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub relation: String,
    pub status: TrackerStatus,
    /// Opaque pagination cursor, persisted after each completed page
    pub batch_cursor: Option<String>,
    pub error: Option<String>,
    /// Per-file load failures tolerated by partial-success relations
    pub failed_records: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only tracker projection for schedulers and UIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerStatusReport {
    pub relation: String,
    pub status: TrackerStatus,
    pub error: Option<String>,
    pub batch_cursor: Option<String>,
    pub failed_records: i64,
}

impl From<&Tracker> for TrackerStatusReport {
    fn from(t: &Tracker) -> Self {
        Self {
            relation: t.relation.clone(),
            status: t.status,
            error: t.error.clone(),
            batch_cursor: t.batch_cursor.clone(),
            failed_records: t.failed_records,
        }
    }
}

/// Read-only entity projection with all tracker states
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityStatusReport {
    pub id: Uuid,
    pub kind: EntityKind,
    pub status: EntityStatus,
    pub source_full_path: String,
    pub destination_slug: String,
    pub error: Option<String>,
    pub trackers: Vec<TrackerStatusReport>,
}

impl EntityStatusReport {
    pub fn new(entity: &Entity, trackers: &[Tracker]) -> Self {
        Self {
            id: entity.id,
            kind: entity.kind,
            status: entity.status,
            source_full_path: entity.source_full_path.clone(),
            destination_slug: entity.destination_slug.clone(),
            error: entity.error.clone(),
            trackers: trackers.iter().map(TrackerStatusReport::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_status_round_trip() {
        for status in [
            EntityStatus::Created,
            EntityStatus::Started,
            EntityStatus::Finished,
            EntityStatus::Failed,
        ] {
            let parsed = EntityStatus::from(status.as_str().to_string());
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_tracker_status_round_trip() {
        for status in [
            TrackerStatus::Enqueued,
            TrackerStatus::Started,
            TrackerStatus::Finished,
            TrackerStatus::Failed,
        ] {
            let parsed = TrackerStatus::from(status.as_str().to_string());
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminality() {
        assert!(!EntityStatus::Created.is_terminal());
        assert!(!EntityStatus::Started.is_terminal());
        assert!(EntityStatus::Finished.is_terminal());
        assert!(EntityStatus::Failed.is_terminal());

        assert!(!TrackerStatus::Enqueued.is_terminal());
        assert!(!TrackerStatus::Started.is_terminal());
        assert!(TrackerStatus::Finished.is_terminal());
        assert!(TrackerStatus::Failed.is_terminal());
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!("group".parse::<EntityKind>().unwrap(), EntityKind::Group);
        assert_eq!("Project".parse::<EntityKind>().unwrap(), EntityKind::Project);
        assert!("namespace".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_status_report_projection() {
        let entity = Entity {
            id: Uuid::new_v4(),
            kind: EntityKind::Project,
            status: EntityStatus::Started,
            source_full_path: "acme/widgets".to_string(),
            destination_slug: "widgets".to_string(),
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let tracker = Tracker {
            id: Uuid::new_v4(),
            entity_id: entity.id,
            relation: "labels".to_string(),
            status: TrackerStatus::Finished,
            batch_cursor: Some("3".to_string()),
            error: None,
            failed_records: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let report = EntityStatusReport::new(&entity, std::slice::from_ref(&tracker));
        assert_eq!(report.trackers.len(), 1);
        assert_eq!(report.trackers[0].relation, "labels");
        assert_eq!(report.trackers[0].status, TrackerStatus::Finished);
        assert_eq!(report.trackers[0].batch_cursor.as_deref(), Some("3"));
    }
}
