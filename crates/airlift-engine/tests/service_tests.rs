//! Migration service tests
//!
//! Full group migrations against a scripted source:
//! 1. Entity registration enumerates the relation table
//! 2. run_entity drives every tracker and settles the entity
//! 3. Partial relation failure still finishes the entity
//! 4. Abort and delete lifecycles
//! 5. Resume: finished trackers are not re-executed

mod common;

use serde_json::json;

use airlift_engine::entity::{EntityKind, EntityStatus, TrackerStatus};
use airlift_engine::error::AirliftError;

use common::{init_tracing, test_service, ArchiveEntry, ScriptedSource};

fn group_source() -> ScriptedSource {
    ScriptedSource::new()
        .with_archive(
            "labels",
            common::ndjson_gz(&[
                json!({"title": "bug", "id": 11, "description_html": "<p>red</p>"}),
                json!({"title": "feature", "id": 12}),
            ]),
        )
        .with_archive(
            "milestones",
            common::ndjson_gz(&[json!({"title": "v1.0", "iid": 1, "project_id": 7})]),
        )
        .with_archive(
            "boards",
            common::ndjson_gz(&[json!({"name": "main", "id": 3})]),
        )
        .with_pages(
            "members",
            vec![vec![
                json!({"username": "ada", "access_level": 50}),
                json!({"username": "grace", "access_level": 30}),
            ]],
        )
        .with_pages("badges", vec![vec![json!({"name": "pipeline", "id": 9})]])
        .with_archive(
            "uploads",
            common::targz(&[ArchiveEntry::File("avatar/team.png", b"png bytes")]),
        )
}

#[tokio::test]
async fn test_create_entity_enumerates_relation_trackers() {
    init_tracing();
    let harness = test_service(ScriptedSource::new()).await;

    let entity = harness
        .service
        .create_entity(EntityKind::Group, "acme", "acme")
        .await
        .unwrap();
    let report = harness.service.status(entity.id).await.unwrap();

    assert_eq!(report.status, EntityStatus::Created);
    let mut relations: Vec<_> = report.trackers.iter().map(|t| t.relation.clone()).collect();
    relations.sort();
    assert_eq!(
        relations,
        vec!["badges", "boards", "labels", "members", "milestones", "uploads"]
    );
    assert!(report
        .trackers
        .iter()
        .all(|t| t.status == TrackerStatus::Enqueued));
}

#[tokio::test]
async fn test_group_migration_end_to_end() {
    init_tracing();
    let harness = test_service(group_source()).await;

    let entity = harness
        .service
        .create_entity(EntityKind::Group, "acme", "acme")
        .await
        .unwrap();
    let report = harness.service.run_entity(entity.id).await.unwrap();

    assert_eq!(report.status, EntityStatus::Finished);
    assert!(report
        .trackers
        .iter()
        .all(|t| t.status == TrackerStatus::Finished));

    let destination = &harness.destination;
    assert_eq!(destination.record_count(entity.id, "labels").await.unwrap(), 2);
    assert_eq!(
        destination.record_count(entity.id, "milestones").await.unwrap(),
        1
    );
    assert_eq!(destination.record_count(entity.id, "boards").await.unwrap(), 1);
    assert_eq!(destination.record_count(entity.id, "members").await.unwrap(), 2);
    assert_eq!(destination.record_count(entity.id, "badges").await.unwrap(), 1);
    assert_eq!(
        destination.avatar_filename(entity.id).await.unwrap(),
        Some("team.png".to_string())
    );

    // Source-internal attributes were stripped before loading.
    let label = destination
        .record(entity.id, "labels", "bug")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(label, json!({"title": "bug"}));
    let milestone = destination
        .record(entity.id, "milestones", "v1.0")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(milestone, json!({"title": "v1.0", "iid": 1}));

    assert!(harness.scratch_entries().is_empty());
}

#[tokio::test]
async fn test_settled_entity_is_not_rerun() {
    init_tracing();
    let harness = test_service(group_source()).await;

    let entity = harness
        .service
        .create_entity(EntityKind::Group, "acme", "acme")
        .await
        .unwrap();
    harness.service.run_entity(entity.id).await.unwrap();

    let fetches = harness.source.fetch_calls();
    let downloads = harness.source.download_calls();

    let report = harness.service.run_entity(entity.id).await.unwrap();
    assert_eq!(report.status, EntityStatus::Finished);
    assert_eq!(harness.source.fetch_calls(), fetches);
    assert_eq!(harness.source.download_calls(), downloads);
}

#[tokio::test]
async fn test_failed_relation_still_finishes_entity() {
    init_tracing();
    let harness = test_service(group_source().failing_relation("badges")).await;

    let entity = harness
        .service
        .create_entity(EntityKind::Group, "acme", "acme")
        .await
        .unwrap();
    let report = harness.service.run_entity(entity.id).await.unwrap();

    assert_eq!(report.status, EntityStatus::Finished);
    let badges = report
        .trackers
        .iter()
        .find(|t| t.relation == "badges")
        .unwrap();
    assert_eq!(badges.status, TrackerStatus::Failed);
    assert!(badges.error.as_deref().unwrap_or("").contains("502"));
    assert!(report
        .trackers
        .iter()
        .filter(|t| t.relation != "badges")
        .all(|t| t.status == TrackerStatus::Finished));
}

#[tokio::test]
async fn test_abort_settles_entity_and_trackers() {
    init_tracing();
    let harness = test_service(group_source()).await;

    let entity = harness
        .service
        .create_entity(EntityKind::Group, "acme", "acme")
        .await
        .unwrap();
    let report = harness.service.abort(entity.id).await.unwrap();

    assert_eq!(report.status, EntityStatus::Failed);
    assert!(report
        .trackers
        .iter()
        .all(|t| t.status == TrackerStatus::Failed));
    assert!(report
        .error
        .as_deref()
        .unwrap_or("")
        .contains("aborted by operator"));

    // The aborted entity is terminal; running it again does nothing.
    let report = harness.service.run_entity(entity.id).await.unwrap();
    assert_eq!(report.status, EntityStatus::Failed);
    assert_eq!(harness.source.fetch_calls(), 0);
    assert_eq!(harness.source.download_calls(), 0);
}

#[tokio::test]
async fn test_delete_entity_clears_state_ledger_and_destination() {
    init_tracing();
    let harness = test_service(group_source()).await;

    let entity = harness
        .service
        .create_entity(EntityKind::Group, "acme", "acme")
        .await
        .unwrap();
    harness.service.run_entity(entity.id).await.unwrap();

    let ledger_rows = |entity_id: String| {
        let pool = harness.store.pool().clone();
        async move {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM dedupe_entries WHERE entity_id = ?1",
            )
            .bind(entity_id)
            .fetch_one(&pool)
            .await
            .unwrap()
        }
    };

    assert!(ledger_rows(entity.id.to_string()).await > 0);
    assert!(harness.destination.record_count(entity.id, "labels").await.unwrap() > 0);

    harness.service.delete_entity(entity.id).await.unwrap();

    assert!(matches!(
        harness.store.entity(entity.id).await,
        Err(AirliftError::NotFound(_))
    ));
    assert_eq!(ledger_rows(entity.id.to_string()).await, 0);
    assert_eq!(
        harness.destination.record_count(entity.id, "labels").await.unwrap(),
        0
    );
    assert_eq!(harness.destination.upload_count(entity.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_run_entity_skips_already_finished_trackers() {
    init_tracing();
    let harness = test_service(group_source()).await;

    let entity = harness
        .service
        .create_entity(EntityKind::Group, "acme", "acme")
        .await
        .unwrap();

    // Finish one relation up front.
    let result = harness
        .service
        .run_tracker(entity.id, "labels")
        .await
        .unwrap();
    assert_eq!(result.status, TrackerStatus::Finished);
    assert_eq!(harness.source.download_calls(), 1);

    // The full run executes the remaining five relations only: labels is not
    // downloaded a second time.
    let report = harness.service.run_entity(entity.id).await.unwrap();
    assert_eq!(report.status, EntityStatus::Finished);
    assert_eq!(harness.source.download_calls(), 4);
    assert_eq!(harness.source.fetch_calls(), 2);
}
