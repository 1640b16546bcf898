//! End-to-end scenarios through the pipeline with scripted collaborators.

use crate::integration::support::{article_body, HarnessBuilder, START_MS};
use gatehouse::classify::{CollaboratorError, FailureKind};
use gatehouse::collaborator::{GeneratedContent, ScriptedGenerator, ScriptedPublisher, TokenUsage};
use gatehouse::content::{ArtifactStatus, ContentKind, TaxonomyRefs};
use gatehouse::error::PipelineError;
use gatehouse::orchestrator::ItemOutcome;
use gatehouse::queue::WorkItemStatus;
use gatehouse::validation::ValidationLayer;
use serde_json::json;
use std::time::Duration;

fn submit_article(pipeline: &gatehouse::orchestrator::Pipeline) -> gatehouse::types::WorkItemId {
    pipeline
        .submit("doc-1", ContentKind::Article, TaxonomyRefs::default())
        .unwrap()
}

#[tokio::test]
async fn test_happy_path_stages_artifact_and_completes_item() {
    let h = HarnessBuilder::new().build(ScriptedGenerator::always(article_body()));
    let id = submit_article(&h.pipeline);

    let outcomes = h.pipeline.run_cycle(4).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    let ItemOutcome::Staged { artifact_id } = outcomes[0].1 else {
        panic!("expected staged, got {:?}", outcomes[0].1);
    };

    assert_eq!(h.pipeline.get_status(&id).unwrap(), WorkItemStatus::Completed);
    let artifact = h.pipeline.get_artifact(&artifact_id).unwrap();
    assert_eq!(artifact.status, ArtifactStatus::Staged);
    assert_eq!(artifact.source_work_item, id);
    assert_eq!(artifact.validation_history.len(), 1);
    let record = &artifact.validation_history[0];
    assert!(record.passed);
    assert_eq!(record.results.len(), 5);
    assert_eq!(record.body_digest, artifact.body_digest);

    let view = h.pipeline.status_view(&id).unwrap();
    assert_eq!(view.artifact_id, Some(artifact_id));
    assert_eq!(view.reason, None);
}

#[tokio::test]
async fn test_rate_limit_hint_overrides_exponential_backoff() {
    let generator = ScriptedGenerator::always(article_body()).then(Err(
        CollaboratorError::rate_limited("slow down", Some(Duration::from_secs(5))),
    ));
    let h = HarnessBuilder::new().build(generator);
    let id = submit_article(&h.pipeline);

    let outcomes = h.pipeline.run_cycle(4).await.unwrap();
    assert_eq!(
        outcomes[0].1,
        ItemOutcome::Retrying {
            attempt: 1,
            next_eligible_at_ms: START_MS + 5_000
        }
    );
    let item = h.pipeline.get_work_item(&id).unwrap();
    assert_eq!(item.status, WorkItemStatus::Pending);
    assert_eq!(item.next_eligible_at_ms, START_MS + 5_000);
    assert_eq!(item.last_error.as_ref().unwrap().kind, FailureKind::RateLimited);

    h.clock.advance(Duration::from_millis(4_999));
    assert!(h.pipeline.run_cycle(4).await.unwrap().is_empty());

    h.clock.advance(Duration::from_millis(1));
    let outcomes = h.pipeline.run_cycle(4).await.unwrap();
    assert!(matches!(outcomes[0].1, ItemOutcome::Staged { .. }));

    let item = h.pipeline.get_work_item(&id).unwrap();
    assert_eq!(item.status, WorkItemStatus::Completed);
    assert_eq!(item.attempt, 1);
    let calls = h.generator.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].attempt, 1);
}

#[tokio::test]
async fn test_permanent_failure_fails_after_single_attempt() {
    let generator = ScriptedGenerator::always(article_body())
        .then(Err(CollaboratorError::Authentication("bad api key".to_string())));
    let h = HarnessBuilder::new().build(generator);
    let id = submit_article(&h.pipeline);

    let outcomes = h.pipeline.run_cycle(4).await.unwrap();
    assert_eq!(outcomes[0].1, ItemOutcome::Failed);

    let item = h.pipeline.get_work_item(&id).unwrap();
    assert_eq!(item.status, WorkItemStatus::Failed);
    assert_eq!(item.attempt, 0);
    assert_eq!(item.last_error.as_ref().unwrap().kind, FailureKind::Permanent);

    let reason = h.pipeline.status_view(&id).unwrap().reason.unwrap();
    assert!(reason.contains("bad api key"), "{}", reason);
    assert!(!reason.contains("Permanent"), "classification leaked: {}", reason);

    h.clock.advance(Duration::from_secs(3600));
    assert!(h.pipeline.run_cycle(4).await.unwrap().is_empty());
    assert_eq!(h.generator.calls().len(), 1);
}

#[tokio::test]
async fn test_placeholder_marker_rejects_artifact_but_completes_item() {
    let mut body = article_body();
    body["summary"] = json!("TODO: explain how bounded queues keep producers in check.");
    let h = HarnessBuilder::new().build(ScriptedGenerator::always(body));
    let id = submit_article(&h.pipeline);

    let outcomes = h.pipeline.run_cycle(4).await.unwrap();
    let ItemOutcome::Rejected { artifact_id } = outcomes[0].1 else {
        panic!("expected rejected, got {:?}", outcomes[0].1);
    };

    assert_eq!(h.pipeline.get_status(&id).unwrap(), WorkItemStatus::Completed);
    let artifact = h.pipeline.get_artifact(&artifact_id).unwrap();
    assert_eq!(artifact.status, ArtifactStatus::Rejected);
    let record = artifact.latest_validation().unwrap();
    assert!(!record.passed);
    let failed: Vec<ValidationLayer> = record.failed_layers().map(|r| r.layer).collect();
    assert_eq!(failed, vec![ValidationLayer::Quality]);
    assert!(artifact
        .rejection_reason
        .as_deref()
        .unwrap()
        .contains("placeholder"));
}

#[tokio::test]
async fn test_only_fully_validated_artifacts_can_be_approved() {
    let mut body = article_body();
    body["sections"][1]["heading"] = body["sections"][0]["heading"].clone();
    let h = HarnessBuilder::new().build(ScriptedGenerator::always(body));
    submit_article(&h.pipeline);

    let outcomes = h.pipeline.run_cycle(1).await.unwrap();
    let ItemOutcome::Rejected { artifact_id } = outcomes[0].1 else {
        panic!("expected rejected, got {:?}", outcomes[0].1);
    };

    let err = h.pipeline.approve(&artifact_id).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InvalidTransition {
            from: ArtifactStatus::Rejected,
            to: ArtifactStatus::Approved,
            ..
        }
    ));
    let err = h.pipeline.request_publish(&artifact_id).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTransition { .. }));
    assert!(h
        .pipeline
        .list_artifacts()
        .unwrap()
        .iter()
        .all(|a| a.status != ArtifactStatus::Staged));
}

#[tokio::test]
async fn test_attempt_ceiling_fails_item_and_stops_dequeue() {
    let generator = ScriptedGenerator::new(Err(CollaboratorError::Unavailable(
        "upstream 503".to_string(),
    )));
    let h = HarnessBuilder::new().max_attempts(3).build(generator);
    let id = submit_article(&h.pipeline);

    let mut outcomes = Vec::new();
    for _ in 0..6 {
        outcomes.extend(h.pipeline.run_cycle(4).await.unwrap());
        h.clock.advance(Duration::from_secs(600));
    }

    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes[0].1, ItemOutcome::Retrying { attempt: 1, .. }));
    assert!(matches!(outcomes[1].1, ItemOutcome::Retrying { attempt: 2, .. }));
    assert_eq!(outcomes[2].1, ItemOutcome::Failed);

    let item = h.pipeline.get_work_item(&id).unwrap();
    assert_eq!(item.status, WorkItemStatus::Failed);
    assert_eq!(
        item.last_error.as_ref().unwrap().kind,
        FailureKind::ExhaustedRetries
    );
    assert_eq!(h.generator.calls().len(), 3);
    let reason = h.pipeline.status_view(&id).unwrap().reason.unwrap();
    assert!(reason.starts_with("gave up after 3 attempts"), "{}", reason);
}

#[tokio::test]
async fn test_publish_failure_then_retry_reuses_artifact() {
    let publisher =
        ScriptedPublisher::new().then_fail(CollaboratorError::PermissionDenied("read-only".to_string()));
    let h = HarnessBuilder::new()
        .publisher(publisher)
        .build(ScriptedGenerator::always(article_body()));
    submit_article(&h.pipeline);

    let outcomes = h.pipeline.run_cycle(1).await.unwrap();
    let ItemOutcome::Staged { artifact_id } = outcomes[0].1 else {
        panic!("expected staged");
    };
    h.pipeline.approve(&artifact_id).unwrap();
    // Auto-publish is off; nothing queued until requested.
    assert!(h.pipeline.run_cycle(4).await.unwrap().is_empty());

    let publish_item = h.pipeline.request_publish(&artifact_id).unwrap();
    let outcomes = h.pipeline.run_cycle(4).await.unwrap();
    assert_eq!(outcomes, vec![(publish_item, ItemOutcome::PublishFailed { artifact_id })]);
    let artifact = h.pipeline.get_artifact(&artifact_id).unwrap();
    assert_eq!(artifact.status, ArtifactStatus::PublishFailed);
    assert_eq!(artifact.publish_attempts, 1);
    assert!(artifact.last_publish_error.as_deref().unwrap().contains("read-only"));

    let retry_item = h.pipeline.retry_publish(&artifact_id).unwrap();
    assert_ne!(retry_item, publish_item);
    let outcomes = h.pipeline.run_cycle(4).await.unwrap();
    assert_eq!(outcomes, vec![(retry_item, ItemOutcome::Published { artifact_id })]);

    let artifact = h.pipeline.get_artifact(&artifact_id).unwrap();
    assert_eq!(artifact.status, ArtifactStatus::Published);
    assert_eq!(artifact.publish_attempts, 2);
    assert_eq!(
        artifact.published_ref.as_deref(),
        Some(format!("memory://article/{}", artifact_id).as_str())
    );
    assert_eq!(h.publisher.published().len(), 1);
    assert_eq!(h.pipeline.list_artifacts().unwrap().len(), 1);
}

#[tokio::test]
async fn test_auto_publish_enqueues_on_approval() {
    let h = HarnessBuilder::new()
        .auto_publish()
        .build(ScriptedGenerator::always(article_body()));
    submit_article(&h.pipeline);
    let outcomes = h.pipeline.run_cycle(1).await.unwrap();
    let ItemOutcome::Staged { artifact_id } = outcomes[0].1 else {
        panic!("expected staged");
    };

    h.pipeline.approve(&artifact_id).unwrap();
    let outcomes = h.pipeline.run_cycle(4).await.unwrap();
    assert_eq!(outcomes[0].1, ItemOutcome::Published { artifact_id });
}

#[tokio::test]
async fn test_preflight_rejects_unknown_taxonomy_before_enqueue() {
    let h = HarnessBuilder::new()
        .taxonomy(&[("engineering", &["databases"])])
        .build(ScriptedGenerator::always(article_body()));

    let err = h
        .pipeline
        .submit(
            "doc-1",
            ContentKind::Article,
            TaxonomyRefs::new(Some("engineering".into()), Some("gardening".into())),
        )
        .unwrap_err();
    let PipelineError::Preflight(result) = err else {
        panic!("expected preflight rejection");
    };
    assert_eq!(result.layer, ValidationLayer::Structural);
    assert_eq!(h.pipeline.health().unwrap().total_work_items(), 0);
    assert!(h.generator.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_during_generation_discards_result() {
    let generator = ScriptedGenerator::always(article_body()).with_delay(Duration::from_millis(200));
    let h = HarnessBuilder::new().build(generator);
    let id = submit_article(&h.pipeline);

    let pipeline = h.pipeline.clone();
    let cycle = tokio::spawn(async move { pipeline.run_cycle(1).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.pipeline.get_status(&id).unwrap(), WorkItemStatus::Processing);

    assert!(h.pipeline.cancel(&id).unwrap());
    let outcomes = cycle.await.unwrap().unwrap();
    assert_eq!(outcomes[0].1, ItemOutcome::Skipped);

    let view = h.pipeline.status_view(&id).unwrap();
    assert_eq!(view.work_item.status, WorkItemStatus::Failed);
    assert_eq!(view.reason.as_deref(), Some("cancelled"));
    assert!(h.pipeline.list_artifacts().unwrap().is_empty());
    assert!(!h.pipeline.cancel(&id).unwrap());
}

#[tokio::test]
async fn test_health_reports_windows_and_tokens() {
    let generator = ScriptedGenerator::new(Ok(
        GeneratedContent::new(article_body()).with_usage(TokenUsage::new(300, 700))
    ))
    .then(Err(CollaboratorError::Authentication("nope".to_string())));
    let h = HarnessBuilder::new().build(generator);

    submit_article(&h.pipeline);
    h.pipeline.run_cycle(1).await.unwrap();
    submit_article(&h.pipeline);
    h.pipeline.run_cycle(1).await.unwrap();

    let report = h.pipeline.health().unwrap();
    assert_eq!(report.work_items[&WorkItemStatus::Completed], 1);
    assert_eq!(report.work_items[&WorkItemStatus::Failed], 1);
    assert_eq!(report.artifacts[&ArtifactStatus::Staged], 1);
    assert_eq!(report.windows.len(), 3);
    let day = &report.windows[0];
    assert_eq!(day.hours(), 24);
    assert_eq!(day.completed, 1);
    assert_eq!(day.failed, 1);
    assert_eq!(day.success_rate, Some(0.5));
    assert_eq!(day.tokens, 1_000);
    assert_eq!(day.validations_passed, 1);
}
