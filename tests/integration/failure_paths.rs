//! Storage faults and slow collaborators in the middle of a batch.

use crate::integration::support::{article_body, HarnessBuilder, START_MS};
use async_trait::async_trait;
use gatehouse::backoff::FixedJitter;
use gatehouse::classify::CollaboratorError;
use gatehouse::collaborator::{
    GeneratedContent, GenerationRequest, Generator, PublishedRef, Publisher, ScriptedGenerator,
    ScriptedPublisher,
};
use gatehouse::content::{Artifact, ArtifactStatus, ContentKind, TaxonomyRefs};
use gatehouse::error::StorageError;
use gatehouse::orchestrator::{ItemOutcome, Pipeline, PipelineSettings};
use gatehouse::queue::{RecoveryReport, RetryPolicy, RetryQueue, WorkItem, WorkItemStatus};
use gatehouse::store::{LifecycleStore, MemoryLifecycleStore};
use gatehouse::types::{ArtifactId, ManualClock, WorkItemId};
use gatehouse::validation::Taxonomy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory store with switches for one-shot faults.
#[derive(Default)]
struct FaultyStore {
    inner: MemoryLifecycleStore,
    fail_next_artifact_write: AtomicBool,
    fail_next_completion: AtomicBool,
    cancel_on_artifact_write: AtomicBool,
}

fn disk_hiccup() -> StorageError {
    StorageError::IoError(std::io::Error::new(std::io::ErrorKind::Other, "disk hiccup"))
}

impl LifecycleStore for FaultyStore {
    fn insert_work_item(&self, item: &WorkItem) -> Result<(), StorageError> {
        self.inner.insert_work_item(item)
    }

    fn get_work_item(&self, id: &WorkItemId) -> Result<Option<WorkItem>, StorageError> {
        self.inner.get_work_item(id)
    }

    fn claim_due(&self, now_ms: u64, limit: usize) -> Result<Vec<WorkItem>, StorageError> {
        self.inner.claim_due(now_ms, limit)
    }

    fn commit_work_item(&self, expected: &WorkItem, next: &WorkItem) -> Result<bool, StorageError> {
        if next.status == WorkItemStatus::Completed
            && self.fail_next_completion.swap(false, Ordering::SeqCst)
        {
            return Err(disk_hiccup());
        }
        self.inner.commit_work_item(expected, next)
    }

    fn list_work_items(&self) -> Result<Vec<WorkItem>, StorageError> {
        self.inner.list_work_items()
    }

    fn put_artifact(&self, artifact: &Artifact) -> Result<(), StorageError> {
        if self.fail_next_artifact_write.swap(false, Ordering::SeqCst) {
            return Err(disk_hiccup());
        }
        self.inner.put_artifact(artifact)?;
        if self.cancel_on_artifact_write.swap(false, Ordering::SeqCst) {
            // An operator cancels between the artifact write and completion.
            if let Some(current) = self.inner.get_work_item(&artifact.source_work_item)? {
                let mut cancelled = current.clone();
                cancelled.status = WorkItemStatus::Failed;
                cancelled.claimed_at_ms = None;
                self.inner.commit_work_item(&current, &cancelled)?;
            }
        }
        Ok(())
    }

    fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>, StorageError> {
        self.inner.get_artifact(id)
    }

    fn commit_artifact(
        &self,
        expected_status: ArtifactStatus,
        next: &Artifact,
    ) -> Result<bool, StorageError> {
        self.inner.commit_artifact(expected_status, next)
    }

    fn list_artifacts(&self) -> Result<Vec<Artifact>, StorageError> {
        self.inner.list_artifacts()
    }

    fn delete_artifact(&self, id: &ArtifactId) -> Result<bool, StorageError> {
        self.inner.delete_artifact(id)
    }
}

fn submit_articles(pipeline: &Pipeline, count: usize) -> Vec<WorkItemId> {
    (0..count)
        .map(|n| {
            pipeline
                .submit(&format!("doc-{}", n), ContentKind::Article, TaxonomyRefs::default())
                .unwrap()
        })
        .collect()
}

fn count(outcomes: &[(WorkItemId, ItemOutcome)], wanted: fn(&ItemOutcome) -> bool) -> usize {
    outcomes.iter().filter(|(_, o)| wanted(o)).count()
}

#[tokio::test]
async fn test_storage_error_releases_one_item_and_batch_continues() {
    let store = Arc::new(FaultyStore::default());
    store.fail_next_artifact_write.store(true, Ordering::SeqCst);
    let h = HarnessBuilder::new()
        .store(store.clone())
        .build(ScriptedGenerator::always(article_body()));
    let ids = submit_articles(&h.pipeline, 3);

    let outcomes = h.pipeline.run_cycle(3).await.unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(count(&outcomes, |o| *o == ItemOutcome::Released), 1);
    assert_eq!(count(&outcomes, |o| matches!(o, ItemOutcome::Staged { .. })), 2);

    let released = outcomes
        .iter()
        .find(|(_, o)| *o == ItemOutcome::Released)
        .map(|(id, _)| *id)
        .unwrap();
    let item = h.queue.get(&released).unwrap().unwrap();
    assert_eq!(item.status, WorkItemStatus::Pending);
    assert_eq!(item.attempt, 0);
    assert!(item.claimed_at_ms.is_none());
    for id in ids.iter().filter(|id| **id != released) {
        assert_eq!(h.pipeline.get_status(id).unwrap(), WorkItemStatus::Completed);
    }

    // Released items wait out the base delay rather than spinning.
    assert!(h.pipeline.run_cycle(3).await.unwrap().is_empty());
    h.clock.advance(Duration::from_secs(1));
    let outcomes = h.pipeline.run_cycle(3).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0, released);
    assert!(matches!(outcomes[0].1, ItemOutcome::Staged { .. }));
    assert_eq!(h.pipeline.list_artifacts().unwrap().len(), 3);
}

#[tokio::test]
async fn test_failed_completion_removes_staged_artifact() {
    let store = Arc::new(FaultyStore::default());
    store.fail_next_completion.store(true, Ordering::SeqCst);
    let h = HarnessBuilder::new()
        .store(store.clone())
        .build(ScriptedGenerator::always(article_body()));
    let id = submit_articles(&h.pipeline, 1)[0];

    let outcomes = h.pipeline.run_cycle(1).await.unwrap();
    assert_eq!(outcomes[0].1, ItemOutcome::Released);
    assert!(h.pipeline.list_artifacts().unwrap().is_empty());
    assert_eq!(h.pipeline.get_status(&id).unwrap(), WorkItemStatus::Pending);

    let health = h.pipeline.health().unwrap();
    assert_eq!(health.windows[0].validations_passed, 0);

    h.clock.advance(Duration::from_secs(1));
    let outcomes = h.pipeline.run_cycle(1).await.unwrap();
    assert!(matches!(outcomes[0].1, ItemOutcome::Staged { .. }));
    let health = h.pipeline.health().unwrap();
    assert_eq!(health.windows[0].validations_passed, 1);
    assert_eq!(health.windows[0].completed, 1);
}

#[tokio::test]
async fn test_verdict_not_counted_when_claim_lost_before_completion() {
    let store = Arc::new(FaultyStore::default());
    store.cancel_on_artifact_write.store(true, Ordering::SeqCst);
    let h = HarnessBuilder::new()
        .store(store.clone())
        .build(ScriptedGenerator::always(article_body()));
    submit_articles(&h.pipeline, 1);

    let outcomes = h.pipeline.run_cycle(1).await.unwrap();
    assert_eq!(outcomes[0].1, ItemOutcome::Skipped);
    assert!(h.pipeline.list_artifacts().unwrap().is_empty());

    let health = h.pipeline.health().unwrap();
    assert_eq!(health.windows[0].validations_passed, 0);
    assert_eq!(health.windows[0].validations_failed, 0);
}

/// Generator whose every call takes 400 simulated seconds, with a recovery sweep
/// landing at the end of each call.
struct SlowGenerator {
    queue: Arc<RetryQueue>,
    clock: Arc<ManualClock>,
    sweeps: Mutex<Vec<RecoveryReport>>,
}

#[async_trait]
impl Generator for SlowGenerator {
    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GeneratedContent, CollaboratorError> {
        self.clock.advance(Duration::from_secs(400));
        let report = self
            .queue
            .recover_stale()
            .map_err(|e| CollaboratorError::Other(e.to_string()))?;
        self.sweeps.lock().push(report);
        Ok(GeneratedContent::new(article_body()))
    }
}

#[tokio::test]
async fn test_items_waiting_in_batch_are_not_recovered_as_stale() {
    let clock = Arc::new(ManualClock::new(START_MS));
    let policy = RetryPolicy::default();
    assert_eq!(policy.stale_after, Duration::from_secs(600));
    let queue = Arc::new(RetryQueue::with_sources(
        Arc::new(MemoryLifecycleStore::new()),
        policy,
        clock.clone(),
        Box::new(FixedJitter::none()),
    ));
    let generator = Arc::new(SlowGenerator {
        queue: Arc::clone(&queue),
        clock: clock.clone(),
        sweeps: Mutex::new(Vec::new()),
    });
    let pipeline = Pipeline::new(
        Arc::clone(&queue),
        Arc::new(Taxonomy::default()),
        generator.clone(),
        Arc::new(ScriptedPublisher::new()),
        PipelineSettings::default(),
    )
    .unwrap();
    let ids = submit_articles(&pipeline, 3);

    let outcomes = pipeline.run_cycle(3).await.unwrap();
    assert_eq!(count(&outcomes, |o| matches!(o, ItemOutcome::Staged { .. })), 3);
    assert_eq!(
        generator.sweeps.lock().clone(),
        vec![RecoveryReport::default(); 3]
    );
    for id in &ids {
        let item = queue.get(id).unwrap().unwrap();
        assert_eq!(item.status, WorkItemStatus::Completed);
        assert_eq!(item.attempt, 0);
    }
}

/// Publisher that takes a while, so two workers can hold publish claims at once.
struct SlowPublisher;

#[async_trait]
impl Publisher for SlowPublisher {
    async fn publish(&self, artifact: &Artifact) -> Result<PublishedRef, CollaboratorError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(PublishedRef(format!("memory://{}", artifact.id)))
    }
}

#[tokio::test]
async fn test_concurrent_publish_of_same_artifact_completes_both() {
    let h = HarnessBuilder::new().build(ScriptedGenerator::always(article_body()));
    let pipeline = Arc::new(
        Pipeline::new(
            Arc::clone(&h.queue),
            Arc::new(Taxonomy::default()),
            Arc::new(ScriptedGenerator::always(article_body())),
            Arc::new(SlowPublisher),
            PipelineSettings::default(),
        )
        .unwrap(),
    );
    submit_articles(&pipeline, 1);
    let outcomes = pipeline.run_cycle(1).await.unwrap();
    let ItemOutcome::Staged { artifact_id } = outcomes[0].1 else {
        panic!("expected staged, got {:?}", outcomes[0].1);
    };
    pipeline.approve(&artifact_id).unwrap();
    let first = pipeline.request_publish(&artifact_id).unwrap();
    let second = pipeline.request_publish(&artifact_id).unwrap();

    let a = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        async move { pipeline.run_cycle(1).await }
    });
    let b = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        async move { pipeline.run_cycle(1).await }
    });
    let mut outcomes = a.await.unwrap().unwrap();
    outcomes.extend(b.await.unwrap().unwrap());

    assert_eq!(outcomes.len(), 2);
    for (_, outcome) in &outcomes {
        assert_eq!(*outcome, ItemOutcome::Published { artifact_id });
    }
    assert_eq!(pipeline.get_status(&first).unwrap(), WorkItemStatus::Completed);
    assert_eq!(pipeline.get_status(&second).unwrap(), WorkItemStatus::Completed);
    let artifact = pipeline.get_artifact(&artifact_id).unwrap();
    assert_eq!(artifact.status, ArtifactStatus::Published);
    assert_eq!(artifact.publish_attempts, 1);
}
