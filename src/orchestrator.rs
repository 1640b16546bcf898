//! Pipeline Orchestrator
//!
//! Drives claimed work items through generation, validation and publishing. Transient
//! failures go back to the retry queue; validation verdicts land on the artifact and never
//! surface as pipeline errors.

pub mod worker;

pub use worker::{WorkerPool, WorkerPoolConfig};

use crate::classify::CollaboratorError;
use crate::collaborator::{GenerationRequest, Generator, Publisher};
use crate::content::{Artifact, ArtifactStatus, ContentKind, TaxonomyRefs};
use crate::error::PipelineError;
use crate::queue::{RecoveryReport, ReportOutcome, RetryQueue, WorkItem, WorkItemStatus, WorkPurpose};
use crate::store::LifecycleStore;
use crate::telemetry::{HealthReport, MetricsAggregator, MetricsBus, MetricsEvent};
use crate::types::{duration_millis, ArtifactId, WorkItemId};
use crate::validation::{ChainReport, Taxonomy, ValidationChain};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Timeouts and switches for one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub generation_timeout: Duration,
    pub publish_timeout: Duration,
    /// Enqueue publishing as soon as an artifact is approved.
    pub auto_publish: bool,
    pub metrics_windows_hours: Vec<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(120),
            publish_timeout: Duration::from_secs(30),
            auto_publish: false,
            metrics_windows_hours: vec![24, 168, 720],
        }
    }
}

/// Result of processing one claimed work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Staged { artifact_id: ArtifactId },
    Rejected { artifact_id: ArtifactId },
    Published { artifact_id: ArtifactId },
    PublishFailed { artifact_id: ArtifactId },
    Retrying { attempt: u32, next_eligible_at_ms: u64 },
    Failed,
    /// The item was cancelled or recovered while in flight; nothing was committed.
    Skipped,
    /// An internal error interrupted processing; the claim went back to Pending without
    /// spending an attempt.
    Released,
}

/// Caller-facing view of a work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub work_item: WorkItem,
    /// Human-readable reason for a terminal failure.
    pub reason: Option<String>,
    pub artifact_id: Option<ArtifactId>,
}

pub struct Pipeline {
    queue: Arc<RetryQueue>,
    chain: ValidationChain,
    generator: Arc<dyn Generator>,
    publisher: Arc<dyn Publisher>,
    bus: MetricsBus,
    aggregator: Mutex<MetricsAggregator>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        queue: Arc<RetryQueue>,
        taxonomy: Arc<Taxonomy>,
        generator: Arc<dyn Generator>,
        publisher: Arc<dyn Publisher>,
        settings: PipelineSettings,
    ) -> Result<Self, PipelineError> {
        let (bus, receiver) = MetricsBus::new_pair();
        let mut aggregator = MetricsAggregator::new(receiver, settings.metrics_windows_hours.clone());
        aggregator.seed_from_store(queue.store().as_ref())?;
        Ok(Self {
            queue,
            chain: ValidationChain::new(taxonomy),
            generator,
            publisher,
            bus,
            aggregator: Mutex::new(aggregator),
            settings,
        })
    }

    pub fn queue(&self) -> &Arc<RetryQueue> {
        &self.queue
    }

    pub fn chain(&self) -> &ValidationChain {
        &self.chain
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn store(&self) -> &dyn LifecycleStore {
        self.queue.store().as_ref()
    }

    fn now_ms(&self) -> u64 {
        self.queue.clock().now_ms()
    }

    fn emit(&self, event: MetricsEvent) {
        if self.bus.emit(event).is_err() {
            debug!("Metrics aggregator is gone; dropping event");
        }
    }

    /// Run the structural gate against the request, then enqueue generation.
    pub fn submit(
        &self,
        payload_ref: impl Into<String>,
        kind: ContentKind,
        taxonomy: TaxonomyRefs,
    ) -> Result<WorkItemId, PipelineError> {
        let payload_ref = payload_ref.into();
        let preflight = self.chain.preflight(kind, &taxonomy);
        if !preflight.passed {
            info!(payload_ref = %payload_ref, kind = %kind, "Request failed preflight");
            return Err(PipelineError::Preflight(preflight));
        }
        let item = self.queue.enqueue(payload_ref, kind, taxonomy)?;
        Ok(item.id)
    }

    pub fn get_work_item(&self, id: &WorkItemId) -> Result<WorkItem, PipelineError> {
        self.queue
            .get(id)?
            .ok_or(PipelineError::WorkItemNotFound(*id))
    }

    pub fn get_status(&self, id: &WorkItemId) -> Result<WorkItemStatus, PipelineError> {
        Ok(self.get_work_item(id)?.status)
    }

    pub fn status_view(&self, id: &WorkItemId) -> Result<StatusView, PipelineError> {
        let work_item = self.get_work_item(id)?;
        let artifact_id = match work_item.purpose {
            WorkPurpose::Publish { artifact_id } => Some(artifact_id),
            WorkPurpose::Generate => self
                .store()
                .list_artifacts()?
                .into_iter()
                .find(|a| a.source_work_item == *id)
                .map(|a| a.id),
        };
        Ok(StatusView {
            reason: work_item.failure_reason(),
            work_item,
            artifact_id,
        })
    }

    pub fn get_artifact(&self, id: &ArtifactId) -> Result<Artifact, PipelineError> {
        self.store()
            .get_artifact(id)?
            .ok_or(PipelineError::ArtifactNotFound(*id))
    }

    pub fn list_artifacts(&self) -> Result<Vec<Artifact>, PipelineError> {
        Ok(self.store().list_artifacts()?)
    }

    /// Apply `change` to the artifact and commit it only if its status did not move.
    fn update_artifact<F>(&self, id: &ArtifactId, change: F) -> Result<Artifact, PipelineError>
    where
        F: Fn(&mut Artifact, u64) -> Result<(), PipelineError>,
    {
        loop {
            let current = self.get_artifact(id)?;
            let mut next = current.clone();
            change(&mut next, self.now_ms())?;
            if self.store().commit_artifact(current.status, &next)? {
                return Ok(next);
            }
        }
    }

    /// Staged to Approved. Enqueues publishing when auto-publish is on.
    pub fn approve(&self, id: &ArtifactId) -> Result<(), PipelineError> {
        let artifact = self.update_artifact(id, |a, now| a.transition(ArtifactStatus::Approved, now))?;
        info!(artifact_id = %id, "Artifact approved");
        if self.settings.auto_publish {
            self.enqueue_publish(&artifact)?;
        }
        Ok(())
    }

    /// Staged to Rejected with an operator reason.
    pub fn reject(&self, id: &ArtifactId, reason: &str) -> Result<(), PipelineError> {
        self.update_artifact(id, |a, now| {
            a.transition(ArtifactStatus::Rejected, now)?;
            a.rejection_reason = Some(reason.to_string());
            Ok(())
        })?;
        info!(artifact_id = %id, "Artifact rejected");
        Ok(())
    }

    /// Enqueue publishing of an Approved artifact.
    pub fn request_publish(&self, id: &ArtifactId) -> Result<WorkItemId, PipelineError> {
        let artifact = self.get_artifact(id)?;
        if artifact.status != ArtifactStatus::Approved {
            return Err(PipelineError::InvalidTransition {
                id: *id,
                from: artifact.status,
                to: ArtifactStatus::Published,
            });
        }
        self.enqueue_publish(&artifact)
    }

    /// PublishFailed back to Approved, with a fresh publish item for the same artifact.
    pub fn retry_publish(&self, id: &ArtifactId) -> Result<WorkItemId, PipelineError> {
        let artifact = self.update_artifact(id, |a, now| {
            if a.status != ArtifactStatus::PublishFailed {
                return Err(PipelineError::InvalidTransition {
                    id: a.id,
                    from: a.status,
                    to: ArtifactStatus::Approved,
                });
            }
            a.transition(ArtifactStatus::Approved, now)
        })?;
        self.enqueue_publish(&artifact)
    }

    fn enqueue_publish(&self, artifact: &Artifact) -> Result<WorkItemId, PipelineError> {
        let item = self.queue.enqueue_publish(
            artifact.id,
            artifact.payload_ref.clone(),
            artifact.kind,
            artifact.taxonomy.clone(),
        )?;
        info!(artifact_id = %artifact.id, work_item_id = %item.id, "Publish enqueued");
        Ok(item.id)
    }

    /// Cancel a work item out-of-band. Returns false if it already finished.
    pub fn cancel(&self, id: &WorkItemId) -> Result<bool, PipelineError> {
        let cancelled = self.queue.cancel(id).map_err(|e| match e {
            crate::error::StorageError::WorkItemNotFound(id) => PipelineError::WorkItemNotFound(id),
            other => PipelineError::Storage(other),
        })?;
        if cancelled {
            self.emit(MetricsEvent::WorkItemFinished {
                at_ms: self.now_ms(),
                work_item_id: *id,
                completed: false,
                failure: Some(crate::classify::FailureKind::Cancelled),
            });
        }
        Ok(cancelled)
    }

    pub fn recover(&self) -> Result<RecoveryReport, PipelineError> {
        Ok(self.queue.recover_stale()?)
    }

    pub fn health(&self) -> Result<HealthReport, PipelineError> {
        self.drain_metrics();
        let now = self.now_ms();
        let aggregator = self.aggregator.lock();
        Ok(HealthReport::collect(self.store(), &aggregator, now)?)
    }

    /// Claim up to `limit` due items and process each.
    pub async fn run_cycle(
        &self,
        limit: usize,
    ) -> Result<Vec<(WorkItemId, ItemOutcome)>, PipelineError> {
        let items = self.queue.dequeue_due(limit)?;
        let ids: Vec<WorkItemId> = items.iter().map(|item| item.id).collect();
        let mut claims: Vec<Option<WorkItem>> = items.into_iter().map(Some).collect();
        let mut outcomes = Vec::with_capacity(ids.len());
        for (index, id) in ids.into_iter().enumerate() {
            // Claims still waiting in the batch age by at most one call.
            self.renew_waiting(&mut claims[index..]);
            let outcome = match claims[index].take() {
                Some(claim) => match self.process_item(&claim).await {
                    Ok(outcome) => outcome,
                    Err(err) => self.release_after_error(&claim, &err),
                },
                None => ItemOutcome::Skipped,
            };
            outcomes.push((id, outcome));
        }
        self.drain_metrics();
        Ok(outcomes)
    }

    fn renew_waiting(&self, claims: &mut [Option<WorkItem>]) {
        for slot in claims.iter_mut() {
            let Some(claim) = slot.as_ref() else {
                continue;
            };
            match self.queue.renew_claim(claim) {
                Ok(renewed) => *slot = renewed,
                Err(err) => warn!(work_item_id = %claim.id, error = %err, "Could not renew claim"),
            }
        }
    }

    /// An internal error interrupted an item. Put the claim back so the rest of the batch
    /// and later cycles keep going; if even that fails, recovery picks it up once stale.
    fn release_after_error(&self, item: &WorkItem, err: &PipelineError) -> ItemOutcome {
        error!(work_item_id = %item.id, error = %err, "Processing interrupted");
        match self.queue.release(item) {
            Ok(true) => ItemOutcome::Released,
            Ok(false) => ItemOutcome::Skipped,
            Err(release_err) => {
                error!(
                    work_item_id = %item.id,
                    error = %release_err,
                    "Could not release claim; leaving it to stale recovery"
                );
                ItemOutcome::Skipped
            }
        }
    }

    /// Fold queued metrics events into the rolling windows and drop expired ones.
    /// Returns how many events were taken off the bus.
    pub fn drain_metrics(&self) -> usize {
        let now = self.now_ms();
        let mut aggregator = self.aggregator.lock();
        let ingested = aggregator.ingest_pending();
        aggregator.prune(now);
        ingested
    }

    /// Process one claimed item.
    pub async fn process_item(&self, item: &WorkItem) -> Result<ItemOutcome, PipelineError> {
        match item.purpose {
            WorkPurpose::Generate => self.process_generation(item).await,
            WorkPurpose::Publish { artifact_id } => self.process_publish(item, artifact_id).await,
        }
    }

    async fn call_with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, CollaboratorError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::timeout(deadline)),
        }
    }

    /// Still the same claim we dequeued?
    fn claim_is_current(&self, item: &WorkItem) -> Result<bool, PipelineError> {
        Ok(self
            .queue
            .get(&item.id)?
            .is_some_and(|stored| stored.same_claim(item)))
    }

    fn fail_item(
        &self,
        item: &WorkItem,
        error: &CollaboratorError,
    ) -> Result<ItemOutcome, PipelineError> {
        let outcome = self
            .queue
            .report_failure(item, error, self.queue.policy().max_attempts)?;
        let now = self.now_ms();
        Ok(match outcome {
            ReportOutcome::Rescheduled {
                attempt,
                next_eligible_at_ms,
                delay,
            } => {
                self.emit(MetricsEvent::Rescheduled {
                    at_ms: now,
                    work_item_id: item.id,
                    attempt,
                    delay_ms: duration_millis(delay),
                });
                ItemOutcome::Retrying {
                    attempt,
                    next_eligible_at_ms,
                }
            }
            ReportOutcome::Failed { kind } => {
                self.emit(MetricsEvent::WorkItemFinished {
                    at_ms: now,
                    work_item_id: item.id,
                    completed: false,
                    failure: Some(kind),
                });
                ItemOutcome::Failed
            }
            ReportOutcome::Completed | ReportOutcome::Skipped => ItemOutcome::Skipped,
        })
    }

    fn complete_item(&self, item: &WorkItem) -> Result<bool, PipelineError> {
        match self.queue.report_success(item)? {
            ReportOutcome::Completed => {
                self.emit(MetricsEvent::WorkItemFinished {
                    at_ms: self.now_ms(),
                    work_item_id: item.id,
                    completed: true,
                    failure: None,
                });
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn discard_artifact(&self, id: &ArtifactId) {
        if let Err(err) = self.store().delete_artifact(id) {
            error!(artifact_id = %id, error = %err, "Could not remove uncommitted artifact");
        }
    }

    async fn process_generation(&self, item: &WorkItem) -> Result<ItemOutcome, PipelineError> {
        let request = GenerationRequest {
            work_item_id: item.id,
            payload_ref: item.payload_ref.clone(),
            kind: item.kind,
            taxonomy: item.taxonomy.clone(),
            attempt: item.attempt,
        };
        debug!(work_item_id = %item.id, attempt = item.attempt, "Generating");

        let generated = match Self::call_with_deadline(
            self.settings.generation_timeout,
            self.generator.generate(&request),
        )
        .await
        {
            Ok(generated) => generated,
            Err(err) => return self.fail_item(item, &err),
        };

        let now = self.now_ms();
        if let Some(usage) = generated.usage {
            self.emit(MetricsEvent::TokensUsed {
                at_ms: now,
                work_item_id: item.id,
                usage,
            });
        }

        if !self.claim_is_current(item)? {
            info!(work_item_id = %item.id, "Claim released during generation; discarding result");
            return Ok(ItemOutcome::Skipped);
        }

        let mut artifact = Artifact::draft(
            item.kind,
            generated.body,
            item.payload_ref.clone(),
            item.taxonomy.clone(),
            item.id,
            now,
        );
        let report = self.chain.run_chain(&artifact);
        let passed = report.passed;
        let rejection = (!passed).then(|| rejection_summary(&report));
        artifact.record_validation(report.into_record(&artifact.body, now));
        if passed {
            artifact.transition(ArtifactStatus::Staged, now)?;
        } else {
            artifact.transition(ArtifactStatus::Rejected, now)?;
            artifact.rejection_reason = rejection;
        }
        self.store().put_artifact(&artifact)?;

        let completed = match self.complete_item(item) {
            Ok(completed) => completed,
            Err(err) => {
                self.discard_artifact(&artifact.id);
                return Err(err);
            }
        };
        if !completed {
            warn!(
                work_item_id = %item.id,
                artifact_id = %artifact.id,
                "Claim released before completion; dropping artifact"
            );
            self.store().delete_artifact(&artifact.id)?;
            return Ok(ItemOutcome::Skipped);
        }
        self.emit(MetricsEvent::ArtifactVerdict {
            at_ms: now,
            artifact_id: artifact.id,
            passed,
        });

        if passed {
            info!(work_item_id = %item.id, artifact_id = %artifact.id, "Artifact staged");
            Ok(ItemOutcome::Staged {
                artifact_id: artifact.id,
            })
        } else {
            info!(
                work_item_id = %item.id,
                artifact_id = %artifact.id,
                reason = artifact.rejection_reason.as_deref().unwrap_or_default(),
                "Artifact rejected by validation"
            );
            Ok(ItemOutcome::Rejected {
                artifact_id: artifact.id,
            })
        }
    }

    async fn process_publish(
        &self,
        item: &WorkItem,
        artifact_id: ArtifactId,
    ) -> Result<ItemOutcome, PipelineError> {
        let Some(artifact) = self.store().get_artifact(&artifact_id)? else {
            let err = CollaboratorError::NotFound(format!("artifact {} no longer exists", artifact_id));
            return self.fail_item(item, &err);
        };
        match artifact.status {
            ArtifactStatus::Published => {
                self.complete_item(item)?;
                return Ok(ItemOutcome::Published { artifact_id });
            }
            ArtifactStatus::Approved => {}
            other => {
                let err = CollaboratorError::MalformedRequest(format!(
                    "artifact {} is {}, not approved",
                    artifact_id, other
                ));
                return self.fail_item(item, &err);
            }
        }

        let result = Self::call_with_deadline(
            self.settings.publish_timeout,
            self.publisher.publish(&artifact),
        )
        .await;

        if !self.claim_is_current(item)? {
            info!(work_item_id = %item.id, "Claim released during publish; leaving artifact as is");
            return Ok(ItemOutcome::Skipped);
        }

        match result {
            Ok(reference) => {
                self.update_artifact(&artifact_id, |a, now| {
                    if a.status == ArtifactStatus::Published {
                        return Ok(());
                    }
                    a.transition(ArtifactStatus::Published, now)?;
                    a.published_ref = Some(reference.0.clone());
                    a.publish_attempts += 1;
                    a.last_publish_error = None;
                    Ok(())
                })?;
                self.complete_item(item)?;
                info!(artifact_id = %artifact_id, reference = %reference, "Artifact published");
                Ok(ItemOutcome::Published { artifact_id })
            }
            Err(err) => {
                if self.get_artifact(&artifact_id)?.status == ArtifactStatus::Published {
                    debug!(
                        artifact_id = %artifact_id,
                        "Publish error after another worker published; completing"
                    );
                    self.complete_item(item)?;
                    return Ok(ItemOutcome::Published { artifact_id });
                }
                let outcome = self.fail_item(item, &err)?;
                let message = err.to_string();
                let terminal = outcome == ItemOutcome::Failed;
                if outcome != ItemOutcome::Skipped {
                    self.update_artifact(&artifact_id, |a, now| {
                        if a.status == ArtifactStatus::Published {
                            return Ok(());
                        }
                        if terminal {
                            a.transition(ArtifactStatus::PublishFailed, now)?;
                        }
                        a.publish_attempts += 1;
                        a.last_publish_error = Some(message.clone());
                        a.updated_at_ms = now;
                        Ok(())
                    })?;
                }
                if terminal {
                    warn!(artifact_id = %artifact_id, error = %message, "Publish failed");
                    Ok(ItemOutcome::PublishFailed { artifact_id })
                } else {
                    Ok(outcome)
                }
            }
        }
    }
}

/// One-line summary of failed layers, e.g. "shape: title is missing; quality: ...".
fn rejection_summary(report: &ChainReport) -> String {
    report
        .results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| format!("{}: {}", r.layer, r.errors.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}
