//! Retry Queue
//!
//! Durable scheduling of work items on top of a [`LifecycleStore`]. Dequeue is due-time
//! ordered and atomic; failures are classified and rescheduled with backoff here so call
//! sites never carry their own retry loops.

pub mod item;

pub use item::{ErrorSummary, WorkItem, WorkItemStatus, WorkPurpose};

use crate::backoff::{BackoffPolicy, JitterSource, RandomJitter};
use crate::classify::{Classification, CollaboratorError, ErrorClassifier, FailureKind};
use crate::content::{ContentKind, TaxonomyRefs};
use crate::error::StorageError;
use crate::store::LifecycleStore;
use crate::types::{duration_millis, ArtifactId, Clock, SystemClock, WorkItemId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempt ceiling, backoff, and staleness settings for the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub unknown_error_ceiling: u32,
    /// Processing items older than this are considered abandoned by a crashed worker.
    pub stale_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
            unknown_error_ceiling: 3,
            stale_after: Duration::from_secs(600),
        }
    }
}

/// What `report_*` did to the stored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Completed,
    Rescheduled {
        attempt: u32,
        next_eligible_at_ms: u64,
        delay: Duration,
    },
    Failed {
        kind: FailureKind,
    },
    /// The claim was no longer current (cancelled or recovered); nothing was written.
    Skipped,
}

/// Summary of one recovery sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub failed: usize,
}

/// Durable retry queue over a lifecycle store.
pub struct RetryQueue {
    store: Arc<dyn LifecycleStore>,
    policy: RetryPolicy,
    classifier: ErrorClassifier,
    jitter: Mutex<Box<dyn JitterSource>>,
    clock: Arc<dyn Clock>,
}

impl RetryQueue {
    pub fn new(store: Arc<dyn LifecycleStore>, policy: RetryPolicy) -> Self {
        Self::with_sources(
            store,
            policy,
            Arc::new(SystemClock),
            Box::new(RandomJitter::from_entropy()),
        )
    }

    /// Build a queue with injected time and randomness.
    pub fn with_sources(
        store: Arc<dyn LifecycleStore>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
        jitter: Box<dyn JitterSource>,
    ) -> Self {
        Self {
            store,
            classifier: ErrorClassifier::new(policy.unknown_error_ceiling),
            policy,
            jitter: Mutex::new(jitter),
            clock,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn LifecycleStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Create a Pending generation item due now.
    pub fn enqueue(
        &self,
        payload_ref: impl Into<String>,
        kind: ContentKind,
        taxonomy: TaxonomyRefs,
    ) -> Result<WorkItem, StorageError> {
        self.insert(payload_ref.into(), kind, WorkPurpose::Generate, taxonomy)
    }

    /// Create a Pending publish item bound to an existing artifact.
    pub fn enqueue_publish(
        &self,
        artifact_id: ArtifactId,
        payload_ref: impl Into<String>,
        kind: ContentKind,
        taxonomy: TaxonomyRefs,
    ) -> Result<WorkItem, StorageError> {
        self.insert(
            payload_ref.into(),
            kind,
            WorkPurpose::Publish { artifact_id },
            taxonomy,
        )
    }

    fn insert(
        &self,
        payload_ref: String,
        kind: ContentKind,
        purpose: WorkPurpose,
        taxonomy: TaxonomyRefs,
    ) -> Result<WorkItem, StorageError> {
        let item = WorkItem::new(payload_ref, kind, purpose, taxonomy, self.clock.now_ms());
        self.store.insert_work_item(&item)?;
        debug!(work_item_id = %item.id, kind = %item.kind, "Enqueued work item");
        Ok(item)
    }

    pub fn get(&self, id: &WorkItemId) -> Result<Option<WorkItem>, StorageError> {
        self.store.get_work_item(id)
    }

    /// Claim up to `limit` due items, oldest-due first.
    pub fn dequeue_due(&self, limit: usize) -> Result<Vec<WorkItem>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.store.claim_due(self.clock.now_ms(), limit)
    }

    pub fn report_success(&self, item: &WorkItem) -> Result<ReportOutcome, StorageError> {
        let now = self.clock.now_ms();
        let mut next = item.clone();
        next.status = WorkItemStatus::Completed;
        next.updated_at_ms = now;
        next.finished_at_ms = Some(now);

        if !self.store.commit_work_item(item, &next)? {
            debug!(work_item_id = %item.id, "Skipping success report for released claim");
            return Ok(ReportOutcome::Skipped);
        }
        debug!(work_item_id = %item.id, attempt = item.attempt, "Work item completed");
        Ok(ReportOutcome::Completed)
    }

    /// Restamp a claim just before work starts on it, so items waiting behind others in a
    /// batch are not mistaken for abandoned ones. Returns the renewed claim, or None when
    /// the item was cancelled or recovered in the meantime.
    pub fn renew_claim(&self, item: &WorkItem) -> Result<Option<WorkItem>, StorageError> {
        let now = self.clock.now_ms();
        if item.claimed_at_ms == Some(now) {
            return Ok(Some(item.clone()));
        }
        let mut renewed = item.clone();
        renewed.claimed_at_ms = Some(now);
        renewed.updated_at_ms = now;
        if self.store.commit_work_item(item, &renewed)? {
            Ok(Some(renewed))
        } else {
            debug!(work_item_id = %item.id, "Claim released before work started");
            Ok(None)
        }
    }

    /// Hand a claim back without spending an attempt. The item becomes due again after the
    /// base delay. Returns false when the claim was no longer current.
    pub fn release(&self, item: &WorkItem) -> Result<bool, StorageError> {
        let now = self.clock.now_ms();
        let mut next = item.clone();
        next.status = WorkItemStatus::Pending;
        next.claimed_at_ms = None;
        next.updated_at_ms = now;
        next.next_eligible_at_ms =
            now.saturating_add(duration_millis(self.policy.backoff.base_delay));
        let released = self.store.commit_work_item(item, &next)?;
        if released {
            info!(
                work_item_id = %item.id,
                attempt = item.attempt,
                next_eligible_at_ms = next.next_eligible_at_ms,
                "Released claim"
            );
        }
        Ok(released)
    }

    /// Classify `error` and either reschedule the item or fail it.
    pub fn report_failure(
        &self,
        item: &WorkItem,
        error: &CollaboratorError,
        max_attempts: u32,
    ) -> Result<ReportOutcome, StorageError> {
        let classification = self.classifier.classify(error, item.attempt);
        let (kind, hint) = match classification {
            Classification::Permanent => (FailureKind::Permanent, None),
            Classification::Retryable => (FailureKind::Transient, None),
            Classification::RateLimited(hint) => (FailureKind::RateLimited, Some(hint)),
        };
        self.settle_failure(item, kind, error.to_string(), hint, max_attempts)
    }

    fn settle_failure(
        &self,
        item: &WorkItem,
        kind: FailureKind,
        message: String,
        hint: Option<Duration>,
        max_attempts: u32,
    ) -> Result<ReportOutcome, StorageError> {
        let now = self.clock.now_ms();
        let mut next = item.clone();
        next.updated_at_ms = now;
        next.claimed_at_ms = None;

        let exhausted = item.attempt.saturating_add(1) >= max_attempts;
        let outcome = if kind == FailureKind::Permanent || exhausted {
            let terminal = if kind == FailureKind::Permanent {
                FailureKind::Permanent
            } else {
                FailureKind::ExhaustedRetries
            };
            next.status = WorkItemStatus::Failed;
            next.finished_at_ms = Some(now);
            next.last_error = Some(ErrorSummary::new(terminal, message));
            ReportOutcome::Failed { kind: terminal }
        } else {
            let delay = {
                let mut jitter = self.jitter.lock();
                self.policy
                    .backoff
                    .delay_for(item.attempt, hint, jitter.as_mut())
            };
            let next_eligible_at_ms = now.saturating_add(duration_millis(delay));
            next.status = WorkItemStatus::Pending;
            next.attempt = item.attempt + 1;
            next.next_eligible_at_ms = next_eligible_at_ms;
            next.last_error = Some(ErrorSummary::new(kind, message));
            ReportOutcome::Rescheduled {
                attempt: next.attempt,
                next_eligible_at_ms,
                delay,
            }
        };

        if !self.store.commit_work_item(item, &next)? {
            debug!(work_item_id = %item.id, "Skipping failure report for released claim");
            return Ok(ReportOutcome::Skipped);
        }

        match outcome {
            ReportOutcome::Rescheduled { attempt, delay, .. } => info!(
                work_item_id = %item.id,
                attempt,
                delay_ms = duration_millis(delay),
                reason = %kind,
                "Rescheduled work item"
            ),
            ReportOutcome::Failed { kind } => warn!(
                work_item_id = %item.id,
                attempt = item.attempt,
                reason = %kind,
                "Work item failed"
            ),
            _ => {}
        }
        Ok(outcome)
    }

    /// Requeue Processing items whose claim is older than the staleness threshold.
    ///
    /// Each counts as a retryable failure: the attempt counter advances and the item is
    /// delayed by backoff, or failed once the attempt ceiling is reached.
    pub fn recover_stale(&self) -> Result<RecoveryReport, StorageError> {
        let now = self.clock.now_ms();
        let stale_ms = duration_millis(self.policy.stale_after);
        let mut report = RecoveryReport::default();

        for item in self.store.list_work_items()? {
            if item.status != WorkItemStatus::Processing {
                continue;
            }
            let claimed_at = item.claimed_at_ms.unwrap_or(item.updated_at_ms);
            if now.saturating_sub(claimed_at) < stale_ms {
                continue;
            }
            let message = format!(
                "worker abandoned claim after {}ms",
                now.saturating_sub(claimed_at)
            );
            match self.settle_failure(
                &item,
                FailureKind::Abandoned,
                message,
                None,
                self.policy.max_attempts,
            )? {
                ReportOutcome::Rescheduled { .. } => report.requeued += 1,
                ReportOutcome::Failed { .. } => report.failed += 1,
                _ => {}
            }
        }

        if report.requeued > 0 || report.failed > 0 {
            warn!(
                requeued = report.requeued,
                failed = report.failed,
                "Recovered stale work items"
            );
        }
        Ok(report)
    }

    /// Mark an item Failed out-of-band. Returns false if it was already terminal.
    pub fn cancel(&self, id: &WorkItemId) -> Result<bool, StorageError> {
        loop {
            let Some(current) = self.store.get_work_item(id)? else {
                return Err(StorageError::WorkItemNotFound(*id));
            };
            if current.status.is_terminal() {
                return Ok(false);
            }
            let now = self.clock.now_ms();
            let mut next = current.clone();
            next.status = WorkItemStatus::Failed;
            next.claimed_at_ms = None;
            next.updated_at_ms = now;
            next.finished_at_ms = Some(now);
            next.last_error = Some(ErrorSummary::new(
                FailureKind::Cancelled,
                "cancelled by caller",
            ));
            if self.store.commit_work_item(&current, &next)? {
                info!(work_item_id = %id, "Cancelled work item");
                return Ok(true);
            }
        }
    }
}
