//! Retry queue behavior against the sled store.

use crate::integration::support::START_MS;
use gatehouse::backoff::{BackoffPolicy, FixedJitter};
use gatehouse::classify::{CollaboratorError, FailureKind};
use gatehouse::content::{ContentKind, TaxonomyRefs};
use gatehouse::queue::{ReportOutcome, RetryPolicy, RetryQueue, WorkItemStatus};
use gatehouse::store::{LifecycleStore, SledLifecycleStore};
use gatehouse::types::ManualClock;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn sled_queue(temp: &TempDir, policy: RetryPolicy) -> (RetryQueue, Arc<ManualClock>) {
    let store: Arc<dyn LifecycleStore> =
        Arc::new(SledLifecycleStore::new(temp.path().join("store")).unwrap());
    let clock = Arc::new(ManualClock::new(START_MS));
    let queue = RetryQueue::with_sources(store, policy, clock.clone(), Box::new(FixedJitter::none()));
    (queue, clock)
}

fn enqueue(queue: &RetryQueue, name: &str) -> gatehouse::queue::WorkItem {
    queue
        .enqueue(name, ContentKind::Quiz, TaxonomyRefs::default())
        .unwrap()
}

#[test]
fn test_enqueue_defaults() {
    let temp = TempDir::new().unwrap();
    let (queue, _) = sled_queue(&temp, RetryPolicy::default());
    let item = enqueue(&queue, "doc");
    assert_eq!(item.attempt, 0);
    assert_eq!(item.status, WorkItemStatus::Pending);
    assert_eq!(item.next_eligible_at_ms, START_MS);
    assert_eq!(queue.get(&item.id).unwrap(), Some(item));
}

#[test]
fn test_dequeue_orders_by_due_time_and_marks_processing() {
    let temp = TempDir::new().unwrap();
    let (queue, clock) = sled_queue(&temp, RetryPolicy::default());

    let first = enqueue(&queue, "a");
    let second = enqueue(&queue, "b");
    // Push `first` behind `second` by failing it once.
    let claimed = queue.dequeue_due(1).unwrap();
    assert_eq!(claimed[0].id, first.id);
    queue
        .report_failure(
            &claimed[0],
            &CollaboratorError::Timeout("slow".into()),
            5,
        )
        .unwrap();

    clock.advance(Duration::from_secs(5));
    let claimed = queue.dequeue_due(10).unwrap();
    let ids: Vec<_> = claimed.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
    assert!(claimed.iter().all(|i| i.status == WorkItemStatus::Processing));
    assert!(queue.dequeue_due(10).unwrap().is_empty());
}

#[test]
fn test_backoff_doubles_per_attempt_until_cap() {
    let temp = TempDir::new().unwrap();
    let policy = RetryPolicy {
        max_attempts: 10,
        backoff: BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(6)),
        ..RetryPolicy::default()
    };
    let (queue, clock) = sled_queue(&temp, policy);
    let item = enqueue(&queue, "doc");

    let mut delays = Vec::new();
    for _ in 0..5 {
        let claimed = queue.dequeue_due(1).unwrap().remove(0);
        match queue
            .report_failure(&claimed, &CollaboratorError::Connection("reset".into()), 10)
            .unwrap()
        {
            ReportOutcome::Rescheduled { delay, .. } => delays.push(delay.as_millis() as u64),
            other => panic!("unexpected {:?}", other),
        }
        clock.advance(Duration::from_secs(60));
    }
    assert_eq!(delays, vec![1_000, 2_000, 4_000, 6_000, 6_000]);
    assert_eq!(queue.get(&item.id).unwrap().unwrap().attempt, 5);
}

#[test]
fn test_unknown_errors_escalate_after_ceiling() {
    let temp = TempDir::new().unwrap();
    let policy = RetryPolicy {
        max_attempts: 10,
        unknown_error_ceiling: 2,
        ..RetryPolicy::default()
    };
    let (queue, clock) = sled_queue(&temp, policy);
    let item = enqueue(&queue, "doc");

    let mut kinds = Vec::new();
    loop {
        let Some(claimed) = queue.dequeue_due(1).unwrap().pop() else {
            break;
        };
        let outcome = queue
            .report_failure(&claimed, &CollaboratorError::Other("mystery".into()), 10)
            .unwrap();
        kinds.push(outcome);
        clock.advance(Duration::from_secs(600));
    }

    // Attempt 0 retries; attempt 1 reaches the ceiling of two.
    assert_eq!(kinds.len(), 2);
    assert_eq!(
        kinds.last(),
        Some(&ReportOutcome::Failed {
            kind: FailureKind::Permanent
        })
    );
    assert_eq!(queue.get(&item.id).unwrap().unwrap().attempt, 1);
}

#[test]
fn test_success_report_after_cancel_is_skipped() {
    let temp = TempDir::new().unwrap();
    let (queue, _) = sled_queue(&temp, RetryPolicy::default());
    let item = enqueue(&queue, "doc");
    let claimed = queue.dequeue_due(1).unwrap().remove(0);

    assert!(queue.cancel(&item.id).unwrap());
    assert_eq!(queue.report_success(&claimed).unwrap(), ReportOutcome::Skipped);
    let stored = queue.get(&item.id).unwrap().unwrap();
    assert_eq!(stored.status, WorkItemStatus::Failed);
    assert_eq!(stored.last_error.unwrap().kind, FailureKind::Cancelled);
}
