//! Claim exclusivity under concurrent workers.

use crate::integration::support::{article_body, HarnessBuilder};
use gatehouse::collaborator::ScriptedGenerator;
use gatehouse::content::{ContentKind, TaxonomyRefs};
use gatehouse::orchestrator::{Pipeline, PipelineSettings, WorkerPool, WorkerPoolConfig};
use gatehouse::queue::{RetryPolicy, RetryQueue, WorkItemStatus};
use gatehouse::store::{LifecycleStore, MemoryLifecycleStore, SledLifecycleStore};
use gatehouse::collaborator::ScriptedPublisher;
use gatehouse::validation::Taxonomy;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn race_for_single_item(store: Arc<dyn LifecycleStore>, workers: usize) -> usize {
    let queue = Arc::new(RetryQueue::new(store, RetryPolicy::default()));
    queue
        .enqueue("only-one", ContentKind::Article, TaxonomyRefs::default())
        .unwrap();

    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                queue.dequeue_due(1).unwrap().len()
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).sum()
}

#[test]
fn test_single_due_item_is_claimed_once_sled() {
    for _ in 0..10 {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SledLifecycleStore::new(temp.path().join("store")).unwrap());
        assert_eq!(race_for_single_item(store, 16), 1);
    }
}

#[test]
fn test_single_due_item_is_claimed_once_memory() {
    for _ in 0..10 {
        assert_eq!(race_for_single_item(Arc::new(MemoryLifecycleStore::new()), 16), 1);
    }
}

#[test]
fn test_concurrent_cycles_never_share_an_item() {
    let h = HarnessBuilder::new().build(ScriptedGenerator::always(article_body()));
    for i in 0..40 {
        h.pipeline
            .submit(format!("doc-{}", i), ContentKind::Article, TaxonomyRefs::default())
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let queue = Arc::clone(&h.queue);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut ids = Vec::new();
                loop {
                    let batch = queue.dequeue_due(3).unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    ids.extend(batch.into_iter().map(|i| i.id));
                }
                ids
            })
        })
        .collect();

    let mut all: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let claimed = all.len();
    all.sort();
    all.dedup();
    assert_eq!(claimed, 40);
    assert_eq!(all.len(), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_generates_once_per_item() {
    let temp = TempDir::new().unwrap();
    let store: Arc<dyn LifecycleStore> =
        Arc::new(SledLifecycleStore::new(temp.path().join("store")).unwrap());
    let queue = Arc::new(RetryQueue::new(store, RetryPolicy::default()));
    let generator = Arc::new(
        ScriptedGenerator::always(article_body()).with_delay(Duration::from_millis(20)),
    );
    let pipeline = Arc::new(
        Pipeline::new(
            queue,
            Arc::new(Taxonomy::default()),
            generator.clone(),
            Arc::new(ScriptedPublisher::new()),
            PipelineSettings::default(),
        )
        .unwrap(),
    );

    let ids: Vec<_> = (0..3)
        .map(|i| {
            pipeline
                .submit(format!("doc-{}", i), ContentKind::Article, TaxonomyRefs::default())
                .unwrap()
        })
        .collect();

    let pool = WorkerPool::new(
        Arc::clone(&pipeline),
        WorkerPoolConfig {
            workers: 4,
            poll_interval: Duration::from_millis(10),
            batch_size: 1,
            recovery_interval: Duration::from_secs(60),
        },
    );
    pool.start().unwrap();
    assert!(pool.is_running());

    let deadline = Instant::now() + Duration::from_secs(10);
    while ids
        .iter()
        .any(|id| pipeline.get_status(id).unwrap() != WorkItemStatus::Completed)
    {
        assert!(Instant::now() < deadline, "workers did not finish in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    pool.stop().await;
    assert!(!pool.is_running());

    assert_eq!(generator.calls().len(), 3);
    let mut called: Vec<_> = generator.calls().iter().map(|c| c.work_item_id).collect();
    called.sort();
    called.dedup();
    assert_eq!(called.len(), 3);
}
