//! Worker pool polling the retry queue.

use crate::error::PipelineError;
use crate::orchestrator::Pipeline;
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Pool sizing and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub recovery_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_millis(500),
            batch_size: 8,
            recovery_interval: Duration::from_secs(60),
        }
    }
}

/// Independent workers that each claim and process due items.
pub struct WorkerPool {
    pipeline: Arc<Pipeline>,
    config: WorkerPoolConfig,
    running: Arc<RwLock<bool>>,
    wake: Arc<Notify>,
    handles: RwLock<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<Pipeline>, config: WorkerPoolConfig) -> Self {
        Self {
            pipeline,
            config,
            running: Arc::new(RwLock::new(false)),
            wake: Arc::new(Notify::new()),
            handles: RwLock::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Sweep stale claims, then start workers and the periodic recovery task.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut running = self.running.write();
        if *running {
            return Ok(());
        }
        *running = true;
        drop(running);

        let report = self.pipeline.recover()?;
        if report.requeued > 0 || report.failed > 0 {
            info!(
                requeued = report.requeued,
                failed = report.failed,
                "Startup recovery sweep"
            );
        }

        let mut handles = self.handles.write();
        for worker_id in 0..self.config.workers.max(1) {
            let pipeline = Arc::clone(&self.pipeline);
            let running = Arc::clone(&self.running);
            let wake = Arc::clone(&self.wake);
            let config = self.config;
            handles.push(tokio::spawn(async move {
                Self::worker_loop(worker_id, pipeline, running, wake, config).await;
            }));
        }

        let pipeline = Arc::clone(&self.pipeline);
        let running = Arc::clone(&self.running);
        let interval = self.config.recovery_interval;
        handles.push(tokio::spawn(async move {
            Self::recovery_loop(pipeline, running, interval).await;
        }));

        info!(worker_count = self.config.workers.max(1), "Started pipeline workers");
        Ok(())
    }

    /// Nudge idle workers to poll now.
    pub fn wake(&self) {
        self.wake.notify_waiters();
    }

    /// Stop workers after their current item and wait for them.
    pub async fn stop(&self) {
        {
            let mut running = self.running.write();
            if !*running {
                return;
            }
            *running = false;
        }
        self.wake.notify_waiters();

        let handles = std::mem::take(&mut *self.handles.write());
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Stopped pipeline workers");
    }

    async fn worker_loop(
        worker_id: usize,
        pipeline: Arc<Pipeline>,
        running: Arc<RwLock<bool>>,
        wake: Arc<Notify>,
        config: WorkerPoolConfig,
    ) {
        debug!(worker_id, "Worker started");

        while *running.read() {
            match pipeline.run_cycle(config.batch_size).await {
                Ok(outcomes) if !outcomes.is_empty() => continue,
                Ok(_) => {}
                Err(e) => error!(worker_id, error = %e, "Worker cycle failed"),
            }

            // Idle: wait for a wake-up or the next poll tick.
            tokio::select! {
                _ = wake.notified() => {}
                _ = sleep(config.poll_interval) => {}
            }
        }

        debug!(worker_id, "Worker stopped");
    }

    async fn recovery_loop(pipeline: Arc<Pipeline>, running: Arc<RwLock<bool>>, interval: Duration) {
        let tick = Duration::from_millis(100).min(interval);
        let mut waited = Duration::ZERO;
        while *running.read() {
            sleep(tick).await;
            waited += tick;
            if waited < interval {
                continue;
            }
            waited = Duration::ZERO;
            if let Err(e) = pipeline.recover() {
                error!(error = %e, "Recovery sweep failed");
            }
            pipeline.drain_metrics();
        }
    }
}
