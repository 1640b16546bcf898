//! Folds metrics events into rolling-window aggregates.

use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use crate::collaborator::TokenUsage;
use crate::error::StorageError;
use crate::queue::WorkItemStatus;
use crate::store::LifecycleStore;
use crate::telemetry::events::MetricsEvent;
use crate::telemetry::health::WindowStats;
use crate::types::WorkItemId;

const HOUR_MS: u64 = 3_600_000;

/// Sole owner of metrics state. Workers only hold a [`MetricsBus`](super::bus::MetricsBus).
pub struct MetricsAggregator {
    receiver: Receiver<MetricsEvent>,
    windows_hours: Vec<u64>,
    outcomes: HashMap<WorkItemId, (u64, bool)>,
    tokens: Vec<(u64, TokenUsage)>,
    reschedules: Vec<u64>,
    verdicts: Vec<(u64, bool)>,
}

impl MetricsAggregator {
    pub fn new(receiver: Receiver<MetricsEvent>, windows_hours: Vec<u64>) -> Self {
        Self {
            receiver,
            windows_hours,
            outcomes: HashMap::new(),
            tokens: Vec::new(),
            reschedules: Vec::new(),
            verdicts: Vec::new(),
        }
    }

    /// Load outcomes of already-terminal work items so windows survive restarts.
    pub fn seed_from_store(&mut self, store: &dyn LifecycleStore) -> Result<usize, StorageError> {
        let mut seeded = 0usize;
        for item in store.list_work_items()? {
            let Some(finished_at) = item.finished_at_ms else {
                continue;
            };
            let completed = match item.status {
                WorkItemStatus::Completed => true,
                WorkItemStatus::Failed => false,
                _ => continue,
            };
            self.outcomes.insert(item.id, (finished_at, completed));
            seeded += 1;
        }
        Ok(seeded)
    }

    pub fn windows_hours(&self) -> &[u64] {
        &self.windows_hours
    }

    /// Drain every queued event.
    pub fn ingest_pending(&mut self) -> usize {
        let mut count = 0usize;
        while let Ok(event) = self.receiver.try_recv() {
            self.ingest_one(event);
            count += 1;
        }
        count
    }

    fn ingest_one(&mut self, event: MetricsEvent) {
        match event {
            MetricsEvent::WorkItemFinished {
                at_ms,
                work_item_id,
                completed,
                ..
            } => {
                self.outcomes.insert(work_item_id, (at_ms, completed));
            }
            MetricsEvent::Rescheduled { at_ms, .. } => self.reschedules.push(at_ms),
            MetricsEvent::TokensUsed { at_ms, usage, .. } => self.tokens.push((at_ms, usage)),
            MetricsEvent::ArtifactVerdict { at_ms, passed, .. } => {
                self.verdicts.push((at_ms, passed))
            }
        }
    }

    /// Drop samples older than the widest window.
    pub fn prune(&mut self, now_ms: u64) {
        let widest = self.windows_hours.iter().copied().max().unwrap_or(0);
        let cutoff = now_ms.saturating_sub(widest.saturating_mul(HOUR_MS));
        self.outcomes.retain(|_, (at, _)| *at >= cutoff);
        self.tokens.retain(|(at, _)| *at >= cutoff);
        self.reschedules.retain(|at| *at >= cutoff);
        self.verdicts.retain(|(at, _)| *at >= cutoff);
    }

    /// Stats for each configured window ending at `now_ms`.
    pub fn window_stats(&self, now_ms: u64) -> Vec<WindowStats> {
        self.windows_hours
            .iter()
            .map(|&hours| {
                let since = now_ms.saturating_sub(hours.saturating_mul(HOUR_MS));
                let in_window = |at: u64| at >= since && at <= now_ms;

                let (completed, failed) = self
                    .outcomes
                    .values()
                    .filter(|(at, _)| in_window(*at))
                    .fold((0usize, 0usize), |(ok, bad), (_, completed)| {
                        if *completed {
                            (ok + 1, bad)
                        } else {
                            (ok, bad + 1)
                        }
                    });
                let tokens = self
                    .tokens
                    .iter()
                    .filter(|(at, _)| in_window(*at))
                    .map(|(_, usage)| usage.total_tokens)
                    .sum();
                let (verdicts_passed, verdicts_failed) = self
                    .verdicts
                    .iter()
                    .filter(|(at, _)| in_window(*at))
                    .fold((0usize, 0usize), |(ok, bad), (_, passed)| {
                        if *passed {
                            (ok + 1, bad)
                        } else {
                            (ok, bad + 1)
                        }
                    });

                WindowStats {
                    window: Duration::from_millis(hours.saturating_mul(HOUR_MS)),
                    completed,
                    failed,
                    success_rate: WindowStats::rate(completed, failed),
                    retries: self.reschedules.iter().filter(|at| in_window(**at)).count(),
                    tokens,
                    validations_passed: verdicts_passed,
                    validations_failed: verdicts_failed,
                }
            })
            .collect()
    }
}
