//! Read-only health aggregate.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::content::ArtifactStatus;
use crate::error::StorageError;
use crate::queue::WorkItemStatus;
use crate::store::LifecycleStore;
use crate::telemetry::routing::aggregator::MetricsAggregator;

/// Aggregates for one rolling window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStats {
    #[serde(with = "duration_hours")]
    pub window: Duration,
    pub completed: usize,
    pub failed: usize,
    /// `completed / (completed + failed)`; `None` when nothing finished in the window.
    pub success_rate: Option<f64>,
    pub retries: usize,
    pub tokens: u64,
    pub validations_passed: usize,
    pub validations_failed: usize,
}

impl WindowStats {
    pub fn rate(completed: usize, failed: usize) -> Option<f64> {
        let total = completed + failed;
        (total > 0).then(|| completed as f64 / total as f64)
    }

    pub fn hours(&self) -> u64 {
        self.window.as_secs() / 3600
    }
}

mod duration_hours {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs() / 3600)
    }
}

/// Snapshot of queue and lifecycle state plus rolling windows.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub generated_at_ms: u64,
    pub work_items: BTreeMap<WorkItemStatus, usize>,
    /// Attempt count to number of items at that count.
    pub attempt_distribution: BTreeMap<u32, usize>,
    pub artifacts: BTreeMap<ArtifactStatus, usize>,
    pub windows: Vec<WindowStats>,
}

impl HealthReport {
    pub fn collect(
        store: &dyn LifecycleStore,
        aggregator: &MetricsAggregator,
        now_ms: u64,
    ) -> Result<Self, StorageError> {
        let mut work_items: BTreeMap<WorkItemStatus, usize> =
            WorkItemStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut attempt_distribution = BTreeMap::new();
        for item in store.list_work_items()? {
            *work_items.entry(item.status).or_default() += 1;
            *attempt_distribution.entry(item.attempt).or_default() += 1;
        }

        let mut artifacts: BTreeMap<ArtifactStatus, usize> =
            ArtifactStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for artifact in store.list_artifacts()? {
            *artifacts.entry(artifact.status).or_default() += 1;
        }

        Ok(Self {
            generated_at_ms: now_ms,
            work_items,
            attempt_distribution,
            artifacts,
            windows: aggregator.window_stats(now_ms),
        })
    }

    pub fn total_work_items(&self) -> usize {
        self.work_items.values().sum()
    }
}
