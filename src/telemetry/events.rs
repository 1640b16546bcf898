//! Metrics event schema.

use crate::classify::FailureKind;
use crate::collaborator::TokenUsage;
use crate::types::{ArtifactId, WorkItemId};
use serde::{Deserialize, Serialize};

/// One observation emitted by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricsEvent {
    /// A work item reached a terminal status.
    WorkItemFinished {
        at_ms: u64,
        work_item_id: WorkItemId,
        completed: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure: Option<FailureKind>,
    },
    /// A failed attempt was scheduled for retry.
    Rescheduled {
        at_ms: u64,
        work_item_id: WorkItemId,
        attempt: u32,
        delay_ms: u64,
    },
    /// A generation call reported token usage.
    TokensUsed {
        at_ms: u64,
        work_item_id: WorkItemId,
        usage: TokenUsage,
    },
    /// A validation chain produced a verdict.
    ArtifactVerdict {
        at_ms: u64,
        artifact_id: ArtifactId,
        passed: bool,
    },
}

impl MetricsEvent {
    pub fn at_ms(&self) -> u64 {
        match self {
            MetricsEvent::WorkItemFinished { at_ms, .. }
            | MetricsEvent::Rescheduled { at_ms, .. }
            | MetricsEvent::TokensUsed { at_ms, .. }
            | MetricsEvent::ArtifactVerdict { at_ms, .. } => *at_ms,
        }
    }
}
