//! Work items: the schedulable unit tracked by the retry queue.

use crate::classify::FailureKind;
use crate::content::{ContentKind, TaxonomyRefs};
use crate::types::{ArtifactId, WorkItemId};
use serde::{Deserialize, Serialize};

/// Status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WorkItemStatus {
    pub const ALL: [WorkItemStatus; 4] = [
        WorkItemStatus::Pending,
        WorkItemStatus::Processing,
        WorkItemStatus::Completed,
        WorkItemStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkItemStatus::Pending => "pending",
            WorkItemStatus::Processing => "processing",
            WorkItemStatus::Completed => "completed",
            WorkItemStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkItemStatus::Completed | WorkItemStatus::Failed)
    }
}

impl std::fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a work item asks the pipeline to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum WorkPurpose {
    /// Call the generation collaborator and validate the result.
    Generate,
    /// Hand an approved artifact to the publish collaborator.
    Publish { artifact_id: ArtifactId },
}

/// Last classified failure recorded on a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub kind: FailureKind,
    pub message: String,
}

impl ErrorSummary {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A unit of retry-eligible work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub payload_ref: String,
    pub kind: ContentKind,
    pub purpose: WorkPurpose,
    #[serde(default)]
    pub taxonomy: TaxonomyRefs,
    pub status: WorkItemStatus,
    pub attempt: u32,
    pub next_eligible_at_ms: u64,
    pub last_error: Option<ErrorSummary>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    /// Set when a worker claims the item; identifies that claim.
    pub claimed_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
}

impl WorkItem {
    pub fn new(
        payload_ref: impl Into<String>,
        kind: ContentKind,
        purpose: WorkPurpose,
        taxonomy: TaxonomyRefs,
        now_ms: u64,
    ) -> Self {
        Self {
            id: WorkItemId::new(),
            payload_ref: payload_ref.into(),
            kind,
            purpose,
            taxonomy,
            status: WorkItemStatus::Pending,
            attempt: 0,
            next_eligible_at_ms: now_ms,
            last_error: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            claimed_at_ms: None,
            finished_at_ms: None,
        }
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.status == WorkItemStatus::Pending && self.next_eligible_at_ms <= now_ms
    }

    /// True if `other` is the same claim of the same item.
    pub fn same_claim(&self, other: &WorkItem) -> bool {
        self.id == other.id
            && self.status == other.status
            && self.attempt == other.attempt
            && self.claimed_at_ms == other.claimed_at_ms
    }

    /// Reason string shown to callers for a terminal failure.
    pub fn failure_reason(&self) -> Option<String> {
        if self.status != WorkItemStatus::Failed {
            return None;
        }
        Some(match &self.last_error {
            Some(err) => match err.kind {
                FailureKind::ExhaustedRetries => {
                    format!("gave up after {} attempts: {}", self.attempt + 1, err.message)
                }
                FailureKind::Cancelled => "cancelled".to_string(),
                _ => err.message.clone(),
            },
            None => "failed".to_string(),
        })
    }
}

/// Big-endian due-index key: eligible time first so keys sort oldest-due first.
pub(crate) fn due_key(next_eligible_at_ms: u64, id: &WorkItemId) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&next_eligible_at_ms.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

pub(crate) fn parse_due_key(key: &[u8]) -> Option<(u64, WorkItemId)> {
    if key.len() != 24 {
        return None;
    }
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&key[..8]);
    let id = WorkItemId::from_slice(&key[8..])?;
    Some((u64::from_be_bytes(ts), id))
}
