//! Artifacts: generated content and its lifecycle state machine.

use crate::content::ContentKind;
use crate::error::PipelineError;
use crate::types::{ArtifactId, WorkItemId};
use crate::validation::ValidationResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of an artifact.
///
/// ```text
/// Draft ──▶ Staged ──▶ Approved ──▶ Published
///   │          │          │  ▲
///   ▼          ▼          ▼  │
/// Rejected ◀───┘     PublishFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Draft,
    Staged,
    Approved,
    Rejected,
    Published,
    PublishFailed,
}

impl ArtifactStatus {
    pub const ALL: [ArtifactStatus; 6] = [
        ArtifactStatus::Draft,
        ArtifactStatus::Staged,
        ArtifactStatus::Approved,
        ArtifactStatus::Rejected,
        ArtifactStatus::Published,
        ArtifactStatus::PublishFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactStatus::Draft => "draft",
            ArtifactStatus::Staged => "staged",
            ArtifactStatus::Approved => "approved",
            ArtifactStatus::Rejected => "rejected",
            ArtifactStatus::Published => "published",
            ArtifactStatus::PublishFailed => "publish_failed",
        }
    }

    pub fn can_transition_to(self, next: ArtifactStatus) -> bool {
        use ArtifactStatus::*;
        matches!(
            (self, next),
            (Draft, Staged)
                | (Draft, Rejected)
                | (Staged, Approved)
                | (Staged, Rejected)
                | (Approved, Published)
                | (Approved, PublishFailed)
                | (PublishFailed, Approved)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ArtifactStatus::Rejected | ArtifactStatus::Published)
    }
}

impl std::fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Taxonomy identifiers an artifact is filed under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyRefs {
    pub category_id: Option<String>,
    pub subcategory_id: Option<String>,
}

impl TaxonomyRefs {
    pub fn new(category_id: Option<String>, subcategory_id: Option<String>) -> Self {
        Self {
            category_id,
            subcategory_id,
        }
    }
}

/// One complete validation run over one body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub run_at_ms: u64,
    pub body_digest: String,
    pub passed: bool,
    pub results: Vec<ValidationResult>,
}

impl ValidationRecord {
    pub fn failed_layers(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Generated content subject to validation and approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub kind: ContentKind,
    pub body: Value,
    pub status: ArtifactStatus,
    pub validation_history: Vec<ValidationRecord>,
    pub payload_ref: String,
    pub taxonomy: TaxonomyRefs,
    pub source_work_item: WorkItemId,
    pub body_digest: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub generated_at_ms: Option<u64>,
    pub rejection_reason: Option<String>,
    pub published_ref: Option<String>,
    pub publish_attempts: u32,
    pub last_publish_error: Option<String>,
}

impl Artifact {
    /// Create a draft from a freshly generated body.
    pub fn draft(
        kind: ContentKind,
        body: Value,
        payload_ref: impl Into<String>,
        taxonomy: TaxonomyRefs,
        source_work_item: WorkItemId,
        now_ms: u64,
    ) -> Self {
        let digest = body_digest(&body);
        Self {
            id: ArtifactId::new(),
            kind,
            body,
            status: ArtifactStatus::Draft,
            validation_history: Vec::new(),
            payload_ref: payload_ref.into(),
            taxonomy,
            source_work_item,
            body_digest: digest,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            generated_at_ms: Some(now_ms),
            rejection_reason: None,
            published_ref: None,
            publish_attempts: 0,
            last_publish_error: None,
        }
    }

    /// Move to `next`, enforcing the lifecycle state machine.
    pub fn transition(&mut self, next: ArtifactStatus, now_ms: u64) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at_ms = now_ms;
        Ok(())
    }

    pub fn record_validation(&mut self, record: ValidationRecord) {
        self.updated_at_ms = self.updated_at_ms.max(record.run_at_ms);
        self.validation_history.push(record);
    }

    pub fn latest_validation(&self) -> Option<&ValidationRecord> {
        self.validation_history.last()
    }

    pub fn title(&self) -> Option<&str> {
        self.body.get("title").and_then(Value::as_str)
    }
}

/// blake3 hex digest of the canonical JSON encoding of a body.
pub fn body_digest(body: &Value) -> String {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    hex::encode(blake3::hash(&bytes).as_bytes())
}
