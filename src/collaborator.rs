//! External collaborators
//!
//! Generation and publish backends the pipeline drives. Implementations only call out and
//! return; retry, backoff and classification all live in the queue.

pub mod http;
pub mod scripted;

pub use http::{HttpGenerator, HttpPublisher};
pub use scripted::{ScriptedGenerator, ScriptedPublisher};

use crate::classify::CollaboratorError;
use crate::content::{Artifact, ContentKind, TaxonomyRefs};
use crate::types::WorkItemId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token accounting reported by a generation backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// What the pipeline asks a generator to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub work_item_id: WorkItemId,
    pub payload_ref: String,
    pub kind: ContentKind,
    pub taxonomy: TaxonomyRefs,
    pub attempt: u32,
}

/// Successful generation output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedContent {
    pub body: Value,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl GeneratedContent {
    pub fn new(body: Value) -> Self {
        Self { body, usage: None }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Reference returned by the publish backend for a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRef(pub String);

impl std::fmt::Display for PublishedRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces artifact bodies.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedContent, CollaboratorError>;
}

/// Durably stores approved artifacts. Must be idempotent per artifact id.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, artifact: &Artifact) -> Result<PublishedRef, CollaboratorError>;
}
