//! In-process collaborators that replay scripted outcomes.
//!
//! Used by tests, benches, and `gatehouse run --dry-run`.

use crate::classify::CollaboratorError;
use crate::collaborator::{
    GeneratedContent, GenerationRequest, Generator, PublishedRef, Publisher,
};
use crate::content::Artifact;
use crate::types::ArtifactId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

type GenerateOutcome = Result<GeneratedContent, CollaboratorError>;

/// Generator that pops queued outcomes, then falls back to a fixed one.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<GenerateOutcome>>,
    fallback: GenerateOutcome,
    delay: Option<Duration>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(fallback: GenerateOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always return `body`.
    pub fn always(body: serde_json::Value) -> Self {
        Self::new(Ok(GeneratedContent::new(body)))
    }

    /// Return `outcome` on the next call before falling back.
    pub fn then(self, outcome: GenerateOutcome) -> Self {
        self.script.lock().push_back(outcome);
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GenerateOutcome {
        self.calls.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Publisher that stores artifacts in memory, keyed by artifact id.
#[derive(Default)]
pub struct ScriptedPublisher {
    failures: Mutex<VecDeque<CollaboratorError>>,
    published: Mutex<HashMap<ArtifactId, PublishedRef>>,
}

impl ScriptedPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next publish call with `error`.
    pub fn then_fail(self, error: CollaboratorError) -> Self {
        self.failures.lock().push_back(error);
        self
    }

    pub fn published(&self) -> HashMap<ArtifactId, PublishedRef> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(&self, artifact: &Artifact) -> Result<PublishedRef, CollaboratorError> {
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        let mut published = self.published.lock();
        let reference = published
            .entry(artifact.id)
            .or_insert_with(|| PublishedRef(format!("memory://{}/{}", artifact.kind, artifact.id)));
        Ok(reference.clone())
    }
}
