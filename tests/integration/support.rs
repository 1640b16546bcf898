//! Shared fixtures for integration tests: valid bodies per kind and a pipeline harness
//! driven by a manual clock.

use gatehouse::backoff::FixedJitter;
use gatehouse::collaborator::{ScriptedGenerator, ScriptedPublisher};
use gatehouse::orchestrator::{Pipeline, PipelineSettings};
use gatehouse::queue::{RetryPolicy, RetryQueue};
use gatehouse::store::{LifecycleStore, MemoryLifecycleStore};
use gatehouse::types::ManualClock;
use gatehouse::validation::Taxonomy;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const START_MS: u64 = 1_700_000_000_000;

pub fn article_body() -> Value {
    json!({
        "title": "Understanding backpressure",
        "summary": "How bounded queues keep producers from overwhelming slower consumers.",
        "sections": [
            {
                "heading": "Bounded buffers",
                "body": "A bounded buffer forces a producer to wait once capacity is reached, which keeps memory flat under load."
            },
            {
                "heading": "Signalling demand",
                "body": "Consumers can advertise how many items they are ready to accept so producers never push more than that."
            },
            {
                "heading": "Dropping and sampling",
                "body": "When waiting is not acceptable, a system can shed load by dropping or sampling items at the edge instead."
            }
        ]
    })
}

pub fn course_body() -> Value {
    let modules: Vec<Value> = ["Queue fundamentals", "Retry policies", "Operating the pipeline"]
        .iter()
        .enumerate()
        .map(|(i, title)| {
            json!({
                "title": title,
                "objectives": [format!("Explain the key ideas of part {}", i + 1)],
                "duration_minutes": 20 + 10 * i
            })
        })
        .collect();
    json!({
        "title": "Reliable background work",
        "description": "A practical course on scheduling, retrying and observing background jobs in production.",
        "level": "intermediate",
        "modules": modules
    })
}

pub fn video_script_body() -> Value {
    let sentence = "Backpressure lets a slow consumer tell a fast producer to wait.";
    let script = vec![sentence; 10].join(" ");
    json!({
        "title": "Backpressure in forty seconds",
        "topic": "Flow control between services",
        "script": script
    })
}

/// A pipeline over an in-memory store with deterministic time and no jitter.
pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub queue: Arc<RetryQueue>,
    pub clock: Arc<ManualClock>,
    pub generator: Arc<ScriptedGenerator>,
    pub publisher: Arc<ScriptedPublisher>,
}

pub struct HarnessBuilder {
    store: Arc<dyn LifecycleStore>,
    policy: RetryPolicy,
    settings: PipelineSettings,
    taxonomy: Taxonomy,
    publisher: ScriptedPublisher,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryLifecycleStore::new()),
            policy: RetryPolicy::default(),
            settings: PipelineSettings::default(),
            taxonomy: Taxonomy::default(),
            publisher: ScriptedPublisher::new(),
        }
    }

    pub fn store(mut self, store: Arc<dyn LifecycleStore>) -> Self {
        self.store = store;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts;
        self
    }

    pub fn auto_publish(mut self) -> Self {
        self.settings.auto_publish = true;
        self
    }

    pub fn taxonomy(mut self, pairs: &[(&str, &[&str])]) -> Self {
        let categories: BTreeMap<String, Vec<String>> = pairs
            .iter()
            .map(|(cat, subs)| (cat.to_string(), subs.iter().map(|s| s.to_string()).collect()))
            .collect();
        self.taxonomy = Taxonomy::new(categories);
        self
    }

    pub fn publisher(mut self, publisher: ScriptedPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn build(self, generator: ScriptedGenerator) -> Harness {
        let clock = Arc::new(ManualClock::new(START_MS));
        let queue = Arc::new(RetryQueue::with_sources(
            self.store,
            self.policy,
            clock.clone(),
            Box::new(FixedJitter::none()),
        ));
        let generator = Arc::new(generator);
        let publisher = Arc::new(self.publisher);
        let pipeline = Pipeline::new(
            Arc::clone(&queue),
            Arc::new(self.taxonomy),
            generator.clone(),
            publisher.clone(),
            self.settings,
        )
        .unwrap();
        Harness {
            pipeline: Arc::new(pipeline),
            queue,
            clock,
            generator,
            publisher,
        }
    }
}
