//! Gatehouse: retry-scheduled generation behind a validation gate
//!
//! Work items wait in a durable queue with adaptive backoff. Claimed items are generated by
//! an external collaborator, judged by a five-layer validation chain, staged for human
//! approval, and only then handed to a publish collaborator.

pub mod backoff;
pub mod classify;
pub mod cli;
pub mod collaborator;
pub mod config;
pub mod content;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod queue;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod validation;

pub use backoff::{compute_delay, BackoffPolicy, FixedJitter, JitterSource, RandomJitter};
pub use classify::{Classification, CollaboratorError, ErrorClassifier, FailureKind};
pub use content::{Artifact, ArtifactStatus, ContentKind, TaxonomyRefs};
pub use error::{PipelineError, StorageError};
pub use orchestrator::{ItemOutcome, Pipeline, PipelineSettings, WorkerPool, WorkerPoolConfig};
pub use queue::{RetryPolicy, RetryQueue, WorkItem, WorkItemStatus};
pub use types::{ArtifactId, Clock, ManualClock, SystemClock, WorkItemId};
pub use validation::{Taxonomy, ValidationChain, ValidationLayer, ValidationResult};
