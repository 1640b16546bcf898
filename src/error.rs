//! Error types for the gatehouse pipeline.

use crate::content::ArtifactStatus;
use crate::types::{ArtifactId, WorkItemId};
use crate::validation::ValidationResult;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Work item not found: {0}")]
    WorkItemNotFound(WorkItemId),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(ArtifactId),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("sled: {}", err),
        ))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Corrupt(err.to_string())
    }
}

/// Errors surfaced to callers of the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Work item not found: {0}")]
    WorkItemNotFound(WorkItemId),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(ArtifactId),

    #[error("Artifact {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ArtifactId,
        from: ArtifactStatus,
        to: ArtifactStatus,
    },

    #[error("Request rejected before generation: {}", .0.errors.join("; "))]
    Preflight(ValidationResult),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}
