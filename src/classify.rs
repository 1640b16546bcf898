//! Error Classifier
//!
//! Maps collaborator failures onto the three-way retry decision used by the queue:
//! retry with backoff, retry after an explicit wait, or give up.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure returned by a generation or publish collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Other(String),
}

impl CollaboratorError {
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    pub fn timeout(deadline: Duration) -> Self {
        Self::Timeout(format!("no response within {}ms", deadline.as_millis()))
    }
}

/// Retry decision for a single failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    Permanent,
    RateLimited(Duration),
}

/// Terminal or transient failure kind recorded on a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    RateLimited,
    Permanent,
    ExhaustedRetries,
    Cancelled,
    Abandoned,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Permanent => "permanent",
            FailureKind::ExhaustedRetries => "exhausted_retries",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier with a ceiling for errors it does not recognise.
#[derive(Debug, Clone, Copy)]
pub struct ErrorClassifier {
    unknown_error_ceiling: u32,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ErrorClassifier {
    /// `unknown_error_ceiling` is the number of attempts an unrecognised error may consume
    /// before it is treated as permanent.
    pub fn new(unknown_error_ceiling: u32) -> Self {
        Self {
            unknown_error_ceiling: unknown_error_ceiling.max(1),
        }
    }

    /// Classify `error` raised while running attempt number `attempt` (0-indexed).
    pub fn classify(&self, error: &CollaboratorError, attempt: u32) -> Classification {
        match error {
            CollaboratorError::RateLimited {
                retry_after: Some(hint),
                ..
            } => Classification::RateLimited(*hint),
            CollaboratorError::RateLimited {
                retry_after: None, ..
            }
            | CollaboratorError::Timeout(_)
            | CollaboratorError::Connection(_)
            | CollaboratorError::Unavailable(_)
            | CollaboratorError::MalformedResponse(_) => Classification::Retryable,
            CollaboratorError::Authentication(_)
            | CollaboratorError::MalformedRequest(_)
            | CollaboratorError::NotFound(_)
            | CollaboratorError::PermissionDenied(_) => Classification::Permanent,
            CollaboratorError::Other(_) => {
                if attempt.saturating_add(1) >= self.unknown_error_ceiling {
                    Classification::Permanent
                } else {
                    Classification::Retryable
                }
            }
        }
    }
}

/// Classify with the default ceiling for unknown errors.
pub fn classify(error: &CollaboratorError, attempt: u32) -> Classification {
    ErrorClassifier::default().classify(error, attempt)
}
