//! Content Lifecycle Store
//!
//! Durable ownership of work items and artifacts. The pipeline only ever holds copies;
//! every mutation goes back through a conditional commit so two workers can never both
//! act on the same claim.

pub mod memory;
pub mod persistence;

pub use memory::MemoryLifecycleStore;
pub use persistence::SledLifecycleStore;

use crate::content::{Artifact, ArtifactStatus};
use crate::error::StorageError;
use crate::queue::WorkItem;
use crate::types::{ArtifactId, WorkItemId};

/// Repository interface over work items and artifacts.
pub trait LifecycleStore: Send + Sync {
    /// Insert a new work item. Pending items become visible to `claim_due`.
    fn insert_work_item(&self, item: &WorkItem) -> Result<(), StorageError>;

    fn get_work_item(&self, id: &WorkItemId) -> Result<Option<WorkItem>, StorageError>;

    /// Atomically claim up to `limit` Pending items with `next_eligible_at_ms <= now_ms`,
    /// oldest-due first, marking each Processing with `claimed_at_ms = now_ms`.
    fn claim_due(&self, now_ms: u64, limit: usize) -> Result<Vec<WorkItem>, StorageError>;

    /// Replace the stored item with `next` only if the stored record is still the same
    /// claim as `expected`. Returns false when the record moved on (cancelled, recovered).
    fn commit_work_item(&self, expected: &WorkItem, next: &WorkItem)
        -> Result<bool, StorageError>;

    fn list_work_items(&self) -> Result<Vec<WorkItem>, StorageError>;

    /// Insert or overwrite an artifact.
    fn put_artifact(&self, artifact: &Artifact) -> Result<(), StorageError>;

    fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>, StorageError>;

    /// Overwrite the artifact only if its stored status is still `expected_status`.
    fn commit_artifact(
        &self,
        expected_status: ArtifactStatus,
        next: &Artifact,
    ) -> Result<bool, StorageError>;

    fn list_artifacts(&self) -> Result<Vec<Artifact>, StorageError>;

    fn delete_artifact(&self, id: &ArtifactId) -> Result<bool, StorageError>;

    /// Flush pending writes to durable media.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
