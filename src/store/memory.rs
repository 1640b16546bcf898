//! In-memory lifecycle store for tests, benches and ephemeral runs.

use crate::content::{Artifact, ArtifactStatus};
use crate::error::StorageError;
use crate::queue::{WorkItem, WorkItemStatus};
use crate::store::LifecycleStore;
use crate::types::{ArtifactId, WorkItemId};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

#[derive(Default)]
struct Inner {
    items: HashMap<WorkItemId, WorkItem>,
    due: BTreeSet<(u64, WorkItemId)>,
    artifacts: HashMap<ArtifactId, Artifact>,
}

impl Inner {
    fn index(&mut self, item: &WorkItem) {
        if item.status == WorkItemStatus::Pending {
            self.due.insert((item.next_eligible_at_ms, item.id));
        }
    }
}

/// [`LifecycleStore`] held entirely in memory behind one lock.
#[derive(Default)]
pub struct MemoryLifecycleStore {
    inner: RwLock<Inner>,
}

impl MemoryLifecycleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LifecycleStore for MemoryLifecycleStore {
    fn insert_work_item(&self, item: &WorkItem) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        if let Some(previous) = inner.items.insert(item.id, item.clone()) {
            inner.due.remove(&(previous.next_eligible_at_ms, previous.id));
        }
        inner.index(item);
        Ok(())
    }

    fn get_work_item(&self, id: &WorkItemId) -> Result<Option<WorkItem>, StorageError> {
        Ok(self.inner.read().items.get(id).cloned())
    }

    fn claim_due(&self, now_ms: u64, limit: usize) -> Result<Vec<WorkItem>, StorageError> {
        let mut inner = self.inner.write();
        let keys: Vec<(u64, WorkItemId)> = inner
            .due
            .range(..=(now_ms, WorkItemId::max()))
            .take(limit)
            .copied()
            .collect();

        let mut claimed = Vec::with_capacity(keys.len());
        for key in keys {
            inner.due.remove(&key);
            if let Some(item) = inner.items.get_mut(&key.1) {
                if item.is_due(now_ms) {
                    item.status = WorkItemStatus::Processing;
                    item.claimed_at_ms = Some(now_ms);
                    item.updated_at_ms = now_ms;
                    claimed.push(item.clone());
                }
            }
        }
        Ok(claimed)
    }

    fn commit_work_item(
        &self,
        expected: &WorkItem,
        next: &WorkItem,
    ) -> Result<bool, StorageError> {
        let mut inner = self.inner.write();
        let current = inner
            .items
            .get(&expected.id)
            .cloned()
            .ok_or(StorageError::WorkItemNotFound(expected.id))?;
        if !current.same_claim(expected) {
            return Ok(false);
        }
        inner.due.remove(&(current.next_eligible_at_ms, current.id));
        inner.items.insert(next.id, next.clone());
        inner.index(next);
        Ok(true)
    }

    fn list_work_items(&self) -> Result<Vec<WorkItem>, StorageError> {
        let mut items: Vec<_> = self.inner.read().items.values().cloned().collect();
        items.sort_by_key(|item| item.created_at_ms);
        Ok(items)
    }

    fn put_artifact(&self, artifact: &Artifact) -> Result<(), StorageError> {
        self.inner
            .write()
            .artifacts
            .insert(artifact.id, artifact.clone());
        Ok(())
    }

    fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>, StorageError> {
        Ok(self.inner.read().artifacts.get(id).cloned())
    }

    fn commit_artifact(
        &self,
        expected_status: ArtifactStatus,
        next: &Artifact,
    ) -> Result<bool, StorageError> {
        let mut inner = self.inner.write();
        let current = inner
            .artifacts
            .get_mut(&next.id)
            .ok_or(StorageError::ArtifactNotFound(next.id))?;
        if current.status != expected_status {
            return Ok(false);
        }
        *current = next.clone();
        Ok(true)
    }

    fn list_artifacts(&self) -> Result<Vec<Artifact>, StorageError> {
        let mut artifacts: Vec<_> = self.inner.read().artifacts.values().cloned().collect();
        artifacts.sort_by_key(|a| a.created_at_ms);
        Ok(artifacts)
    }

    fn delete_artifact(&self, id: &ArtifactId) -> Result<bool, StorageError> {
        Ok(self.inner.write().artifacts.remove(id).is_some())
    }
}
