//! Sled-backed persistence for the lifecycle store.

use crate::content::{Artifact, ArtifactStatus};
use crate::error::StorageError;
use crate::queue::item::{due_key, parse_due_key};
use crate::queue::{WorkItem, WorkItemStatus};
use crate::store::LifecycleStore;
use crate::types::{ArtifactId, WorkItemId};
use parking_lot::Mutex;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::{debug, warn};

const TREE_WORK_ITEMS: &str = "work_items";
const TREE_DUE_INDEX: &str = "due_index";
const TREE_ARTIFACTS: &str = "artifacts";

type TxResult = Result<(), ConflictableTransactionError<()>>;

fn transaction_error(err: TransactionError<()>) -> StorageError {
    match err {
        TransactionError::Storage(e) => e.into(),
        TransactionError::Abort(()) => StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            "work item transaction aborted",
        )),
    }
}

/// Sled implementation of [`LifecycleStore`].
///
/// Pending items are mirrored in a due index keyed by `(next_eligible_at_ms, id)` so
/// claiming walks keys in due order. A record and its index key are always written in one
/// transaction, and opening the store restores keys for any Pending record that lacks one.
/// All read-modify-write paths hold `write_lock`.
pub struct SledLifecycleStore {
    db: Db,
    work_items: Tree,
    due_index: Tree,
    artifacts: Tree,
    write_lock: Mutex<()>,
}

impl SledLifecycleStore {
    /// Open (or create) a store at the given directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        Self::from_db(db)
    }

    pub fn from_db(db: Db) -> Result<Self, StorageError> {
        let work_items = db.open_tree(TREE_WORK_ITEMS)?;
        let due_index = db.open_tree(TREE_DUE_INDEX)?;
        let artifacts = db.open_tree(TREE_ARTIFACTS)?;
        let store = Self {
            db,
            work_items,
            due_index,
            artifacts,
            write_lock: Mutex::new(()),
        };
        store.reindex_pending()?;
        Ok(store)
    }

    /// Restore due-index keys for Pending records that have none. Returns how many were added.
    pub fn reindex_pending(&self) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock();
        let mut restored = 0;
        for entry in self.work_items.iter() {
            let (key, value) = entry?;
            let item = match serde_json::from_slice::<WorkItem>(&value) {
                Ok(item) => item,
                Err(e) => {
                    warn!(key_len = key.len(), error = %e, "Skipping unreadable work item");
                    continue;
                }
            };
            if item.status != WorkItemStatus::Pending {
                continue;
            }
            let due = due_key(item.next_eligible_at_ms, &item.id);
            if !self.due_index.contains_key(due)? {
                self.due_index.insert(due, &b""[..])?;
                restored += 1;
            }
        }
        if restored > 0 {
            warn!(restored, "Restored missing due index entries");
        }
        Ok(restored)
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &Db {
        &self.db
    }

    fn read_item(&self, id: &WorkItemId) -> Result<Option<WorkItem>, StorageError> {
        match self.work_items.get(id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Write `next` and move its due-index key in one transaction. `previous` is the record
    /// being replaced, if any.
    fn write_indexed(&self, previous: Option<&WorkItem>, next: &WorkItem) -> Result<(), StorageError> {
        let value = serde_json::to_vec(next)?;
        let stale_key = previous
            .filter(|p| p.status == WorkItemStatus::Pending)
            .map(|p| due_key(p.next_eligible_at_ms, &p.id));
        let fresh_key = (next.status == WorkItemStatus::Pending)
            .then(|| due_key(next.next_eligible_at_ms, &next.id));

        (&self.work_items, &self.due_index)
            .transaction(|(items, due)| -> TxResult {
                if let Some(key) = &stale_key {
                    due.remove(&key[..])?;
                }
                items.insert(&next.id.as_bytes()[..], value.as_slice())?;
                if let Some(key) = &fresh_key {
                    due.insert(&key[..], &b""[..])?;
                }
                Ok(())
            })
            .map_err(transaction_error)
    }

    fn read_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>, StorageError> {
        match self.artifacts.get(id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn write_artifact(&self, artifact: &Artifact) -> Result<(), StorageError> {
        let value = serde_json::to_vec(artifact)?;
        self.artifacts.insert(artifact.id.as_bytes(), value)?;
        Ok(())
    }
}

impl LifecycleStore for SledLifecycleStore {
    fn insert_work_item(&self, item: &WorkItem) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        self.write_indexed(None, item)
    }

    fn get_work_item(&self, id: &WorkItemId) -> Result<Option<WorkItem>, StorageError> {
        self.read_item(id)
    }

    fn claim_due(&self, now_ms: u64, limit: usize) -> Result<Vec<WorkItem>, StorageError> {
        let _guard = self.write_lock.lock();
        let mut claimed = Vec::new();
        let mut stale_keys = Vec::new();

        for entry in self.due_index.iter() {
            if claimed.len() >= limit {
                break;
            }
            let (key, _) = entry?;
            let Some((due_at, id)) = parse_due_key(&key) else {
                warn!(key_len = key.len(), "Dropping malformed due index key");
                stale_keys.push(key);
                continue;
            };
            if due_at > now_ms {
                break;
            }

            match self.read_item(&id)? {
                Some(pending) if pending.is_due(now_ms) && pending.next_eligible_at_ms == due_at => {
                    let mut item = pending.clone();
                    item.status = WorkItemStatus::Processing;
                    item.claimed_at_ms = Some(now_ms);
                    item.updated_at_ms = now_ms;
                    self.write_indexed(Some(&pending), &item)?;
                    claimed.push(item);
                }
                _ => stale_keys.push(key),
            }
        }

        for key in stale_keys {
            self.due_index.remove(key)?;
        }

        if !claimed.is_empty() {
            debug!(count = claimed.len(), now_ms, "Claimed due work items");
        }
        Ok(claimed)
    }

    fn commit_work_item(
        &self,
        expected: &WorkItem,
        next: &WorkItem,
    ) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock();
        let Some(current) = self.read_item(&expected.id)? else {
            return Err(StorageError::WorkItemNotFound(expected.id));
        };
        if !current.same_claim(expected) {
            return Ok(false);
        }
        self.write_indexed(Some(&current), next)?;
        Ok(true)
    }

    fn list_work_items(&self) -> Result<Vec<WorkItem>, StorageError> {
        let mut items = Vec::new();
        for entry in self.work_items.iter() {
            let (_, value) = entry?;
            items.push(serde_json::from_slice::<WorkItem>(&value)?);
        }
        items.sort_by_key(|item| item.created_at_ms);
        Ok(items)
    }

    fn put_artifact(&self, artifact: &Artifact) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        self.write_artifact(artifact)
    }

    fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>, StorageError> {
        self.read_artifact(id)
    }

    fn commit_artifact(
        &self,
        expected_status: ArtifactStatus,
        next: &Artifact,
    ) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock();
        let Some(current) = self.read_artifact(&next.id)? else {
            return Err(StorageError::ArtifactNotFound(next.id));
        };
        if current.status != expected_status {
            return Ok(false);
        }
        self.write_artifact(next)?;
        Ok(true)
    }

    fn list_artifacts(&self) -> Result<Vec<Artifact>, StorageError> {
        let mut artifacts = Vec::new();
        for entry in self.artifacts.iter() {
            let (_, value) = entry?;
            artifacts.push(serde_json::from_slice::<Artifact>(&value)?);
        }
        artifacts.sort_by_key(|a| a.created_at_ms);
        Ok(artifacts)
    }

    fn delete_artifact(&self, id: &ArtifactId) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock();
        Ok(self.artifacts.remove(id.as_bytes())?.is_some())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to flush database: {}", e),
            ))
        })?;
        Ok(())
    }
}
