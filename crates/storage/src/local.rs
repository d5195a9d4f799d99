//! Typed view over the key-value store.
//!
//! Only raw records and the pending queue are persisted; aggregates are
//! always recomputed by the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use study_core::model::{PendingQueue, ProgressRecord};

use crate::repository::{KeyValueStore, StorageError};

const PROGRESS_KEY: &str = "jlpt-progress";
const PENDING_KEY: &str = "jlpt-pending-updates";
const DEMO_KEY: &str = "jlpt-demo-data";
const LAST_SYNC_KEY: &str = "jlpt-last-sync";

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[derive(Clone)]
pub struct LocalStorage {
    kv: Arc<dyn KeyValueStore>,
}

impl LocalStorage {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.kv.get(key).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(ser),
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(ser)?;
        self.kv.set(key, &raw).await
    }

    /// Progress records mirrored by the sync service.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails or the stored JSON is invalid.
    pub async fn load_records(&self) -> Result<Vec<ProgressRecord>, StorageError> {
        Ok(self.read_json(PROGRESS_KEY).await?.unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the records cannot be serialized or stored.
    pub async fn save_records(&self, records: &[ProgressRecord]) -> Result<(), StorageError> {
        self.write_json(PROGRESS_KEY, records).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails or the stored JSON is invalid.
    pub async fn load_pending(&self) -> Result<PendingQueue, StorageError> {
        Ok(self.read_json(PENDING_KEY).await?.unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the queue cannot be serialized or stored.
    pub async fn save_pending(&self, pending: &PendingQueue) -> Result<(), StorageError> {
        self.write_json(PENDING_KEY, pending).await
    }

    /// Snapshot saved by demo mode. `None` when demo mode never saved anything.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails or the stored JSON is invalid.
    pub async fn load_demo(&self) -> Result<Option<Vec<ProgressRecord>>, StorageError> {
        self.read_json(DEMO_KEY).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be serialized or stored.
    pub async fn save_demo(&self, records: &[ProgressRecord]) -> Result<(), StorageError> {
        self.write_json(DEMO_KEY, records).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    pub async fn clear_demo(&self) -> Result<(), StorageError> {
        self.kv.remove(DEMO_KEY).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails or the stored value is invalid.
    pub async fn load_last_sync(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.read_json(LAST_SYNC_KEY).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the timestamp cannot be stored.
    pub async fn save_last_sync(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.write_json(LAST_SYNC_KEY, &at).await
    }

    /// Remove records, pending queue and last-sync time. The demo snapshot
    /// is left alone.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any key cannot be removed.
    pub async fn clear_sync_data(&self) -> Result<(), StorageError> {
        self.kv.remove(PROGRESS_KEY).await?;
        self.kv.remove(PENDING_KEY).await?;
        self.kv.remove(LAST_SYNC_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use study_core::model::{PendingUpdate, TaskId, UserId};
    use study_core::time::fixed_now;

    fn local() -> (InMemoryRepository, LocalStorage) {
        let repo = InMemoryRepository::new();
        let local = LocalStorage::new(Arc::new(repo.clone()));
        (repo, local)
    }

    #[tokio::test]
    async fn empty_storage_reads_as_empty() {
        let (_, local) = local();
        assert!(local.load_records().await.unwrap().is_empty());
        assert!(local.load_pending().await.unwrap().is_empty());
        assert_eq!(local.load_demo().await.unwrap(), None);
        assert_eq!(local.load_last_sync().await.unwrap(), None);
    }

    #[tokio::test]
    async fn records_and_pending_persist() {
        let (_, local) = local();
        let record = ProgressRecord::completed(UserId::demo(), TaskId::new("a"), fixed_now());
        local.save_records(&[record.clone()]).await.unwrap();

        let mut pending = PendingQueue::new();
        pending.push(PendingUpdate::new(TaskId::new("a"), true, fixed_now()));
        local.save_pending(&pending).await.unwrap();

        assert_eq!(local.load_records().await.unwrap(), vec![record]);
        assert_eq!(local.load_pending().await.unwrap(), pending);
    }

    #[tokio::test]
    async fn corrupt_json_is_a_serialization_error() {
        let (repo, local) = local();
        repo.set(PROGRESS_KEY, "not json").await.unwrap();
        let err = local.load_records().await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn clearing_sync_data_keeps_demo_snapshot() {
        let (repo, local) = local();
        let record = ProgressRecord::completed(UserId::demo(), TaskId::new("a"), fixed_now());
        local.save_records(&[record.clone()]).await.unwrap();
        local.save_demo(&[record]).await.unwrap();
        local.save_last_sync(fixed_now()).await.unwrap();

        local.clear_sync_data().await.unwrap();

        assert_eq!(repo.len(), 1);
        assert_eq!(local.load_demo().await.unwrap().map(|r| r.len()), Some(1));
        assert_eq!(local.load_last_sync().await.unwrap(), None);
    }
}
