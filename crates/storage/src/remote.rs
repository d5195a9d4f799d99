use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use study_core::model::{ProgressRecord, TaskId, UserId};
use thiserror::Error;

/// Errors surfaced by the hosted progress database.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("remote rejected request: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid remote payload: {0}")]
    Payload(String),
}

/// Hosted progress table keyed by `(user_id, task_id)`.
#[async_trait]
pub trait RemoteProgressStore: Send + Sync {
    /// Insert the record, or update the existing row for the same
    /// `(user_id, task_id)`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` when the request fails or is rejected.
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), RemoteError>;

    /// Delete the row for `(user_id, task_id)`. Deleting a missing row succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` when the request fails or is rejected.
    async fn delete_progress(&self, user_id: &UserId, task_id: &TaskId) -> Result<(), RemoteError>;

    /// Every row owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` when the request fails or the payload is invalid.
    async fn list_progress(&self, user_id: &UserId) -> Result<Vec<ProgressRecord>, RemoteError>;
}

/// In-process stand-in for the hosted table.
///
/// `set_failing(true)` makes every call fail with a network error, which is
/// how tests simulate an unreachable backend.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    rows: Arc<Mutex<HashMap<(UserId, TaskId), ProgressRecord>>>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total number of calls received, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Rows owned by `user_id`, sorted by task id.
    #[must_use]
    pub fn rows_for(&self, user_id: &UserId) -> Vec<ProgressRecord> {
        let mut rows: Vec<ProgressRecord> = self
            .rows
            .lock()
            .map(|guard| {
                guard
                    .values()
                    .filter(|r| &r.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        rows
    }

    fn enter(&self) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("remote store unreachable".into()));
        }
        Ok(())
    }

    fn rows(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(UserId, TaskId), ProgressRecord>>, RemoteError>
    {
        self.rows
            .lock()
            .map_err(|e| RemoteError::Network(e.to_string()))
    }
}

#[async_trait]
impl RemoteProgressStore for InMemoryRemoteStore {
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), RemoteError> {
        self.enter()?;
        let mut rows = self.rows()?;
        let key = (record.user_id.clone(), record.task_id.clone());
        match rows.get_mut(&key) {
            // keep the original row id and created_at; only update mutable fields
            Some(existing) => {
                existing.completed_at = record.completed_at;
                existing.note.clone_from(&record.note);
                existing.updated_at = record.updated_at;
            }
            None => {
                rows.insert(key, record.clone());
            }
        }
        Ok(())
    }

    async fn delete_progress(&self, user_id: &UserId, task_id: &TaskId) -> Result<(), RemoteError> {
        self.enter()?;
        self.rows()?.remove(&(user_id.clone(), task_id.clone()));
        Ok(())
    }

    async fn list_progress(&self, user_id: &UserId) -> Result<Vec<ProgressRecord>, RemoteError> {
        self.enter()?;
        Ok(self.rows_for(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use study_core::time::fixed_now;

    #[tokio::test]
    async fn upsert_is_unique_per_user_and_task() {
        let remote = InMemoryRemoteStore::new();
        let user = UserId::new("u1");
        let first = ProgressRecord::completed(user.clone(), TaskId::new("a"), fixed_now());
        let later = ProgressRecord::completed(
            user.clone(),
            TaskId::new("a"),
            fixed_now() + Duration::hours(2),
        );

        remote.upsert_progress(&first).await.unwrap();
        remote.upsert_progress(&later).await.unwrap();

        let rows = remote.list_progress(&user).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].completed_at, later.completed_at);
        assert_eq!(rows[0].id, first.id);
    }

    #[tokio::test]
    async fn rows_are_scoped_by_user() {
        let remote = InMemoryRemoteStore::new();
        let record = ProgressRecord::completed(UserId::new("u1"), TaskId::new("a"), fixed_now());
        remote.upsert_progress(&record).await.unwrap();

        assert!(remote.list_progress(&UserId::new("u2")).await.unwrap().is_empty());
        remote
            .delete_progress(&UserId::new("u2"), &TaskId::new("a"))
            .await
            .unwrap();
        assert_eq!(remote.rows_for(&UserId::new("u1")).len(), 1);
    }

    #[tokio::test]
    async fn failing_store_counts_calls_and_errors() {
        let remote = InMemoryRemoteStore::new();
        remote.set_failing(true);
        let err = remote.list_progress(&UserId::new("u1")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)));
        assert_eq!(remote.calls(), 1);
    }
}
