use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{RecordId, TaskId, UserId};

//
// ─── PROGRESS RECORD ──────────────────────────────────────────────────────────
//

/// Evidence that one user completed one task.
///
/// Completion is binary: the record exists while the task is done and is
/// deleted when the task is toggled off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub task_id: TaskId,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// A freshly completed task with a client-generated id.
    #[must_use]
    pub fn completed(user_id: UserId, task_id: TaskId, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::generate(),
            user_id,
            task_id,
            completed_at: now,
            note: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the note; blank notes are stored as `None`.
    pub fn set_note(&mut self, note: Option<String>, now: DateTime<Utc>) {
        self.note = note
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty());
        self.updated_at = now;
    }

    /// Re-home the record under another owner, keeping everything else.
    #[must_use]
    pub fn owned_by(mut self, user_id: UserId) -> Self {
        self.user_id = user_id;
        self
    }

    /// UTC calendar day of completion.
    #[must_use]
    pub fn completion_day(&self) -> NaiveDate {
        self.completed_at.date_naive()
    }
}

/// Insert `record`, replacing any existing record for the same task.
///
/// Returns the record that was replaced.
pub fn upsert_by_task(
    records: &mut Vec<ProgressRecord>,
    record: ProgressRecord,
) -> Option<ProgressRecord> {
    match records.iter_mut().find(|r| r.task_id == record.task_id) {
        Some(slot) => Some(std::mem::replace(slot, record)),
        None => {
            records.push(record);
            None
        }
    }
}

/// Remove every record for `task_id`, returning the first one removed.
pub fn remove_by_task(records: &mut Vec<ProgressRecord>, task_id: &TaskId) -> Option<ProgressRecord> {
    let position = records.iter().position(|r| &r.task_id == task_id)?;
    let removed = records.remove(position);
    records.retain(|r| &r.task_id != task_id);
    Some(removed)
}

//
// ─── PENDING UPDATES ──────────────────────────────────────────────────────────
//

/// A local mutation not yet confirmed by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub id: RecordId,
    pub task_id: TaskId,
    pub completed: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
}

impl PendingUpdate {
    #[must_use]
    pub fn new(task_id: TaskId, completed: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::generate(),
            task_id,
            completed,
            timestamp,
            attempts: 0,
        }
    }
}

/// Unacknowledged mutations, at most one per task.
///
/// A newer mutation of a task supersedes the older entry, so the queue always
/// holds the latest intent. Entries are acknowledged individually by id,
/// which lets a sweep that fails halfway keep what it already delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingQueue {
    entries: Vec<PendingUpdate>,
}

impl PendingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `update`, superseding any entry for the same task.
    pub fn push(&mut self, update: PendingUpdate) {
        self.entries.retain(|e| e.task_id != update.task_id);
        self.entries.push(update);
    }

    /// The current entry for a task, if any.
    #[must_use]
    pub fn current(&self, task_id: &TaskId) -> Option<&PendingUpdate> {
        self.entries.iter().find(|e| &e.task_id == task_id)
    }

    /// Drop the entry with this id. Returns false when it was already
    /// superseded or acknowledged.
    pub fn acknowledge(&mut self, id: RecordId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Count one more failed delivery for the entry with this id.
    pub fn record_failure(&mut self, id: RecordId) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.attempts = entry.attempts.saturating_add(1);
        }
    }

    /// Entries that failed at least `max_attempts` times.
    #[must_use]
    pub fn needs_attention(&self, max_attempts: u32) -> usize {
        self.entries
            .iter()
            .filter(|e| e.attempts >= max_attempts)
            .count()
    }

    #[must_use]
    pub fn entries(&self) -> &[PendingUpdate] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
