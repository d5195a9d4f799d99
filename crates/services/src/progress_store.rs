use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use storage::LocalStorage;
use study_core::UserProgress;
use study_core::model::{Curriculum, ProgressRecord, TaskId, UserId, remove_by_task};

use crate::Clock;
use crate::auth::AuthContext;
use crate::sync_service::SyncService;

struct StoreState {
    records: Vec<ProgressRecord>,
    demo_mode: bool,
    progress: UserProgress,
    longest_streak: u32,
}

/// What a toggle changed.
enum Change {
    Saved(ProgressRecord),
    Removed(TaskId),
}

/// Client-side view of completed tasks and their aggregates.
///
/// Mutations update memory first, then hand off to either the demo snapshot
/// or the [`SyncService`]. Nothing here waits on the network.
pub struct ProgressStore {
    clock: Clock,
    curriculum: Arc<Curriculum>,
    auth: Arc<dyn AuthContext>,
    local: LocalStorage,
    sync: SyncService,
    state: Mutex<StoreState>,
    /// Serializes demo snapshot writes; the snapshot is taken under it.
    demo_gate: tokio::sync::Mutex<()>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(
        clock: Clock,
        curriculum: Arc<Curriculum>,
        auth: Arc<dyn AuthContext>,
        local: LocalStorage,
        sync: SyncService,
    ) -> Self {
        let progress = UserProgress::empty(&curriculum);
        Self {
            clock,
            curriculum,
            auth,
            local,
            sync,
            state: Mutex::new(StoreState {
                records: Vec::new(),
                demo_mode: false,
                progress,
                longest_streak: 0,
            }),
            demo_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recompute(&self, state: &mut StoreState) {
        let progress = UserProgress::compute(
            &state.records,
            &self.curriculum,
            self.clock.today(),
            state.longest_streak,
        );
        state.longest_streak = progress.longest_streak;
        state.progress = progress;
    }

    fn current_user(&self, demo_mode: bool) -> UserId {
        if demo_mode {
            return UserId::demo();
        }
        self.auth.current_user_id().unwrap_or_else(UserId::demo)
    }

    // ─── Reads ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn progress(&self) -> UserProgress {
        self.state().progress.clone()
    }

    #[must_use]
    pub fn records(&self) -> Vec<ProgressRecord> {
        self.state().records.clone()
    }

    #[must_use]
    pub fn is_completed(&self, task_id: &TaskId) -> bool {
        self.state().records.iter().any(|r| &r.task_id == task_id)
    }

    #[must_use]
    pub fn is_demo(&self) -> bool {
        self.state().demo_mode
    }

    #[must_use]
    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    #[must_use]
    pub fn sync(&self) -> &SyncService {
        &self.sync
    }

    // ─── Mutations ─────────────────────────────────────────────────────────

    /// Mark a task complete or not complete and return the new aggregates.
    ///
    /// Completing an already completed task and un-completing a task that
    /// was never completed leave the record set untouched and queue nothing.
    /// Unknown task ids are ignored.
    pub async fn toggle_task(&self, task_id: &TaskId, completed: bool) -> UserProgress {
        if !self.curriculum.contains(task_id) {
            tracing::warn!(task = %task_id, "toggle for unknown task ignored");
            return self.progress();
        }

        let (change, demo_mode, progress) = {
            let mut state = self.state();
            let present = state.records.iter().any(|r| &r.task_id == task_id);
            let change = match (completed, present) {
                (true, false) => {
                    let user = self.current_user(state.demo_mode);
                    let record = ProgressRecord::completed(user, task_id.clone(), self.clock.now());
                    state.records.push(record.clone());
                    Some(Change::Saved(record))
                }
                (false, true) => {
                    remove_by_task(&mut state.records, task_id);
                    Some(Change::Removed(task_id.clone()))
                }
                _ => None,
            };
            if change.is_some() {
                self.recompute(&mut state);
            }
            (change, state.demo_mode, state.progress.clone())
        };

        if let Some(change) = change {
            self.hand_off(change, demo_mode).await;
        }
        progress
    }

    /// Replace the note on a completed task. Returns false when the task has
    /// no record.
    pub async fn set_note(&self, task_id: &TaskId, note: Option<String>) -> bool {
        let (record, demo_mode) = {
            let mut state = self.state();
            let demo_mode = state.demo_mode;
            let now = self.clock.now();
            let Some(record) = state.records.iter_mut().find(|r| &r.task_id == task_id) else {
                return false;
            };
            record.set_note(note, now);
            (record.clone(), demo_mode)
        };
        self.hand_off(Change::Saved(record), demo_mode).await;
        true
    }

    async fn hand_off(&self, change: Change, demo_mode: bool) {
        if demo_mode {
            let _gate = self.demo_gate.lock().await;
            let snapshot = self.records();
            if let Err(err) = self.local.save_demo(&snapshot).await {
                tracing::warn!(error = %err, "failed to save demo progress");
            }
            return;
        }
        match change {
            Change::Saved(record) => self.sync.save_progress(record).await,
            Change::Removed(task_id) => self.sync.remove_progress(&task_id).await,
        }
    }

    /// Enter demo mode with the saved demo snapshot, or an empty state.
    pub async fn load_demo_data(&self) -> UserProgress {
        let records = match self.local.load_demo().await {
            Ok(records) => records.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(error = %err, "demo snapshot unreadable; starting empty");
                Vec::new()
            }
        };
        let mut state = self.state();
        state.demo_mode = true;
        state.records = records;
        state.longest_streak = 0;
        self.recompute(&mut state);
        tracing::info!(records = state.records.len(), "demo mode on");
        state.progress.clone()
    }

    /// Wipe all local progress, leave demo mode, and reset aggregates.
    pub async fn clear_demo_data(&self) -> UserProgress {
        if let Err(err) = self.local.clear_demo().await {
            tracing::warn!(error = %err, "failed to clear demo snapshot");
        }
        self.sync.clear_local_data().await;

        let mut state = self.state();
        state.demo_mode = false;
        state.records.clear();
        state.longest_streak = 0;
        state.progress = UserProgress::empty(&self.curriculum);
        state.progress.clone()
    }

    /// Replace the in-memory record set, as after a remote load.
    pub fn set_progress(&self, records: Vec<ProgressRecord>) -> UserProgress {
        let mut state = self.state();
        state.records = records;
        self.recompute(&mut state);
        state.progress.clone()
    }

    /// Load records through the sync service. Does nothing in demo mode.
    pub async fn hydrate(&self) -> UserProgress {
        if self.is_demo() {
            return self.progress();
        }
        let records = self.sync.load_progress().await;
        self.set_progress(records)
    }
}
