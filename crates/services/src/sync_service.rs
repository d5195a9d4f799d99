use std::collections::{BTreeSet, HashMap};
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use storage::remote::{RemoteError, RemoteProgressStore};
use storage::LocalStorage;
use study_core::model::{
    PendingQueue, PendingUpdate, ProgressRecord, SyncStatus, TaskId, UserId, remove_by_task,
    upsert_by_task,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::Clock;
use crate::auth::AuthContext;
use crate::connectivity::Connectivity;

const DEFAULT_INTERVAL_SECS: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Period of the retry sweep while changes are pending.
    pub interval: Duration,
    /// Failed deliveries after which an entry is flagged as needing attention.
    pub max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl SyncConfig {
    /// Read `TRACKER_SYNC_INTERVAL_SECS` and `TRACKER_SYNC_MAX_ATTEMPTS`,
    /// falling back to defaults for missing or invalid values.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let interval = env::var("TRACKER_SYNC_INTERVAL_SECS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(defaults.interval, Duration::from_secs);
        let max_attempts = env::var("TRACKER_SYNC_MAX_ATTEMPTS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_attempts);
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Why a sweep did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    NoSession,
    AlreadySyncing,
}

/// Result of one sync sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Every task in the sweep was delivered. `last_sync` only moves when
    /// nothing was queued while the sweep ran.
    Completed { delivered: usize },
    /// Some deliveries failed; delivered entries stay acknowledged.
    Partial { delivered: usize, failed: usize },
    Skipped(SkipReason),
}

/// Handle returned by [`SyncService::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&SyncStatus) + Send + Sync>;

#[derive(Default)]
struct SyncState {
    records: Vec<ProgressRecord>,
    pending: PendingQueue,
    last_sync: Option<DateTime<Utc>>,
    is_syncing: bool,
}

struct Worker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct SyncServiceInner {
    clock: Clock,
    config: SyncConfig,
    local: LocalStorage,
    remote: Arc<dyn RemoteProgressStore>,
    auth: Arc<dyn AuthContext>,
    connectivity: Connectivity,
    state: Mutex<SyncState>,
    // Serializes remote calls so a late push cannot overtake a newer one.
    remote_gate: tokio::sync::Mutex<()>,
    // Serializes local writes so the last write carries the newest snapshot.
    persist_gate: tokio::sync::Mutex<()>,
    listeners: Mutex<HashMap<SubscriptionId, Listener>>,
    next_listener: AtomicU64,
    worker: Mutex<Option<Worker>>,
}

/// Mirrors local progress mutations to the remote store.
///
/// Every mutation is written to local storage first and recorded in the
/// pending queue; remote delivery happens in the background, on a periodic
/// sweep, and when connectivity returns. Cloning shares the same service.
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<SyncServiceInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncService {
    /// Build the service and restore records, pending queue and last-sync
    /// time from local storage. No background work starts until
    /// [`SyncService::start`].
    pub async fn open(
        clock: Clock,
        config: SyncConfig,
        local: LocalStorage,
        remote: Arc<dyn RemoteProgressStore>,
        auth: Arc<dyn AuthContext>,
        connectivity: Connectivity,
    ) -> Self {
        let records = local.load_records().await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not restore local progress; starting empty");
            Vec::new()
        });
        let pending = local.load_pending().await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not restore pending updates; starting empty");
            PendingQueue::new()
        });
        let last_sync = local.load_last_sync().await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not restore last sync time");
            None
        });

        Self {
            inner: Arc::new(SyncServiceInner {
                clock,
                config,
                local,
                remote,
                auth,
                connectivity,
                state: Mutex::new(SyncState {
                    records,
                    pending,
                    last_sync,
                    is_syncing: false,
                }),
                remote_gate: tokio::sync::Mutex::new(()),
                persist_gate: tokio::sync::Mutex::new(()),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(1),
                worker: Mutex::new(None),
            }),
        }
    }

    // ─── Status & observers ────────────────────────────────────────────────

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        let state = lock(&self.inner.state);
        SyncStatus {
            is_online: self.inner.connectivity.is_online(),
            last_sync: state.last_sync,
            pending_changes: state.pending.len(),
            is_syncing: state.is_syncing,
            needs_attention: state.pending.needs_attention(self.inner.config.max_attempts),
        }
    }

    /// Register a listener called with every status change.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.listeners).insert(id, Arc::new(listener));
        id
    }

    /// Returns false when the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.inner.listeners).remove(&id).is_some()
    }

    fn notify(&self) {
        let status = self.status();
        let listeners: Vec<Listener> = lock(&self.inner.listeners).values().cloned().collect();
        for listener in listeners {
            listener(&status);
        }
    }

    /// Records currently mirrored locally.
    #[must_use]
    pub fn local_records(&self) -> Vec<ProgressRecord> {
        lock(&self.inner.state).records.clone()
    }

    // ─── Mutations ─────────────────────────────────────────────────────────

    /// Store `record` locally (replacing any record for the same task) and
    /// queue it for delivery. Remote delivery runs in the background.
    pub async fn save_progress(&self, record: ProgressRecord) {
        let task_id = record.task_id.clone();
        {
            let mut state = lock(&self.inner.state);
            upsert_by_task(&mut state.records, record);
            state
                .pending
                .push(PendingUpdate::new(task_id.clone(), true, self.inner.clock.now()));
        }
        self.persist().await;
        self.notify();
        self.push_in_background(task_id);
    }

    /// Remove the record for `task_id` locally and queue the deletion.
    pub async fn remove_progress(&self, task_id: &TaskId) {
        {
            let mut state = lock(&self.inner.state);
            remove_by_task(&mut state.records, task_id);
            state
                .pending
                .push(PendingUpdate::new(task_id.clone(), false, self.inner.clock.now()));
        }
        self.persist().await;
        self.notify();
        self.push_in_background(task_id.clone());
    }

    /// Wipe local records, pending queue and last-sync time.
    pub async fn clear_local_data(&self) {
        {
            let mut state = lock(&self.inner.state);
            state.records.clear();
            state.pending.clear();
            state.last_sync = None;
        }
        {
            let _guard = self.inner.persist_gate.lock().await;
            if let Err(err) = self.inner.local.clear_sync_data().await {
                tracing::warn!(error = %err, "failed to clear local sync data");
            }
        }
        self.notify();
    }

    async fn persist(&self) {
        let _guard = self.inner.persist_gate.lock().await;
        let (records, pending) = {
            let state = lock(&self.inner.state);
            (state.records.clone(), state.pending.clone())
        };
        if let Err(err) = self.inner.local.save_records(&records).await {
            tracing::warn!(error = %err, "failed to persist progress records");
        }
        if let Err(err) = self.inner.local.save_pending(&pending).await {
            tracing::warn!(error = %err, "failed to persist pending updates");
        }
    }

    // ─── Remote delivery ───────────────────────────────────────────────────

    fn push_in_background(&self, task_id: TaskId) {
        if !self.inner.connectivity.is_online() {
            return;
        }
        let Some(user) = self.inner.auth.current_user_id() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(task = %task_id, "no runtime; leaving change for the next sweep");
            return;
        };

        let this = self.clone();
        runtime.spawn(async move {
            if this.push_task(&user, &task_id).await.is_ok() {
                this.persist().await;
            }
            this.notify();
        });
    }

    /// Make the remote row for `task_id` match local state.
    ///
    /// Reads the current local state at delivery time rather than the state
    /// when the push was scheduled, so replays are idempotent.
    async fn push_task(&self, user: &UserId, task_id: &TaskId) -> Result<(), RemoteError> {
        let _gate = self.inner.remote_gate.lock().await;

        let (entry, record) = {
            let state = lock(&self.inner.state);
            (
                state.pending.current(task_id).map(|e| e.id),
                state.records.iter().find(|r| &r.task_id == task_id).cloned(),
            )
        };

        let result = match record {
            Some(record) => {
                let record = record.owned_by(user.clone());
                self.inner.remote.upsert_progress(&record).await
            }
            None => self.inner.remote.delete_progress(user, task_id).await,
        };

        let mut state = lock(&self.inner.state);
        match (&result, entry) {
            (Ok(()), Some(id)) => {
                state.pending.acknowledge(id);
            }
            (Err(err), Some(id)) => {
                state.pending.record_failure(id);
                tracing::warn!(task = %task_id, error = %err, "remote delivery failed; will retry");
            }
            (Err(err), None) => {
                tracing::warn!(task = %task_id, error = %err, "remote refresh failed");
            }
            (Ok(()), None) => {}
        }
        result
    }

    /// Deliver every pending change and upsert every locally stored record.
    ///
    /// Skipped when offline, without a session, or while another sweep runs.
    pub async fn sync_pending_changes(&self) -> SweepOutcome {
        if !self.inner.connectivity.is_online() {
            return SweepOutcome::Skipped(SkipReason::Offline);
        }
        let Some(user) = self.inner.auth.current_user_id() else {
            tracing::debug!("no session; sweep skipped");
            return SweepOutcome::Skipped(SkipReason::NoSession);
        };

        {
            let mut state = lock(&self.inner.state);
            if state.is_syncing {
                return SweepOutcome::Skipped(SkipReason::AlreadySyncing);
            }
            state.is_syncing = true;
        }
        self.notify();

        let tasks: BTreeSet<TaskId> = {
            let state = lock(&self.inner.state);
            state
                .pending
                .entries()
                .iter()
                .map(|e| e.task_id.clone())
                .chain(state.records.iter().map(|r| r.task_id.clone()))
                .collect()
        };

        let mut delivered = 0_usize;
        let mut failed = 0_usize;
        for task_id in &tasks {
            match self.push_task(&user, task_id).await {
                Ok(()) => delivered += 1,
                Err(_) => failed += 1,
            }
        }

        let now = self.inner.clock.now();
        let drained = {
            let mut state = lock(&self.inner.state);
            state.is_syncing = false;
            let drained = failed == 0 && state.pending.is_empty();
            if drained {
                state.last_sync = Some(now);
            }
            drained
        };
        self.persist().await;
        if drained {
            if let Err(err) = self.inner.local.save_last_sync(now).await {
                tracing::warn!(error = %err, "failed to persist last sync time");
            }
        }
        self.notify();

        if failed == 0 {
            tracing::info!(delivered, "sync sweep completed");
            SweepOutcome::Completed { delivered }
        } else {
            tracing::warn!(delivered, failed, "sync sweep incomplete");
            SweepOutcome::Partial { delivered, failed }
        }
    }

    /// Manual sync trigger.
    pub async fn force_sync(&self) -> SweepOutcome {
        if !self.inner.connectivity.is_online() {
            tracing::info!("manual sync requested while offline");
            return SweepOutcome::Skipped(SkipReason::Offline);
        }
        self.sync_pending_changes().await
    }

    /// Load the authoritative record set.
    ///
    /// With a session and connectivity, remote rows replace local storage and
    /// any unacknowledged local changes are re-applied on top. Otherwise, or
    /// when the remote read fails, local records are returned.
    pub async fn load_progress(&self) -> Vec<ProgressRecord> {
        let Some(user) = self.inner.auth.current_user_id() else {
            return self.local_records();
        };
        if !self.inner.connectivity.is_online() {
            return self.local_records();
        }

        // Held through the merge so no push can acknowledge an entry between
        // the remote read and the local overwrite.
        let gate = self.inner.remote_gate.lock().await;
        let remote_rows = match self.inner.remote.list_progress(&user).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(error = %err, "remote load failed; using local progress");
                return self.local_records();
            }
        };

        let now = self.inner.clock.now();
        let merged = {
            let mut state = lock(&self.inner.state);
            let mut merged: Vec<ProgressRecord> = Vec::with_capacity(remote_rows.len());
            for row in remote_rows {
                upsert_by_task(&mut merged, row);
            }
            for entry in state.pending.entries() {
                match state.records.iter().find(|r| r.task_id == entry.task_id) {
                    Some(local) => {
                        upsert_by_task(&mut merged, local.clone().owned_by(user.clone()));
                    }
                    None => {
                        remove_by_task(&mut merged, &entry.task_id);
                    }
                }
            }
            state.records = merged.clone();
            state.last_sync = Some(now);
            merged
        };
        drop(gate);

        self.persist().await;
        if let Err(err) = self.inner.local.save_last_sync(now).await {
            tracing::warn!(error = %err, "failed to persist last sync time");
        }
        self.notify();
        merged
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────

    /// Spawn the background loop: sweep when connectivity returns, and on
    /// every tick while online with pending changes. Calling `start` on a
    /// running service does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut worker = lock(&self.inner.worker);
        if worker.is_some() {
            return;
        }

        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let mut online_rx = self.inner.connectivity.subscribe();
        let period = self.inner.config.interval;
        let this = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *online_rx.borrow_and_update();
                        this.notify();
                        if online {
                            this.sync_pending_changes().await;
                        }
                    }
                    _ = ticker.tick() => {
                        let pending = lock(&this.inner.state).pending.len();
                        if pending > 0 && this.inner.connectivity.is_online() {
                            this.sync_pending_changes().await;
                        }
                    }
                }
            }
        });

        *worker = Some(Worker { shutdown, handle });
        tracing::info!(interval_secs = period.as_secs(), "sync service started");
    }

    /// Stop the background loop and wait for it to finish.
    pub async fn stop(&self) {
        let worker = lock(&self.inner.worker).take();
        let Some(worker) = worker else {
            return;
        };
        let _ = worker.shutdown.send(());
        if let Err(err) = worker.handle.await {
            tracing::warn!(error = %err, "sync worker ended abnormally");
        }
        tracing::info!("sync service stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.inner.worker).is_some()
    }
}
