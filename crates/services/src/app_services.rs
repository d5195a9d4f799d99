use std::sync::Arc;

use storage::remote::RemoteProgressStore;
use storage::repository::Storage;
use study_core::model::Curriculum;

use crate::auth::{AuthContext, SessionAuth};
use crate::connectivity::Connectivity;
use crate::error::AppServicesError;
use crate::progress_store::ProgressStore;
use crate::sync_service::{SyncConfig, SyncService};
use crate::Clock;

/// Assembles the progress store, sync service and their collaborators.
#[derive(Clone)]
pub struct AppServices {
    store: Arc<ProgressStore>,
    sync: SyncService,
    auth: SessionAuth,
    connectivity: Connectivity,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        curriculum: Curriculum,
        remote: Arc<dyn RemoteProgressStore>,
        config: SyncConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::assemble(storage, clock, curriculum, remote, config).await)
    }

    /// Build services over in-memory storage.
    pub async fn in_memory(
        clock: Clock,
        curriculum: Curriculum,
        remote: Arc<dyn RemoteProgressStore>,
        config: SyncConfig,
    ) -> Self {
        Self::assemble(Storage::in_memory(), clock, curriculum, remote, config).await
    }

    async fn assemble(
        storage: Storage,
        clock: Clock,
        curriculum: Curriculum,
        remote: Arc<dyn RemoteProgressStore>,
        config: SyncConfig,
    ) -> Self {
        let auth = SessionAuth::anonymous();
        let connectivity = Connectivity::new(false);
        let auth_ctx: Arc<dyn AuthContext> = Arc::new(auth.clone());

        let sync = SyncService::open(
            clock,
            config,
            storage.local(),
            remote,
            Arc::clone(&auth_ctx),
            connectivity.clone(),
        )
        .await;
        let store = Arc::new(ProgressStore::new(
            clock,
            Arc::new(curriculum),
            auth_ctx,
            storage.local(),
            sync.clone(),
        ));

        Self {
            store,
            sync,
            auth,
            connectivity,
        }
    }

    #[must_use]
    pub fn store(&self) -> Arc<ProgressStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn sync(&self) -> SyncService {
        self.sync.clone()
    }

    /// Session handle; sign in or out through it.
    #[must_use]
    pub fn auth(&self) -> SessionAuth {
        self.auth.clone()
    }

    /// Connectivity handle the platform layer reports into.
    #[must_use]
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity.clone()
    }

    /// Start background sync. Requires a tokio runtime.
    pub fn start(&self) {
        self.sync.start();
    }

    pub async fn stop(&self) {
        self.sync.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::remote::InMemoryRemoteStore;
    use study_core::model::{Category, DayPlan, TaskId, TaskPlan, UserId, WeekPlan};
    use study_core::time::fixed_clock;

    fn curriculum() -> Curriculum {
        Curriculum::new(vec![WeekPlan {
            week: 1,
            title: String::new(),
            days: vec![DayPlan {
                day: 1,
                title: String::new(),
                tasks: vec![TaskPlan {
                    id: "w1-d1-hiragana".into(),
                    title: "あいうえお".into(),
                    category: Category::Hiragana,
                    points: 10,
                }],
            }],
        }])
        .unwrap()
    }

    #[tokio::test]
    async fn wiring_shares_session_and_connectivity() {
        let remote = InMemoryRemoteStore::new();
        let services =
            AppServices::in_memory(fixed_clock(), curriculum(), Arc::new(remote.clone()), SyncConfig::default())
                .await;
        services.auth().sign_in(UserId::new("u1"));

        let task = TaskId::new("w1-d1-hiragana");
        services.store().toggle_task(&task, true).await;
        assert_eq!(services.sync().status().pending_changes, 1);

        services.connectivity().set_online(true);
        services.sync().force_sync().await;
        assert_eq!(remote.rows_for(&UserId::new("u1")).len(), 1);
        assert!(services.sync().status().is_settled());
    }

    #[tokio::test]
    async fn start_and_stop_are_explicit() {
        let services = AppServices::in_memory(
            fixed_clock(),
            curriculum(),
            Arc::new(InMemoryRemoteStore::new()),
            SyncConfig::default(),
        )
        .await;
        assert!(!services.sync().is_running());
        services.start();
        assert!(services.sync().is_running());
        services.stop().await;
        assert!(!services.sync().is_running());
    }
}
