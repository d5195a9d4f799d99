use std::sync::Arc;

use services::{AppServices, SweepOutcome, SyncConfig};
use storage::remote::{InMemoryRemoteStore, RemoteProgressStore};
use study_core::model::{Category, Curriculum, DayPlan, ProgressRecord, TaskId, TaskPlan, UserId, WeekPlan};
use study_core::time::fixed_clock;

fn curriculum() -> Curriculum {
    let day = |day: u32, ids: &[&str], category: Category| DayPlan {
        day,
        title: format!("Day {day}"),
        tasks: ids
            .iter()
            .map(|id| TaskPlan {
                id: (*id).to_owned(),
                title: (*id).to_owned(),
                category,
                points: 10,
            })
            .collect(),
    };
    Curriculum::new(vec![
        WeekPlan {
            week: 1,
            title: "Hiragana".into(),
            days: vec![
                day(1, &["w1-d1-a", "w1-d1-ka"], Category::Hiragana),
                day(2, &["w1-d2-vocab"], Category::Vocabulary),
            ],
        },
        WeekPlan {
            week: 2,
            title: "Katakana".into(),
            days: vec![day(1, &["w2-d1-a", "w2-d1-ka"], Category::Katakana)],
        },
    ])
    .expect("valid curriculum")
}

async fn services(remote: &InMemoryRemoteStore) -> AppServices {
    AppServices::in_memory(
        fixed_clock(),
        curriculum(),
        Arc::new(remote.clone()),
        SyncConfig::default(),
    )
    .await
}

fn task_ids(records: &[ProgressRecord]) -> Vec<TaskId> {
    let mut ids: Vec<TaskId> = records.iter().map(|r| r.task_id.clone()).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn offline_toggles_converge_once_online() {
    let remote = InMemoryRemoteStore::new();
    let app = services(&remote).await;
    let user = UserId::new("learner-1");
    app.auth().sign_in(user.clone());
    let store = app.store();

    for id in ["w1-d1-a", "w1-d1-ka", "w1-d2-vocab", "w2-d1-a"] {
        store.toggle_task(&TaskId::new(id), true).await;
    }
    store.toggle_task(&TaskId::new("w1-d1-ka"), false).await;
    store.toggle_task(&TaskId::new("w2-d1-a"), false).await;
    store.toggle_task(&TaskId::new("w2-d1-a"), true).await;

    let status = app.sync().status();
    assert!(!status.is_online);
    assert_eq!(status.pending_changes, 4);
    assert_eq!(remote.calls(), 0);

    app.connectivity().set_online(true);
    let outcome = app.sync().sync_pending_changes().await;

    assert!(matches!(outcome, SweepOutcome::Completed { .. }));
    let status = app.sync().status();
    assert_eq!(status.pending_changes, 0);
    assert!(status.is_settled());
    assert_eq!(task_ids(&remote.rows_for(&user)), task_ids(&store.records()));
    assert_eq!(remote.rows_for(&user).len(), 3);
}

#[tokio::test]
async fn background_loop_sweeps_when_connectivity_returns() {
    let remote = InMemoryRemoteStore::new();
    let app = services(&remote).await;
    let user = UserId::new("learner-2");
    app.auth().sign_in(user.clone());
    app.start();

    app.store().toggle_task(&TaskId::new("w1-d1-a"), true).await;
    assert_eq!(app.sync().status().pending_changes, 1);

    app.connectivity().set_online(true);
    for _ in 0..100 {
        if app.sync().status().pending_changes == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    assert_eq!(app.sync().status().pending_changes, 0);
    assert_eq!(remote.rows_for(&user).len(), 1);
    app.stop().await;
}

#[tokio::test]
async fn demo_session_is_isolated_from_remote() {
    let remote = InMemoryRemoteStore::new();
    let app = services(&remote).await;
    app.connectivity().set_online(true);
    let store = app.store();

    store.load_demo_data().await;
    store.toggle_task(&TaskId::new("w1-d1-a"), true).await;
    store.toggle_task(&TaskId::new("w2-d1-ka"), true).await;
    assert_eq!(store.progress().completed_tasks, 2);

    // a sweep without a session is a no-op
    let outcome = app.sync().sync_pending_changes().await;
    assert!(matches!(outcome, SweepOutcome::Skipped(_)));
    assert_eq!(remote.calls(), 0);

    let cleared = store.clear_demo_data().await;
    assert_eq!(cleared.completed_tasks, 0);
    assert_eq!(cleared.completion_percentage, 0);
    assert!(cleared.categories.values().all(|c| c.completed == 0));
    assert_eq!(remote.calls(), 0);
}

#[tokio::test]
async fn partial_failure_keeps_only_undelivered_entries() {
    let remote = InMemoryRemoteStore::new();
    let app = services(&remote).await;
    let user = UserId::new("learner-3");
    app.auth().sign_in(user.clone());
    let store = app.store();

    store.toggle_task(&TaskId::new("w1-d1-a"), true).await;
    app.connectivity().set_online(true);
    remote.set_failing(true);
    app.sync().sync_pending_changes().await;
    assert_eq!(app.sync().status().pending_changes, 1);
    assert_eq!(app.sync().status().last_sync, None);

    remote.set_failing(false);
    let outcome = app.sync().force_sync().await;
    assert_eq!(outcome, SweepOutcome::Completed { delivered: 1 });
    assert!(app.sync().status().last_sync.is_some());
}

#[tokio::test]
async fn hydration_merges_remote_rows_with_offline_changes() {
    let remote = InMemoryRemoteStore::new();
    let user = UserId::new("learner-4");
    remote
        .upsert_progress(&ProgressRecord::completed(
            user.clone(),
            TaskId::new("w2-d1-a"),
            fixed_clock().now(),
        ))
        .await
        .unwrap();

    let app = services(&remote).await;
    app.auth().sign_in(user.clone());
    let store = app.store();
    store.toggle_task(&TaskId::new("w1-d1-a"), true).await;

    app.connectivity().set_online(true);
    let progress = store.hydrate().await;

    assert_eq!(progress.completed_tasks, 2);
    assert_eq!(progress.weeks[&1].completed, 1);
    assert_eq!(progress.weeks[&2].completed, 1);
    assert_eq!(app.sync().status().pending_changes, 1);
}
