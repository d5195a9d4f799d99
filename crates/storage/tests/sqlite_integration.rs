use std::sync::Arc;

use storage::repository::{KeyValueStore, Storage};
use storage::sqlite::SqliteRepository;
use storage::LocalStorage;
use study_core::model::{PendingQueue, PendingUpdate, ProgressRecord, TaskId, UserId};
use study_core::time::fixed_now;

#[tokio::test]
async fn sqlite_kv_round_trip_and_overwrite() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    // running migrations twice is harmless
    repo.migrate().await.expect("migrate again");

    assert_eq!(repo.get("missing").await.unwrap(), None);

    repo.set("k", "first").await.unwrap();
    repo.set("k", "second").await.unwrap();
    assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("second"));

    repo.remove("k").await.unwrap();
    repo.remove("k").await.unwrap();
    assert_eq!(repo.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn progress_survives_a_reconnect() {
    let url = "sqlite:file:memdb_progress?mode=memory&cache=shared";
    let storage = Storage::sqlite(url).await.expect("open");
    let local = storage.local();

    let record = ProgressRecord::completed(UserId::new("u1"), TaskId::new("w1-d1-hiragana"), fixed_now());
    local.save_records(&[record.clone()]).await.unwrap();
    let mut pending = PendingQueue::new();
    pending.push(PendingUpdate::new(record.task_id.clone(), true, fixed_now()));
    local.save_pending(&pending).await.unwrap();
    local.save_last_sync(fixed_now()).await.unwrap();

    // a second pool on the same shared-cache database sees the same rows
    let reopened = SqliteRepository::connect(url).await.expect("reconnect");
    let kv: Arc<dyn KeyValueStore> = Arc::new(reopened);
    let local = LocalStorage::new(kv);

    assert_eq!(local.load_records().await.unwrap(), vec![record]);
    assert_eq!(local.load_pending().await.unwrap(), pending);
    assert_eq!(local.load_last_sync().await.unwrap(), Some(fixed_now()));
    drop(storage);
}
