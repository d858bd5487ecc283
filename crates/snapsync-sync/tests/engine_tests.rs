//! Reconciliation engine behaviour through its handle

mod common;

use std::sync::Arc;
use std::time::Duration;

use snapsync_core::domain::{Email, FeedStatus, IdToken, ItemKey, UserInfo};
use snapsync_core::ports::{IFeedListener, IPageCache, IPicsBackend};
use snapsync_sync::capture::CaptureStore;
use snapsync_sync::engine::{EngineDeps, EngineHandle, ReconciliationEngine};
use snapsync_sync::queue::UploadQueue;
use snapsync_sync::scheduler::UploadScheduler;
use snapsync_sync::SyncError;
use tokio_util::sync::CancellationToken;

use common::{item, keys, MemoryPageCache, MockBackend};

fn spawn_engine(
    backend: &Arc<MockBackend>,
    cache: Option<&Arc<MemoryPageCache>>,
) -> EngineHandle {
    let deps = EngineDeps {
        backend: backend.clone(),
        page_cache: cache.map(|c| Arc::clone(c) as Arc<dyn IPageCache>),
        uploads: None,
    };
    let (handle, _task) = ReconciliationEngine::spawn(deps, None);
    handle
}

fn user(email: &str) -> UserInfo {
    UserInfo::new(
        Email::new(email).unwrap(),
        IdToken::new(format!("token-{email}")).unwrap(),
    )
}

#[tokio::test]
async fn test_confirmed_item_replaces_local_capture_in_background() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("c1");
    std::fs::write(&capture, b"jpeg").unwrap();
    let backend = Arc::new(MockBackend::default());
    let engine = spawn_engine(&backend, None);

    engine.capture_created(capture);
    engine.settled().await.unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(keys(&snapshot.items), vec!["c1"]);
    assert!(snapshot.items[0].is_local);

    engine.on_items_added(vec![item("k1", Some("c1"))]);
    engine.settled().await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(keys(&snapshot.items), vec!["k1"]);
    assert!(!snapshot.items[0].is_local);
    assert!(snapshot.diff.background);
}

#[tokio::test]
async fn test_cold_refresh_goes_loading_then_success() {
    let backend = Arc::new(MockBackend::default());
    backend.push_page(vec![item("a", None), item("b", None)]);
    backend.gate();
    let engine = spawn_engine(&backend, None);

    let load = tokio::spawn({
        let engine = engine.clone();
        async move { engine.load_page(50, 0).await }
    });
    backend.started.notified().await;
    assert_eq!(engine.snapshot().status, FeedStatus::Loading);

    backend.release.notify_one();
    let diff = load.await.unwrap().unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.status, FeedStatus::Success);
    assert_eq!(keys(&snapshot.items), vec!["a", "b"]);
    assert_eq!(diff.inserted, vec![0, 1]);
}

#[tokio::test]
async fn test_failed_cold_refresh_is_error() {
    let backend = Arc::new(MockBackend::default());
    backend.push_failure("connection refused");
    let engine = spawn_engine(&backend, None);

    let diff = engine.load_page(50, 0).await.unwrap();

    assert!(diff.is_unchanged());
    let snapshot = engine.snapshot();
    assert!(snapshot.items.is_empty());
    match snapshot.status {
        FeedStatus::Error(message) => assert!(message.contains("connection refused")),
        other => panic!("expected error status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_realtime_items_after_failed_cold_refresh_clear_error() {
    let backend = Arc::new(MockBackend::default());
    backend.push_failure("connection refused");
    let engine = spawn_engine(&backend, None);

    engine.load_page(50, 0).await.unwrap();
    assert!(matches!(engine.snapshot().status, FeedStatus::Error(_)));

    engine.on_items_added(vec![item("k1", None)]);
    engine.settled().await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(keys(&snapshot.items), vec!["k1"]);
    assert_eq!(snapshot.status, FeedStatus::Success);
}

#[tokio::test]
async fn test_failed_refresh_over_loaded_items_stays_success() {
    let backend = Arc::new(MockBackend::default());
    backend.push_page(vec![item("a", None)]);
    backend.push_failure("timeout");
    let engine = spawn_engine(&backend, None);

    engine.load_page(50, 0).await.unwrap();
    engine.load_page(50, 0).await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.status, FeedStatus::Success);
    assert_eq!(keys(&snapshot.items), vec!["a"]);
}

#[tokio::test]
async fn test_failed_refresh_with_cached_page_stays_success() {
    let backend = Arc::new(MockBackend::default());
    backend.push_failure("offline");
    let cache = Arc::new(MemoryPageCache::default());
    cache.insert(None, &backend.page_url(50, 0), vec![item("cached", None)]);
    let engine = spawn_engine(&backend, Some(&cache));

    engine.load_page(50, 0).await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.status, FeedStatus::Success);
    assert_eq!(keys(&snapshot.items), vec!["cached"]);
}

#[tokio::test]
async fn test_cached_then_identical_fresh_page_is_no_update() {
    let backend = Arc::new(MockBackend::default());
    backend.push_page(vec![item("b", None), item("a", None)]);
    let cache = Arc::new(MemoryPageCache::default());
    cache.insert(
        None,
        &backend.page_url(50, 0),
        vec![item("a", None), item("b", None)],
    );
    let engine = spawn_engine(&backend, Some(&cache));
    let mut snapshots = engine.subscribe();

    let diff = engine.load_page(50, 0).await.unwrap();

    assert!(diff.is_unchanged());
    assert!(snapshots.has_changed().unwrap());
    let snapshot = snapshots.borrow_and_update().clone();
    assert_eq!(keys(&snapshot.items), vec!["b", "a"]);
    assert_eq!(
        keys(&cache.get(None, &backend.page_url(50, 0)).unwrap()),
        vec!["b", "a"]
    );
}

#[tokio::test]
async fn test_fresh_refresh_is_written_to_cache_per_user() {
    let backend = Arc::new(MockBackend::default());
    backend.push_page(vec![item("mine", None)]);
    let cache = Arc::new(MemoryPageCache::default());
    let owner = user("owner@example.com");
    let deps = EngineDeps {
        backend: backend.clone(),
        page_cache: Some(cache.clone() as Arc<dyn IPageCache>),
        uploads: None,
    };
    let (engine, _task) = ReconciliationEngine::spawn(deps, Some(owner.clone()));

    engine.load_page(50, 0).await.unwrap();

    let url = backend.page_url(50, 0);
    assert!(cache.get(None, &url).is_none());
    assert_eq!(keys(&cache.get(Some(&owner.email), &url).unwrap()), vec!["mine"]);
    assert_eq!(
        backend.tokens.lock().unwrap().clone(),
        vec![Some("token-owner@example.com".to_string())]
    );
}

#[tokio::test]
async fn test_two_pages_concatenate_without_duplicates() {
    let backend = Arc::new(MockBackend::default());
    backend.push_page(vec![item("a", None), item("b", None)]);
    backend.push_page(vec![item("b", None), item("c", None)]);
    let engine = spawn_engine(&backend, None);

    engine.load_page(2, 0).await.unwrap();
    let diff = engine.load_page(2, 2).await.unwrap();

    assert_eq!(diff.appended, 1);
    assert_eq!(keys(&engine.snapshot().items), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_removed_keys_keep_order_and_report_old_indices() {
    let backend = Arc::new(MockBackend::default());
    backend.push_page(vec![
        item("a", None),
        item("b", None),
        item("c", None),
        item("d", None),
    ]);
    let engine = spawn_engine(&backend, None);
    engine.load_page(50, 0).await.unwrap();

    engine.on_items_removed(vec![ItemKey::new("d").unwrap(), ItemKey::new("b").unwrap()]);
    engine.settled().await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(keys(&snapshot.items), vec!["a", "c"]);
    assert_eq!(snapshot.diff.removed, vec![1, 3]);
}

#[tokio::test]
async fn test_delete_removes_remotely_then_locally() {
    let backend = Arc::new(MockBackend::default());
    backend.push_page(vec![item("a", None), item("b", None)]);
    let engine = spawn_engine(&backend, None);
    engine.load_page(50, 0).await.unwrap();

    let diff = engine.delete(&ItemKey::new("a").unwrap()).await.unwrap();

    assert_eq!(diff.removed, vec![0]);
    assert_eq!(backend.deletes.lock().unwrap().clone(), vec!["a"]);
    assert_eq!(keys(&engine.snapshot().items), vec!["b"]);

    // The realtime echo of the deletion changes nothing
    let revision = engine.snapshot().revision;
    engine.on_items_removed(vec![ItemKey::new("a").unwrap()]);
    engine.settled().await.unwrap();
    assert_eq!(engine.snapshot().revision, revision);
}

#[tokio::test]
async fn test_reset_user_clears_feed_and_drops_late_page() {
    let backend = Arc::new(MockBackend::default());
    backend.push_page(vec![item("anon-item", None)]);
    backend.gate();
    let engine = spawn_engine(&backend, None);

    let load = tokio::spawn({
        let engine = engine.clone();
        async move { engine.load_page(50, 0).await }
    });
    backend.started.notified().await;

    engine.on_items_added(vec![item("live", None)]);
    engine.reset_user(Some(user("next@example.com")));
    engine.settled().await.unwrap();
    assert!(engine.snapshot().items.is_empty());

    backend.release.notify_one();
    let diff = load.await.unwrap().unwrap();

    assert!(diff.is_unchanged());
    assert!(engine.snapshot().items.is_empty());
    assert_eq!(
        backend.tokens.lock().unwrap().last().cloned().flatten(),
        Some("token-next@example.com".to_string())
    );
}

#[tokio::test]
async fn test_capture_shows_placeholder_and_triggers_upload() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CaptureStore::new(dir.path()));
    let backend = Arc::new(MockBackend::default());
    let queue = Arc::new(UploadQueue::new(store.clone(), backend.clone()));
    let cancel = CancellationToken::new();
    let (scheduler, uploads) =
        UploadScheduler::new(queue, Duration::from_millis(10), cancel.clone());
    let scheduler_task = tokio::spawn(scheduler.run());
    let mut upload_status = uploads.subscribe();

    let deps = EngineDeps {
        backend: backend.clone(),
        page_cache: None,
        uploads: Some(uploads),
    };
    let (engine, engine_task) = ReconciliationEngine::spawn(deps, None);

    let path = store.staging_dir(None).join("abc1234.jpg");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"jpeg").unwrap();
    engine.capture_created(path);
    engine.settled().await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(keys(&snapshot.items), vec!["abc1234.jpg"]);
    assert_eq!(snapshot.diff.prepended, 1);

    tokio::time::timeout(Duration::from_secs(5), upload_status.changed())
        .await
        .expect("upload did not run")
        .unwrap();
    assert_eq!(backend.uploaded_names(), vec!["abc1234.jpg"]);

    engine.shutdown();
    engine_task.await.unwrap();
    cancel.cancel();
    scheduler_task.await.unwrap();
}

#[tokio::test]
async fn test_commands_after_shutdown_are_ignored() {
    let backend = Arc::new(MockBackend::default());
    let deps = EngineDeps {
        backend: backend.clone(),
        page_cache: None,
        uploads: None,
    };
    let (engine, task) = ReconciliationEngine::spawn(deps, None);

    engine.shutdown();
    task.await.unwrap();

    engine.on_items_added(vec![item("late", None)]);
    assert!(matches!(engine.settled().await, Err(SyncError::EngineStopped)));
    assert!(matches!(
        engine.load_page(50, 0).await,
        Err(SyncError::EngineStopped)
    ));
    assert!(engine.snapshot().items.is_empty());
}
