use focus_core::platform::MemoryPlatform;
use focus_core::{
    FocusConfig, Outcome, RecordingNotifier, RestrictionEnforcer, SessionController,
    SqliteSessionStore,
};
use focus_storage::{Database, NewFocusSession, SessionStatus};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tempfile::TempDir;

/// One process worth of wiring over the database at `path`
fn open(path: &Path, config: FocusConfig) -> (SessionController, Arc<MemoryPlatform>) {
    let db = Arc::new(Database::new(Some(path.to_path_buf())).unwrap());
    let platform = Arc::new(MemoryPlatform::new());
    let enforcer = Arc::new(RestrictionEnforcer::new(platform.clone(), &config));
    let controller = SessionController::new(
        Arc::new(SqliteSessionStore::new(db)),
        enforcer,
        Arc::new(RecordingNotifier::new()),
        config,
    );
    (controller, platform)
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("focus.db")
}

fn deep_work() -> NewFocusSession {
    NewFocusSession::new("Deep work", 25).with_restrictions(["com.a", "com.b"])
}

#[tokio::test]
async fn test_start_attempts_end_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let (controller, platform) = open(&db_path(&dir), FocusConfig::default());

    let session = controller.start("u", deep_work()).await.unwrap();
    assert!(controller.is_blocked("u", "com.a"));

    let conflict = controller.start("u", deep_work()).await.unwrap_err();
    assert_eq!(conflict.kind(), "conflict");

    for expected in [2, 1, 0] {
        assert_eq!(controller.record_unlock_attempt("u").await.unwrap(), expected);
    }
    controller.update_progress(session.id, 20).await.unwrap();
    assert_eq!(
        controller.update_progress(session.id, 5).await.unwrap_err().kind(),
        "invalid_progress"
    );

    let ended = controller.end(session.id, Outcome::Success).await.unwrap();
    assert_eq!(ended.status, SessionStatus::Completed);
    assert_eq!(ended.total_focus_minutes, 20);
    assert_eq!(ended.unlock_attempts, 3);
    assert!(ended.ended_at.is_some());
    assert!(!controller.is_blocked("u", "com.a"));
    assert!(platform.blocked().is_empty());
}

#[tokio::test]
async fn test_reopened_database_restores_lock_and_attempts() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let session = {
        let (first, _) = open(&path, FocusConfig::default());
        let session = first.start("u", deep_work()).await.unwrap();
        first.record_unlock_attempt("u").await.unwrap();
        first.record_unlock_attempt("u").await.unwrap();
        session
    };

    let (second, platform) = open(&path, FocusConfig::default());
    let report = second.reconcile().await.unwrap();
    assert_eq!(report.restored, 1);
    assert!(second.is_blocked("u", "com.b"));
    assert!(platform.blocked().contains("com.a"));

    let state = second.restriction_state("u");
    assert_eq!(state.session_id, Some(session.id));
    assert_eq!(state.unlock_attempts, 2);
    assert_eq!(second.record_unlock_attempt("u").await.unwrap(), 0);

    second.end(session.id, Outcome::Failure).await.unwrap();
    assert!(platform.blocked().is_empty());
}

#[tokio::test]
async fn test_session_ended_elsewhere_is_not_ended_twice() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let (first, _) = open(&path, FocusConfig::default());
    let (second, _) = open(&path, FocusConfig::default());

    let session = first.start("u", deep_work()).await.unwrap();
    second.reconcile().await.unwrap();

    second.cancel(session.id).await.unwrap();
    let err = first.end(session.id, Outcome::Success).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_state");
    assert_eq!(
        first.session(session.id).await.unwrap().status,
        SessionStatus::Cancelled
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_stuck_behind_other_writer_is_rolled_back() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);
    let config = FocusConfig {
        store_timeout_ms: 200,
        ..FocusConfig::default()
    };
    let (controller, platform) = open(&path, config);

    // Another process holds the write lock longer than the store timeout
    let (held_tx, held_rx) = mpsc::channel();
    let holder_path = path.clone();
    let holder = std::thread::spawn(move || {
        let conn = rusqlite::Connection::open(holder_path).unwrap();
        conn.execute_batch("BEGIN IMMEDIATE;").unwrap();
        held_tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(800));
        conn.execute_batch("COMMIT;").unwrap();
    });
    held_rx.recv().unwrap();

    let err = controller.start("u", deep_work()).await.unwrap_err();
    holder.join().unwrap();

    assert_eq!(err.kind(), "storage");
    assert!(!controller.restriction_state("u").locked);
    assert!(platform.blocked().is_empty());
    assert!(controller.active_session("u").await.unwrap().is_none());

    let history = controller.history("u", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SessionStatus::Cancelled);
}
