//! Persistence seam for focus sessions and failure logs.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use focus_storage::{
    Database, FailureLog, FocusSession, NewFocusSession, PatchOutcome, SessionPatch,
    SessionStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Backing store for sessions, assumed read-your-writes per user
///
/// A write future may keep running after it is dropped (the SQLite store runs
/// on the blocking pool), so callers that give up on a write must still learn
/// its outcome before acting on it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session built from `request`
    async fn create_session(
        &self,
        user_id: &str,
        request: &NewFocusSession,
        status: SessionStatus,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<FocusSession>;

    /// Apply `patch` only if the stored status is still `expected`
    async fn update_session(
        &self,
        id: Uuid,
        expected: SessionStatus,
        patch: &SessionPatch,
    ) -> Result<PatchOutcome>;

    async fn get_session(&self, id: Uuid) -> Result<Option<FocusSession>>;

    async fn get_active_session(&self, user_id: &str) -> Result<Option<FocusSession>>;

    /// Every active session, used to rebuild lock state after a restart
    async fn list_active_sessions(&self) -> Result<Vec<FocusSession>>;

    async fn list_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<FocusSession>>;

    async fn append_failure_log(&self, entry: &FailureLog) -> Result<()>;

    async fn list_failure_logs(
        &self,
        user_id: &str,
        session_id: Option<Uuid>,
    ) -> Result<Vec<FailureLog>>;
}

// ============================================================================
// SQLite
// ============================================================================

/// `SessionStore` over the SQLite [`Database`]; queries run on the blocking pool
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Arc<Database>,
}

impl SqliteSessionStore {
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .context("Database task panicked")?
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_session(
        &self,
        user_id: &str,
        request: &NewFocusSession,
        status: SessionStatus,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<FocusSession> {
        let session = FocusSession::from_request(user_id, request, status, started_at);
        self.blocking(move |db| {
            db.insert_focus_session(&session)
                .context("Failed to insert focus session")?;
            Ok(session)
        })
        .await
    }

    async fn update_session(
        &self,
        id: Uuid,
        expected: SessionStatus,
        patch: &SessionPatch,
    ) -> Result<PatchOutcome> {
        let patch = patch.clone();
        self.blocking(move |db| {
            db.update_focus_session(id, expected, &patch)
                .context("Failed to update focus session")
        })
        .await
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<FocusSession>> {
        self.blocking(move |db| db.get_focus_session(id)).await
    }

    async fn get_active_session(&self, user_id: &str) -> Result<Option<FocusSession>> {
        let user_id = user_id.to_string();
        self.blocking(move |db| db.get_active_focus_session(&user_id))
            .await
    }

    async fn list_active_sessions(&self) -> Result<Vec<FocusSession>> {
        self.blocking(Database::list_active_focus_sessions).await
    }

    async fn list_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<FocusSession>> {
        let user_id = user_id.to_string();
        self.blocking(move |db| db.list_focus_sessions(&user_id, limit))
            .await
    }

    async fn append_failure_log(&self, entry: &FailureLog) -> Result<()> {
        let entry = entry.clone();
        self.blocking(move |db| db.insert_failure_log(&entry)).await
    }

    async fn list_failure_logs(
        &self,
        user_id: &str,
        session_id: Option<Uuid>,
    ) -> Result<Vec<FailureLog>> {
        let user_id = user_id.to_string();
        self.blocking(move |db| db.get_failure_logs(&user_id, session_id))
            .await
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
struct MemoryTables {
    sessions: HashMap<Uuid, FocusSession>,
    failure_logs: Vec<FailureLog>,
}

/// Process-local `SessionStore` with the same constraints as the SQLite schema.
///
/// Writes can be made to fail or stall to exercise error paths.
#[derive(Default)]
pub struct MemorySessionStore {
    tables: Mutex<MemoryTables>,
    fail_writes: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write return an error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every following write, e.g. to trip a timeout
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        if let Ok(mut guard) = self.write_delay.lock() {
            *guard = delay;
        }
    }

    /// Put a session in place as-is, bypassing the lifecycle; for recovery tests
    ///
    /// # Errors
    ///
    /// Returns an error if the tables mutex is poisoned
    pub fn seed(&self, session: FocusSession) -> Result<()> {
        self.tables()?.sessions.insert(session.id, session);
        Ok(())
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, MemoryTables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("Memory store mutex poisoned"))
    }

    async fn before_write(&self) -> Result<()> {
        let delay = *self
            .write_delay
            .lock()
            .map_err(|_| anyhow!("Memory store mutex poisoned"))?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("Simulated store write failure");
        }
        Ok(())
    }
}

fn has_other_active(tables: &MemoryTables, user_id: &str, except: Uuid) -> bool {
    tables.sessions.values().any(|s| {
        s.user_id == user_id && s.status == SessionStatus::Active && s.id != except
    })
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(
        &self,
        user_id: &str,
        request: &NewFocusSession,
        status: SessionStatus,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<FocusSession> {
        self.before_write().await?;
        let session = FocusSession::from_request(user_id, request, status, started_at);
        let mut tables = self.tables()?;
        if status == SessionStatus::Active && has_other_active(&tables, user_id, session.id) {
            anyhow::bail!("UNIQUE constraint failed: one active session per user");
        }
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn update_session(
        &self,
        id: Uuid,
        expected: SessionStatus,
        patch: &SessionPatch,
    ) -> Result<PatchOutcome> {
        self.before_write().await?;
        let mut tables = self.tables()?;
        let Some(current) = tables.sessions.get(&id) else {
            return Ok(PatchOutcome::Missing);
        };
        if current.status != expected {
            return Ok(PatchOutcome::StatusMismatch {
                actual: current.status,
            });
        }
        let user_id = current.user_id.clone();
        if patch.status == Some(SessionStatus::Active) && has_other_active(&tables, &user_id, id) {
            anyhow::bail!("UNIQUE constraint failed: one active session per user");
        }
        match tables.sessions.get_mut(&id) {
            Some(session) => {
                session.apply(patch);
                Ok(PatchOutcome::Applied(session.clone()))
            }
            None => Ok(PatchOutcome::Missing),
        }
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<FocusSession>> {
        Ok(self.tables()?.sessions.get(&id).cloned())
    }

    async fn get_active_session(&self, user_id: &str) -> Result<Option<FocusSession>> {
        Ok(self
            .tables()?
            .sessions
            .values()
            .find(|s| s.user_id == user_id && s.status == SessionStatus::Active)
            .cloned())
    }

    async fn list_active_sessions(&self) -> Result<Vec<FocusSession>> {
        let mut sessions: Vec<FocusSession> = self
            .tables()?
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        Ok(sessions)
    }

    async fn list_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<FocusSession>> {
        let mut sessions: Vec<FocusSession> = self
            .tables()?
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn append_failure_log(&self, entry: &FailureLog) -> Result<()> {
        self.before_write().await?;
        self.tables()?.failure_logs.push(entry.clone());
        Ok(())
    }

    async fn list_failure_logs(
        &self,
        user_id: &str,
        session_id: Option<Uuid>,
    ) -> Result<Vec<FailureLog>> {
        Ok(self
            .tables()?
            .failure_logs
            .iter()
            .filter(|log| log.user_id == user_id)
            .filter(|log| session_id.is_none() || log.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewFocusSession {
        NewFocusSession::new("Deep work", 25).with_restrictions(["com.x"])
    }

    async fn exercise(store: &dyn SessionStore) {
        let session = store
            .create_session("u1", &request(), SessionStatus::Active, Some(Utc::now()))
            .await
            .unwrap();
        assert_eq!(
            store.get_active_session("u1").await.unwrap().map(|s| s.id),
            Some(session.id)
        );
        assert!(store
            .create_session("u1", &request(), SessionStatus::Active, Some(Utc::now()))
            .await
            .is_err());

        let finish = SessionPatch::finish(SessionStatus::Failed, Utc::now());
        let applied = store
            .update_session(session.id, SessionStatus::Active, &finish)
            .await
            .unwrap();
        assert!(matches!(applied, PatchOutcome::Applied(ref s) if s.status == SessionStatus::Failed));

        let stale = store
            .update_session(
                session.id,
                SessionStatus::Active,
                &SessionPatch::finish(SessionStatus::Cancelled, Utc::now()),
            )
            .await
            .unwrap();
        assert_eq!(
            stale,
            PatchOutcome::StatusMismatch {
                actual: SessionStatus::Failed
            }
        );
        let stored = store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
        assert!(store.get_active_session("u1").await.unwrap().is_none());
        assert!(store.list_active_sessions().await.unwrap().is_empty());

        assert_eq!(
            store
                .update_session(Uuid::new_v4(), SessionStatus::Active, &SessionPatch::progress(1))
                .await
                .unwrap(),
            PatchOutcome::Missing
        );

        store
            .append_failure_log(&FailureLog::new(
                "u1",
                Some(session.id),
                focus_storage::FailureKind::SessionAbandoned,
            ))
            .await
            .unwrap();
        assert_eq!(store.list_failure_logs("u1", Some(session.id)).await.unwrap().len(), 1);
        assert_eq!(store.list_sessions("u1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_contract() {
        exercise(&MemorySessionStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_contract() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        exercise(&SqliteSessionStore::new(db)).await;
    }

    #[tokio::test]
    async fn test_memory_store_failure_injection() {
        let store = MemorySessionStore::new();
        store.set_fail_writes(true);
        assert!(store
            .create_session("u1", &request(), SessionStatus::Scheduled, None)
            .await
            .is_err());
        assert!(store.list_sessions("u1", 10).await.unwrap().is_empty());
    }
}
