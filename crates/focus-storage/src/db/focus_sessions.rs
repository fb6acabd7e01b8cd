use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use crate::models::{FocusSession, PatchOutcome, SessionPatch, SessionStatus};

use super::helpers::{parse_datetime, parse_enum, parse_json, parse_opt_datetime, parse_uuid};
use super::Database;

const SESSION_COLUMNS: &str = "id, user_id, title, description, duration_minutes, scheduled_at,
    started_at, ended_at, total_focus_minutes, status, app_restrictions, app_lock_enabled,
    essay_required, essay_content, essay_word_count, paused_at, paused_minutes,
    unlock_attempts, created_at, updated_at";

impl Database {
    /// Insert a new focus session
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including when it would create a
    /// second active session for the same user
    pub fn insert_focus_session(&self, session: &FocusSession) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO focus_sessions ({SESSION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
            ),
            params![
                session.id.to_string(),
                session.user_id,
                session.title,
                session.description,
                session.duration_minutes,
                session.scheduled_at.map(|t| t.to_rfc3339()),
                session.started_at.map(|t| t.to_rfc3339()),
                session.ended_at.map(|t| t.to_rfc3339()),
                session.total_focus_minutes,
                session.status.to_string(),
                serde_json::to_string(&session.app_restrictions)?,
                i32::from(session.app_lock_enabled),
                i32::from(session.essay_required),
                session.essay_content,
                session.essay_word_count,
                session.paused_at.map(|t| t.to_rfc3339()),
                session.paused_minutes,
                session.unlock_attempts,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        log::debug!(
            "Inserted focus session {} for {} ({})",
            session.id,
            session.user_id,
            session.status
        );
        Ok(())
    }

    /// Get a focus session by id
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_focus_session(&self, id: Uuid) -> Result<Option<FocusSession>> {
        let conn = self.conn()?;
        Self::load_focus_session(&conn, id)
    }

    /// Get the active focus session of a user, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_active_focus_session(&self, user_id: &str) -> Result<Option<FocusSession>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM focus_sessions
                     WHERE user_id = ?1 AND status = ?2
                     LIMIT 1"
                ),
                params![user_id, SessionStatus::Active.to_string()],
                Self::row_to_focus_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Get every active focus session across all users
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn list_active_focus_sessions(&self) -> Result<Vec<FocusSession>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM focus_sessions
             WHERE status = ?1
             ORDER BY started_at ASC"
        ))?;

        let sessions = stmt
            .query_map([SessionStatus::Active.to_string()], Self::row_to_focus_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(sessions)
    }

    /// Get the most recent focus sessions of a user, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn list_focus_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<FocusSession>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM focus_sessions
             WHERE user_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2"
        ))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sessions = stmt
            .query_map(params![user_id, limit], Self::row_to_focus_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(sessions)
    }

    /// Apply a partial update if the stored status is still `expected`
    ///
    /// Runs in an immediate transaction, so the status check and the write are
    /// atomic across every connection to the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or the write fails
    pub fn update_focus_session(
        &self,
        id: Uuid,
        expected: SessionStatus,
        patch: &SessionPatch,
    ) -> Result<PatchOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut session) = Self::load_focus_session(&tx, id)? else {
            return Ok(PatchOutcome::Missing);
        };
        if session.status != expected {
            log::debug!(
                "Skipped update of focus session {id}: expected {expected}, found {}",
                session.status
            );
            return Ok(PatchOutcome::StatusMismatch {
                actual: session.status,
            });
        }
        session.apply(patch);

        let written = tx.execute(
            "UPDATE focus_sessions
             SET status = ?3, started_at = ?4, ended_at = ?5, total_focus_minutes = ?6,
                 paused_at = ?7, paused_minutes = ?8, essay_content = ?9,
                 essay_word_count = ?10, unlock_attempts = ?11, updated_at = ?12
             WHERE id = ?1 AND status = ?2",
            params![
                id.to_string(),
                expected.to_string(),
                session.status.to_string(),
                session.started_at.map(|t| t.to_rfc3339()),
                session.ended_at.map(|t| t.to_rfc3339()),
                session.total_focus_minutes,
                session.paused_at.map(|t| t.to_rfc3339()),
                session.paused_minutes,
                session.essay_content,
                session.essay_word_count,
                session.unlock_attempts,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if written == 0 {
            anyhow::bail!("Focus session {id} changed inside an immediate transaction");
        }
        tx.commit()?;

        log::debug!("Updated focus session {id}: {patch:?}");
        Ok(PatchOutcome::Applied(session))
    }

    fn load_focus_session(conn: &Connection, id: Uuid) -> Result<Option<FocusSession>> {
        let session = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM focus_sessions WHERE id = ?1"),
                [id.to_string()],
                Self::row_to_focus_session,
            )
            .optional()?;
        Ok(session)
    }

    fn row_to_focus_session(row: &Row<'_>) -> rusqlite::Result<FocusSession> {
        Ok(FocusSession {
            id: parse_uuid(0, &row.get::<_, String>(0)?)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            duration_minutes: row.get(4)?,
            scheduled_at: parse_opt_datetime(5, row.get(5)?)?,
            started_at: parse_opt_datetime(6, row.get(6)?)?,
            ended_at: parse_opt_datetime(7, row.get(7)?)?,
            total_focus_minutes: row.get(8)?,
            status: parse_enum(9, &row.get::<_, String>(9)?)?,
            app_restrictions: parse_json(10, &row.get::<_, String>(10)?)?,
            app_lock_enabled: row.get::<_, i32>(11)? != 0,
            essay_required: row.get::<_, i32>(12)? != 0,
            essay_content: row.get(13)?,
            essay_word_count: row.get(14)?,
            paused_at: parse_opt_datetime(15, row.get(15)?)?,
            paused_minutes: row.get(16)?,
            unlock_attempts: row.get(17)?,
            created_at: parse_datetime(18, &row.get::<_, String>(18)?)?,
            updated_at: parse_datetime(19, &row.get::<_, String>(19)?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewFocusSession;

    fn active_session(user: &str) -> FocusSession {
        let request = NewFocusSession::new("Write report", 50)
            .with_restrictions(["com.instagram.app", "com.tiktok"])
            .with_essay();
        FocusSession::from_request(user, &request, SessionStatus::Active, Some(Utc::now()))
    }

    #[test]
    fn test_insert_and_get_focus_session() {
        let db = Database::open_in_memory().unwrap();
        let session = active_session("user-1");
        db.insert_focus_session(&session).unwrap();

        let loaded = db.get_focus_session(session.id).unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.status, SessionStatus::Active);
        assert_eq!(loaded.app_restrictions, vec!["com.instagram.app", "com.tiktok"]);
        assert!(loaded.app_lock_enabled);
        assert!(loaded.essay_required);
        assert!(loaded.ended_at.is_none());

        assert!(db.get_focus_session(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_active_session_lookup() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_active_focus_session("user-1").unwrap().is_none());

        let session = active_session("user-1");
        db.insert_focus_session(&session).unwrap();

        let active = db.get_active_focus_session("user-1").unwrap().unwrap();
        assert_eq!(active.id, session.id);
        assert!(db.get_active_focus_session("user-2").unwrap().is_none());
        assert_eq!(db.list_active_focus_sessions().unwrap().len(), 1);
    }

    #[test]
    fn test_second_active_session_is_rejected_by_index() {
        let db = Database::open_in_memory().unwrap();
        db.insert_focus_session(&active_session("user-1")).unwrap();
        assert!(db.insert_focus_session(&active_session("user-1")).is_err());
        db.insert_focus_session(&active_session("user-2")).unwrap();
    }

    #[test]
    fn test_update_focus_session() {
        let db = Database::open_in_memory().unwrap();
        let session = active_session("user-1");
        db.insert_focus_session(&session).unwrap();

        let PatchOutcome::Applied(updated) = db
            .update_focus_session(session.id, SessionStatus::Active, &SessionPatch::progress(12))
            .unwrap()
        else {
            panic!("progress update was not applied");
        };
        assert_eq!(updated.total_focus_minutes, 12);

        let ended_at = Utc::now();
        db.update_focus_session(
            session.id,
            SessionStatus::Active,
            &SessionPatch::finish(SessionStatus::Completed, ended_at),
        )
        .unwrap();

        let loaded = db.get_focus_session(session.id).unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Completed);
        assert_eq!(loaded.total_focus_minutes, 12);
        assert!(loaded.ended_at.is_some());
        assert!(db.get_active_focus_session("user-1").unwrap().is_none());
    }

    #[test]
    fn test_update_missing_session() {
        let db = Database::open_in_memory().unwrap();
        let result = db
            .update_focus_session(Uuid::new_v4(), SessionStatus::Active, &SessionPatch::progress(1))
            .unwrap();
        assert_eq!(result, PatchOutcome::Missing);
    }

    #[test]
    fn test_stale_status_write_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focus.db");
        let first = Database::new(Some(path.clone())).unwrap();
        let second = Database::new(Some(path)).unwrap();

        let session = active_session("user-1");
        first.insert_focus_session(&session).unwrap();

        // Both connections saw the session active; the first one ends it
        first
            .update_focus_session(
                session.id,
                SessionStatus::Active,
                &SessionPatch::finish(SessionStatus::Completed, Utc::now()),
            )
            .unwrap();
        let stale = second
            .update_focus_session(
                session.id,
                SessionStatus::Active,
                &SessionPatch::finish(SessionStatus::Cancelled, Utc::now()),
            )
            .unwrap();

        assert_eq!(
            stale,
            PatchOutcome::StatusMismatch {
                actual: SessionStatus::Completed
            }
        );
        let stored = second.get_focus_session(session.id).unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
    }

    #[test]
    fn test_unlock_attempts_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let session = active_session("user-1");
        db.insert_focus_session(&session).unwrap();

        let patch = SessionPatch {
            unlock_attempts: Some(2),
            ..SessionPatch::default()
        };
        db.update_focus_session(session.id, SessionStatus::Active, &patch)
            .unwrap();
        let loaded = db.get_focus_session(session.id).unwrap().unwrap();
        assert_eq!(loaded.unlock_attempts, 2);
    }

    #[test]
    fn test_list_focus_sessions_respects_limit() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..3 {
            let request = NewFocusSession::new(format!("Session {i}"), 25);
            let session =
                FocusSession::from_request("user-1", &request, SessionStatus::Scheduled, None);
            db.insert_focus_session(&session).unwrap();
        }

        assert_eq!(db.list_focus_sessions("user-1", 2).unwrap().len(), 2);
        assert_eq!(db.list_focus_sessions("user-1", 10).unwrap().len(), 3);
        assert!(db.list_focus_sessions("user-2", 10).unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focus.db");
        let session = active_session("user-1");

        {
            let db = Database::new(Some(path.clone())).unwrap();
            db.insert_focus_session(&session).unwrap();
        }

        let db = Database::new(Some(path)).unwrap();
        let active = db.get_active_focus_session("user-1").unwrap().unwrap();
        assert_eq!(active.id, session.id);
    }
}
