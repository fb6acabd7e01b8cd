use anyhow::Result;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::models::FailureLog;

use super::helpers::{parse_datetime, parse_enum, parse_json, parse_uuid};
use super::Database;

impl Database {
    /// Append a failure log entry
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert operation fails
    pub fn insert_failure_log(&self, entry: &FailureLog) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO failure_logs (id, user_id, session_id, failure_type, app_bundle_id, app_name, failure_reason, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id.to_string(),
                entry.user_id,
                entry.session_id.map(|id| id.to_string()),
                entry.kind.to_string(),
                entry.app_bundle_id,
                entry.app_name,
                entry.reason,
                serde_json::to_string(&entry.metadata)?,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        log::debug!(
            "Logged failure for {}: {} (session {:?})",
            entry.user_id,
            entry.kind,
            entry.session_id
        );
        Ok(())
    }

    /// Get failure logs of a user, optionally narrowed to one session, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_failure_logs(
        &self,
        user_id: &str,
        session_id: Option<Uuid>,
    ) -> Result<Vec<FailureLog>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, session_id, failure_type, app_bundle_id, app_name, failure_reason, metadata, created_at
             FROM failure_logs
             WHERE user_id = ?1 AND (?2 IS NULL OR session_id = ?2)
             ORDER BY created_at ASC",
        )?;

        let logs = stmt
            .query_map(
                params![user_id, session_id.map(|id| id.to_string())],
                Self::row_to_failure_log,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(logs)
    }

    fn row_to_failure_log(row: &Row<'_>) -> rusqlite::Result<FailureLog> {
        Ok(FailureLog {
            id: parse_uuid(0, &row.get::<_, String>(0)?)?,
            user_id: row.get(1)?,
            session_id: row
                .get::<_, Option<String>>(2)?
                .map(|s| parse_uuid(2, &s))
                .transpose()?,
            kind: parse_enum(3, &row.get::<_, String>(3)?)?,
            app_bundle_id: row.get(4)?,
            app_name: row.get(5)?,
            reason: row.get(6)?,
            metadata: parse_json(7, &row.get::<_, String>(7)?)?,
            created_at: parse_datetime(8, &row.get::<_, String>(8)?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureDetails, FailureKind, FocusSession, NewFocusSession, SessionStatus};

    #[test]
    fn test_insert_and_filter_failure_logs() {
        let db = Database::open_in_memory().unwrap();
        let session = FocusSession::from_request(
            "user-1",
            &NewFocusSession::new("Study", 45),
            SessionStatus::Active,
            Some(chrono::Utc::now()),
        );
        db.insert_focus_session(&session).unwrap();

        let mut opened = FailureDetails::app("com.instagram.app");
        opened.metadata = Some(serde_json::json!({ "attempt": 4 }));
        db.insert_failure_log(&opened.into_log("user-1", Some(session.id), FailureKind::AppOpened))
            .unwrap();
        db.insert_failure_log(&FailureLog::new("user-1", None, FailureKind::TimeLimitExceeded))
            .unwrap();

        let all = db.get_failure_logs("user-1", None).unwrap();
        assert_eq!(all.len(), 2);

        let for_session = db.get_failure_logs("user-1", Some(session.id)).unwrap();
        assert_eq!(for_session.len(), 1);
        assert_eq!(for_session[0].kind, FailureKind::AppOpened);
        assert_eq!(for_session[0].app_bundle_id.as_deref(), Some("com.instagram.app"));
        assert_eq!(for_session[0].metadata["attempt"], 4);

        assert!(db.get_failure_logs("user-2", None).unwrap().is_empty());
    }
}
