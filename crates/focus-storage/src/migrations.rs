use anyhow::Result;
use rusqlite::Connection;

/// Initialize database schema
///
/// # Errors
///
/// Returns an error if database table creation or index creation fails
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Focus sessions - one row per commitment, never deleted
    conn.execute(
        "CREATE TABLE IF NOT EXISTS focus_sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            duration_minutes INTEGER NOT NULL,
            scheduled_at TEXT,
            started_at TEXT,
            ended_at TEXT,
            total_focus_minutes INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            app_restrictions TEXT NOT NULL DEFAULT '[]',
            app_lock_enabled INTEGER NOT NULL DEFAULT 0,
            essay_required INTEGER NOT NULL DEFAULT 0,
            essay_content TEXT,
            essay_word_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // Columns added after the first schema
    let columns_to_add = vec![
        ("paused_at", "TEXT"),
        ("paused_minutes", "INTEGER NOT NULL DEFAULT 0"),
        ("unlock_attempts", "INTEGER NOT NULL DEFAULT 0"),
    ];

    for (column_name, column_type) in columns_to_add {
        let column_exists: i32 = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('focus_sessions') WHERE name = ?1",
            [column_name],
            |row| row.get(0),
        )?;

        if column_exists == 0 {
            conn.execute(
                &format!("ALTER TABLE focus_sessions ADD COLUMN {column_name} {column_type}"),
                [],
            )?;
            log::debug!("Added column focus_sessions.{column_name}");
        }
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_focus_sessions_user
         ON focus_sessions(user_id, created_at)",
        [],
    )?;

    // Second line of defence for the one-active-session-per-user rule
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_focus_sessions_one_active
         ON focus_sessions(user_id) WHERE status = 'active'",
        [],
    )?;

    // Failure logs - append only
    conn.execute(
        "CREATE TABLE IF NOT EXISTS failure_logs (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            session_id TEXT REFERENCES focus_sessions(id),
            failure_type TEXT NOT NULL,
            app_bundle_id TEXT,
            app_name TEXT,
            failure_reason TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_failure_logs_user
         ON failure_logs(user_id, created_at)",
        [],
    )?;

    Ok(())
}
