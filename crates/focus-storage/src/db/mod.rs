//! SQLite persistence for focus sessions and failure logs.
//!
//! Each table gets its own file of `impl Database` methods.

mod failure_logs;
mod focus_sessions;
mod helpers;

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Single SQLite connection shared by the store
///
/// Guarded by a mutex; callers run queries on the blocking pool.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file, `default_db_path()` when `None`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be applied
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = db_path.unwrap_or_else(Self::default_db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        // Several short-lived CLI processes may write at once
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let journal: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("SQLite journal mode: {journal}");

        let db = Self::from_connection(conn)?;
        log::debug!("Focus database ready at {}", path.display());
        Ok(db)
    }

    /// Open a private in-memory database, mostly for tests
    ///
    /// # Errors
    ///
    /// Returns an error if schema initialization fails
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// `<local data dir>/focus/focus.db`
    #[must_use]
    pub fn default_db_path() -> PathBuf {
        let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("focus");
        path.push("focus.db");
        path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection mutex poisoned"))
    }
}
