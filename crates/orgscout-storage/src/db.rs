//! SQLite handle for the turn log.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use orgscout_core::error::ScoutError;

use crate::migrations;

const FILE_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;";

/// One serialized connection; callers borrow it through [`Database::with_conn`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the turn log at `path`, creating parent directories
    /// and bringing the schema up to date.
    pub fn new(path: &Path) -> Result<Self, ScoutError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(sqlite_err("open database"))?;
        conn.execute_batch(FILE_PRAGMAS)
            .map_err(sqlite_err("configure database"))?;
        info!(path = %path.display(), "Turn log opened");
        Self::prepare(conn)
    }

    /// Private in-memory database, used by tests and throwaway runs.
    pub fn in_memory() -> Result<Self, ScoutError> {
        let conn = Connection::open_in_memory().map_err(sqlite_err("open in-memory database"))?;
        Self::prepare(conn)
    }

    fn prepare(conn: Connection) -> Result<Self, ScoutError> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` while holding the connection lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ScoutError>
    where
        F: FnOnce(&Connection) -> Result<T, ScoutError>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| ScoutError::Storage("turn log lock poisoned".to_string()))?;
        f(&guard)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Database { .. }")
    }
}

/// Adapter for `map_err` that prefixes SQLite failures with what was attempted.
pub(crate) fn sqlite_err(action: &'static str) -> impl Fn(rusqlite::Error) -> ScoutError {
    move |e| ScoutError::Storage(format!("Failed to {action}: {e}"))
}
