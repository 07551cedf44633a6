//! SQLite handle shared by the document store.
//!
//! One connection per process, guarded by a mutex. File databases run in
//! WAL mode with a busy timeout so a second `ihos` invocation against the
//! same data directory waits instead of failing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, Transaction};
use tracing::{debug, info};

use ihos_core::error::IhosError;

use crate::migrations;

/// How long a writer waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Memory,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::File(path) => write!(f, "{}", path.display()),
            Location::Memory => f.write_str(":memory:"),
        }
    }
}

pub struct Database {
    conn: Mutex<Connection>,
    location: Location,
}

fn sqlite_err(context: &'static str) -> impl Fn(rusqlite::Error) -> IhosError {
    move |e| IhosError::Storage(format!("{}: {}", context, e))
}

impl Database {
    /// Open the database file at `path`, creating it and its parent
    /// directories when missing, and bring the schema up to date.
    pub fn new(path: &Path) -> Result<Self, IhosError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(sqlite_err("Failed to open database"))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(sqlite_err("Failed to set busy timeout"))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(sqlite_err("Failed to configure journal"))?;

        Self::prepare(conn, Location::File(path.to_path_buf()))
    }

    /// Throwaway database for tests and offline runs.
    pub fn in_memory() -> Result<Self, IhosError> {
        let conn = Connection::open_in_memory().map_err(sqlite_err("Failed to open in-memory db"))?;
        Self::prepare(conn, Location::Memory)
    }

    fn prepare(conn: Connection, location: Location) -> Result<Self, IhosError> {
        migrations::run_migrations(&conn)?;
        let version = migrations::current_version(&conn)?;
        info!(location = %location, schema = version, "Document database ready");
        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Schema version currently applied.
    pub fn schema_version(&self) -> Result<i64, IhosError> {
        self.with_conn(migrations::current_version)
    }

    /// Run `f` while holding the connection. Reads followed by writes in one
    /// closure are atomic with respect to other callers in this process.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, IhosError>
    where
        F: FnOnce(&Connection) -> Result<T, IhosError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| IhosError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run `f` inside a transaction. Commits when `f` succeeds; any error
    /// rolls every statement back.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, IhosError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, IhosError>,
    {
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(sqlite_err("Failed to begin transaction"))?;
            let value = f(&tx)?;
            tx.commit().map_err(sqlite_err("Failed to commit"))?;
            debug!(location = %self.location, "transaction committed");
            Ok(value)
        })
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
