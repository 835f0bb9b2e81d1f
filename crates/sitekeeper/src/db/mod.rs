//! SQLite access.
//!
//! `Database` is a thread-safe rusqlite handle used both for the site
//! database (read as a tabular source during backup, written as a statement
//! sink during restore) and for the job-state database.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod dump;
pub mod error;
pub mod load;
pub mod migrations;
pub mod tabular;

pub use error::DatabaseError;
pub use tabular::{SchemaObject, SchemaObjectKind, SqlValue, StatementSink, TabularSource};

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). All access is serialized through
/// a `Mutex`, which is fine for SQLite (which serializes writes anyway).
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) a database without touching its schema.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Self::connect(path)?;
        log::info!("Database opened at {}", path.display());
        Ok(Self::wrap(conn))
    }

    /// Opens (or creates) the job-state database and runs all pending
    /// migrations.
    pub fn open_migrated(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Self::connect(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        migrations::run_all(&conn)?;
        log::info!("State database opened at {}", path.display());
        Ok(Self::wrap(conn))
    }

    /// Opens an empty in-memory database.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::wrap(conn))
    }

    /// In-memory database with migrations applied.
    pub fn open_in_memory_migrated() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        migrations::run_all(&conn)?;
        Ok(Self::wrap(conn))
    }

    fn connect(path: &Path) -> Result<Connection, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        Ok(Connection::open(path)?)
    }

    fn wrap(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}
