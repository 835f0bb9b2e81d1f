use std::path::Path;
use std::time::Duration;

use rusqlite::{params, OptionalExtension};

use super::{KeyValueStore, StoreError};
use crate::db::Database;

/// Job store persisted in the state database, so jobs survive process
/// restarts between batch calls.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::open_migrated(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::open_in_memory_migrated()?,
        })
    }

    /// Removes every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = now_millis();
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM kv_store WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                [now],
            )?)
        })?;
        if removed > 0 {
            log::debug!("Purged {} expired job store entries", removed);
        }
        Ok(removed)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = now_millis();
        let row: Option<(String, Option<i64>)> = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value, expires_at FROM kv_store WHERE key = ?1",
                    [key],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?)
        })?;

        match row {
            Some((_, Some(expires_at))) if expires_at <= now => {
                self.delete(key)?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|ttl| now_millis().saturating_add(ttl.as_millis() as i64));
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, expires_at, updated_at)
                 VALUES (?1, ?2, ?3, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at",
                params![key, value, expires_at],
            )?;
            Ok(())
        })?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
            Ok(())
        })?;
        Ok(())
    }
}
