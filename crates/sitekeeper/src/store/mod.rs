//! Job store: a small key/value store with per-entry TTL that keeps the
//! single active job document and its progress between batch calls.

use std::time::Duration;

use thiserror::Error;

use crate::db::DatabaseError;

pub mod memory;
pub mod repository;
pub mod sqlite;

pub use memory::MemoryStore;
pub use repository::{JobKeys, JobRepository};
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to (de)serialize stored document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Opaque get/set/delete store. Values are JSON text.
///
/// Expired entries behave exactly like missing ones.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value. `None` keeps
    /// the entry until it is deleted.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}
