use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::{KeyValueStore, StoreError};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local store, for tests and one-shot CLI runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v1", None).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v1"));

        store.set("k", "v2", None).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));

        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.delete("k").unwrap();
    }

    #[test]
    fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store.set("short", "v", Some(Duration::ZERO)).unwrap();
        store
            .set("long", "v", Some(Duration::from_secs(3600)))
            .unwrap();

        assert_eq!(store.get("short").unwrap(), None);
        assert_eq!(store.get("long").unwrap().as_deref(), Some("v"));
    }
}
