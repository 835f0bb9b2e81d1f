//! Single-slot repository over the job store.
//!
//! There is one fixed key for the current job of each kind and one for its
//! progress, so creating a job always supersedes the previous one.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{KeyValueStore, StoreError};
use crate::engine::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobKeys {
    pub job: &'static str,
    pub progress: &'static str,
}

impl JobKeys {
    pub const BACKUP: JobKeys = JobKeys {
        job: "backup_job",
        progress: "backup_progress",
    };

    pub const RESTORE: JobKeys = JobKeys {
        job: "restore_job",
        progress: "restore_progress",
    };
}

pub struct JobRepository<J> {
    store: Arc<dyn KeyValueStore>,
    keys: JobKeys,
    _job: PhantomData<fn() -> J>,
}

impl<J> Clone for JobRepository<J> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: self.keys,
            _job: PhantomData,
        }
    }
}

impl<J> JobRepository<J>
where
    J: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn KeyValueStore>, keys: JobKeys) -> Self {
        Self {
            store,
            keys,
            _job: PhantomData,
        }
    }

    pub fn current(&self) -> Result<Option<J>, StoreError> {
        match self.store.get(self.keys.job)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Writes the whole job document, replacing whatever was stored.
    pub fn replace(&self, job: &J, ttl: Duration) -> Result<(), StoreError> {
        let json = serde_json::to_string(job)?;
        self.store.set(self.keys.job, &json, Some(ttl))
    }

    /// Drops the job and its progress.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.delete(self.keys.job)?;
        self.store.delete(self.keys.progress)
    }

    pub fn progress(&self) -> Result<Option<Progress>, StoreError> {
        match self.store.get(self.keys.progress)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn set_progress(&self, progress: &Progress, ttl: Duration) -> Result<(), StoreError> {
        let json = serde_json::to_string(progress)?;
        self.store.set(self.keys.progress, &json, Some(ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProgressStatus;
    use crate::store::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        id: String,
        count: usize,
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_replace_supersedes() {
        let repo: JobRepository<Doc> =
            JobRepository::new(Arc::new(MemoryStore::new()), JobKeys::BACKUP);
        assert_eq!(repo.current().unwrap(), None);

        repo.replace(&Doc { id: "a".into(), count: 1 }, HOUR).unwrap();
        repo.replace(&Doc { id: "b".into(), count: 2 }, HOUR).unwrap();
        assert_eq!(
            repo.current().unwrap(),
            Some(Doc { id: "b".into(), count: 2 })
        );
    }

    #[test]
    fn test_clear_removes_progress_too() {
        let repo: JobRepository<Doc> =
            JobRepository::new(Arc::new(MemoryStore::new()), JobKeys::RESTORE);
        repo.replace(&Doc { id: "a".into(), count: 1 }, HOUR).unwrap();
        repo.set_progress(
            &Progress::new("a", 40, "Extracting", ProgressStatus::Running),
            HOUR,
        )
        .unwrap();

        repo.clear().unwrap();
        assert!(repo.current().unwrap().is_none());
        assert!(repo.progress().unwrap().is_none());
    }

    #[test]
    fn test_backup_and_restore_slots_are_independent() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let backup: JobRepository<Doc> = JobRepository::new(Arc::clone(&store), JobKeys::BACKUP);
        let restore: JobRepository<Doc> = JobRepository::new(store, JobKeys::RESTORE);

        backup.replace(&Doc { id: "b".into(), count: 0 }, HOUR).unwrap();
        assert!(restore.current().unwrap().is_none());
        restore.clear().unwrap();
        assert!(backup.current().unwrap().is_some());
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store.set("backup_job", "not json", None).unwrap();
        let repo: JobRepository<Doc> = JobRepository::new(store, JobKeys::BACKUP);
        assert!(matches!(repo.current(), Err(StoreError::Serialize(_))));
    }
}
