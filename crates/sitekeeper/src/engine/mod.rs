//! Resumable batch engines.
//!
//! An engine turns one long operation into a sequence of bounded
//! `process_batch` calls over a serializable job document. The engine never
//! stores the job itself: the caller loads it, hands it in, and writes the
//! whole document back afterwards (see [`crate::runner::JobRunner`]).

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub mod backup;
pub mod disk;
pub mod hooks;
pub mod progress;
pub mod restore;
pub mod step;

pub use backup::{BackupEngine, BackupJob, BackupOptions, CategoryQueue, TableCursor};
pub use disk::{DiskSpacePolicy, FixedSpaceProbe, FsSpaceProbe, SpaceProbe, SpaceStatus};
pub use hooks::{NoopHook, PostRestoreHook};
pub use progress::{Progress, ProgressStatus};
pub use restore::{RestoreEngine, RestoreJob};
pub use step::{BackupStep, RestoreStep};

/// The persisted state of one job.
pub trait JobDocument: Serialize + DeserializeOwned {
    fn job_id(&self) -> &str;

    /// Snapshot of the last computed progress.
    fn progress(&self) -> Progress;

    fn is_terminal(&self) -> bool;

    /// Marks the job for cancellation; the engine acts on it at the start of
    /// the next batch.
    fn request_cancel(&mut self, at: DateTime<Utc>);

    /// Remembers the last fatal error so pollers can see it.
    fn record_error(&mut self, message: String);
}

/// Result of one successful batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub progress: Progress,
    /// Items skipped during this batch (missing or unreadable files).
    pub skipped: usize,
}

pub trait Engine {
    type Job: JobDocument;
    /// What `create_job` needs: category flags for a backup, an archive
    /// name for a restore.
    type Request;

    /// Short name used in logs ("backup", "restore").
    fn kind(&self) -> &'static str;

    fn create_job(&self, request: Self::Request) -> Result<Self::Job>;

    /// Runs one bounded unit of work. Terminal jobs are returned untouched.
    ///
    /// On error the job's progress counters are left where they were, so the
    /// same batch can be retried.
    fn process_batch(&self, job: &mut Self::Job) -> Result<BatchReport>;
}
