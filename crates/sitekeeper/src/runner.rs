//! Resumable job surface.
//!
//! `JobRunner` pairs an [`Engine`] with the single-slot job repository. Each
//! `step_once` call loads the job, runs one batch and writes the whole job
//! back, on the error path too.
//!
//! The runner does no locking. Callers must make sure at most one
//! `step_once` (or `cancel`) per job kind runs at a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::RetentionConfig;
use crate::engine::{Engine, JobDocument, Progress, ProgressStatus};
use crate::error::{EngineError, Result};
use crate::store::{JobKeys, JobRepository, KeyValueStore};

/// Batches `run_to_completion` allows before giving up.
pub const DEFAULT_MAX_LOOPS: usize = 1000;

/// What one `step_once` call achieved.
#[derive(Debug)]
pub enum BatchOutcome {
    Progress(Progress),
    Completed(Progress),
    Cancelled(Progress),
    /// The batch failed; the job was persisted unadvanced.
    Fatal {
        progress: Progress,
        error: EngineError,
    },
}

impl BatchOutcome {
    fn from_progress(progress: Progress) -> Self {
        match progress.status {
            ProgressStatus::Completed => BatchOutcome::Completed(progress),
            ProgressStatus::Cancelled => BatchOutcome::Cancelled(progress),
            ProgressStatus::Running | ProgressStatus::Failed => BatchOutcome::Progress(progress),
        }
    }

    pub fn progress(&self) -> &Progress {
        match self {
            BatchOutcome::Progress(p) | BatchOutcome::Completed(p) | BatchOutcome::Cancelled(p) => p,
            BatchOutcome::Fatal { progress, .. } => progress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchOutcome::Completed(_) | BatchOutcome::Cancelled(_))
    }

    /// Remediation hint for a fatal outcome.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            BatchOutcome::Fatal { error, .. } => error.remediation_hint(),
            _ => None,
        }
    }
}

pub struct JobRunner<E: Engine> {
    engine: E,
    repo: JobRepository<E::Job>,
    retention: RetentionConfig,
}

impl<E: Engine> JobRunner<E> {
    pub fn new(
        engine: E,
        store: Arc<dyn KeyValueStore>,
        keys: JobKeys,
        retention: RetentionConfig,
    ) -> Self {
        Self {
            engine,
            repo: JobRepository::new(store, keys),
            retention,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn active_ttl(&self) -> Duration {
        Duration::from_secs(self.retention.active_job_secs)
    }

    fn completed_ttl(&self) -> Duration {
        Duration::from_secs(self.retention.completed_job_secs)
    }

    fn progress_ttl(&self) -> Duration {
        Duration::from_secs(self.retention.progress_secs)
    }

    fn persist(&self, job: &E::Job, progress: &Progress) -> Result<()> {
        let ttl = if job.is_terminal() {
            self.completed_ttl()
        } else {
            self.active_ttl()
        };
        self.repo.replace(job, ttl)?;
        self.repo.set_progress(progress, self.progress_ttl())?;
        Ok(())
    }

    /// Creates a job, replacing whatever job of this kind was stored.
    pub fn create_job(&self, request: E::Request) -> Result<Progress> {
        let job = self.engine.create_job(request)?;
        let progress = job.progress();
        self.persist(&job, &progress)?;
        info!(
            kind = self.engine.kind(),
            job_id = %job.job_id(),
            "Job created"
        );
        Ok(progress)
    }

    /// Runs one batch of the stored job.
    ///
    /// `Err` means the job could not be loaded or saved. Engine failures come
    /// back as [`BatchOutcome::Fatal`] after the job has been written back.
    pub fn step_once(&self, job_id: &str) -> Result<BatchOutcome> {
        let Some(mut job) = self.repo.current()?.filter(|j| j.job_id() == job_id) else {
            return match self.repo.progress()? {
                Some(progress) if progress.job_id == job_id && progress.progress >= 100 => {
                    Ok(BatchOutcome::from_progress(progress))
                }
                _ => Err(EngineError::NotFound(format!(
                    "{} job '{}'",
                    self.engine.kind(),
                    job_id
                ))),
            };
        };

        match self.engine.process_batch(&mut job) {
            Ok(report) => {
                self.persist(&job, &report.progress)?;
                Ok(BatchOutcome::from_progress(report.progress))
            }
            Err(error) => {
                warn!(
                    kind = self.engine.kind(),
                    job_id = %job_id,
                    retryable = error.is_retryable(),
                    "Batch failed: {}",
                    error
                );
                job.record_error(error.to_string());
                let progress = job.progress();
                self.persist(&job, &progress)?;
                Ok(BatchOutcome::Fatal { progress, error })
            }
        }
    }

    /// Flags the job for cancellation. Cleanup happens on the next batch.
    pub fn cancel(&self, job_id: &str) -> Result<Progress> {
        let mut job = self
            .repo
            .current()?
            .filter(|j| j.job_id() == job_id)
            .ok_or_else(|| {
                EngineError::NotFound(format!("{} job '{}'", self.engine.kind(), job_id))
            })?;
        if !job.is_terminal() {
            job.request_cancel(Utc::now());
            self.repo.replace(&job, self.active_ttl())?;
            info!(kind = self.engine.kind(), job_id = %job_id, "Cancellation requested");
        }
        Ok(job.progress())
    }

    pub fn progress(&self) -> Result<Option<Progress>> {
        Ok(self.repo.progress()?)
    }

    pub fn current_job_id(&self) -> Result<Option<String>> {
        Ok(self.repo.current()?.map(|job| job.job_id().to_string()))
    }

    /// Creates a job and steps it until it finishes.
    ///
    /// Retryable failures are logged and the batch is tried again; anything
    /// else ends the run.
    pub fn run_to_completion(&self, request: E::Request, max_loops: usize) -> Result<Progress> {
        let created = self.create_job(request)?;
        for _ in 0..max_loops {
            match self.step_once(&created.job_id)? {
                BatchOutcome::Progress(_) => {}
                BatchOutcome::Completed(progress) | BatchOutcome::Cancelled(progress) => {
                    return Ok(progress)
                }
                BatchOutcome::Fatal { error, .. } if error.is_retryable() => {
                    warn!("Retrying after: {}", error);
                }
                BatchOutcome::Fatal { error, .. } => return Err(error),
            }
        }
        Err(EngineError::Stalled(max_loops))
    }
}
