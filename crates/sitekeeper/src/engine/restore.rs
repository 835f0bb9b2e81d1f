//! Restore engine: `extracting -> database -> files -> finalize`.
//!
//! Entries are extracted into a per-job scratch directory in index slices,
//! the statement log is replayed in one call, and the remaining files are
//! copied onto the site root in slices.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use super::hooks::{NoopHook, PostRestoreHook};
use super::progress::{fraction, restore_percent, Progress, ProgressStatus};
use super::step::RestoreStep;
use super::{BatchReport, Engine, JobDocument};
use crate::archive::{
    extract_subset, is_reserved_entry, list_entries, resolve_in_archive_dir, DATA_ENTRY,
};
use crate::config::Config;
use crate::db::{load, StatementSink};
use crate::error::{EngineError, Result};
use crate::sanitize::redact_path;
use crate::scanner::DirectoryScanner;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreJob {
    pub job_id: String,
    pub step: RestoreStep,
    pub status: String,
    pub progress: u8,
    pub created_at: DateTime<Utc>,

    pub archive_name: String,
    pub archive_path: PathBuf,
    pub scratch_dir: PathBuf,

    /// Every file entry of the archive, in container order.
    pub entries: Vec<String>,
    pub total_files: usize,
    pub files_processed: usize,
    pub entries_skipped: usize,

    pub statements_applied: usize,

    /// Scratch-relative paths found after the database step.
    pub restore_files: Vec<String>,
    pub restore_processed: usize,
    pub restore_failed: usize,

    pub cancelled_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl RestoreJob {
    fn refresh_progress(&mut self) {
        let fraction = match self.step {
            RestoreStep::Extracting => fraction(self.files_processed, self.total_files),
            RestoreStep::Files => fraction(self.restore_processed, self.restore_files.len()),
            _ => 0.0,
        };
        self.progress = restore_percent(self.step, fraction);
    }
}

impl JobDocument for RestoreJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn progress(&self) -> Progress {
        let status = match self.step {
            RestoreStep::Completed => ProgressStatus::Completed,
            RestoreStep::Cancelled => ProgressStatus::Cancelled,
            _ if self.last_error.is_some() => ProgressStatus::Failed,
            _ => ProgressStatus::Running,
        };
        Progress::new(&self.job_id, self.progress, &self.status, status)
    }

    fn is_terminal(&self) -> bool {
        self.step.is_terminal()
    }

    fn request_cancel(&mut self, at: DateTime<Utc>) {
        if self.cancelled_at.is_none() {
            self.cancelled_at = Some(at);
        }
    }

    fn record_error(&mut self, message: String) {
        self.status = format!("Error: {}", message);
        self.last_error = Some(message);
    }
}

pub struct RestoreEngine {
    config: Arc<Config>,
    sink: Arc<dyn StatementSink + Send + Sync>,
    hook: Arc<dyn PostRestoreHook>,
}

impl RestoreEngine {
    pub fn new(config: Arc<Config>, sink: Arc<dyn StatementSink + Send + Sync>) -> Self {
        Self {
            config,
            sink,
            hook: Arc::new(NoopHook),
        }
    }

    /// Runs `hook` once the restored files are in place.
    pub fn with_hook(mut self, hook: Arc<dyn PostRestoreHook>) -> Self {
        self.hook = hook;
        self
    }

    fn step_extracting(&self, job: &mut RestoreJob) -> Result<usize> {
        std::fs::create_dir_all(&job.scratch_dir)
            .map_err(|e| EngineError::io(&job.scratch_dir, e))?;

        let batch = self.config.batch.extract_entries.max(1);
        let end = (job.files_processed + batch).min(job.entries.len());
        let names = &job.entries[job.files_processed.min(end)..end];
        let report = extract_subset(&job.archive_path, names, &job.scratch_dir)?;
        debug!(extracted = report.extracted, skipped = report.skipped, "Extracted batch");

        job.files_processed = end;
        job.entries_skipped += report.skipped;
        job.status = format!("Extracted {}/{} files", job.files_processed, job.total_files);
        if job.files_processed >= job.total_files {
            job.step = job.step.next();
        }
        Ok(report.skipped)
    }

    /// Replays the whole statement log in one call. Running it twice runs
    /// every statement twice.
    fn step_database(&self, job: &mut RestoreJob) -> Result<()> {
        let data_file = job.scratch_dir.join(DATA_ENTRY);
        if data_file.is_file() {
            info!("Importing database");
            let report = load::apply_file(self.sink.as_ref(), &data_file)?;
            job.statements_applied = report.statements;
        } else {
            info!("Archive has no database export, skipping import");
        }

        let files = DirectoryScanner::new(&job.scratch_dir).scan()?;
        job.restore_files = files.into_iter().map(|f| f.relative).collect();
        job.restore_processed = 0;

        if job.restore_files.iter().all(|f| is_reserved_entry(f)) {
            job.status = "No files to restore".to_string();
            job.step = RestoreStep::Finalize;
        } else {
            job.status = format!(
                "Database restored ({} statements)",
                job.statements_applied
            );
            job.step = job.step.next();
        }
        Ok(())
    }

    fn step_files(&self, job: &mut RestoreJob) -> usize {
        let batch = self.config.batch.restore_files.max(1);
        let end = (job.restore_processed + batch).min(job.restore_files.len());
        let site_root = &self.config.site_root;

        let mut failed = 0;
        for relative in &job.restore_files[job.restore_processed.min(end)..end] {
            if is_reserved_entry(relative) {
                continue;
            }
            if let Err(e) = copy_into(&job.scratch_dir, site_root, relative) {
                warn!(file = %relative, "Could not restore file: {}", e);
                failed += 1;
            }
        }

        job.restore_processed = end;
        job.restore_failed += failed;
        job.status = format!(
            "Restored {}/{} files",
            job.restore_processed,
            job.restore_files.len()
        );
        if job.restore_processed >= job.restore_files.len() {
            job.step = job.step.next();
        }
        failed
    }

    fn step_finalize(&self, job: &mut RestoreJob) {
        remove_scratch(&job.scratch_dir);
        if let Err(e) = self.hook.after_restore(&self.config.site_root) {
            warn!("Post-restore hook failed: {}", e);
        }
        info!(
            archive = %job.archive_name,
            files = job.restore_files.len(),
            failed = job.restore_failed,
            statements = job.statements_applied,
            "Restore complete"
        );
        job.status = format!("Restore of {} complete", job.archive_name);
        job.step = RestoreStep::Completed;
    }
}

fn copy_into(scratch: &Path, site_root: &Path, relative: &str) -> std::io::Result<u64> {
    let target = site_root.join(relative);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(scratch.join(relative), target)
}

fn remove_scratch(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!("Removed scratch directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove scratch directory: {}", e),
    }
}

impl Engine for RestoreEngine {
    type Job = RestoreJob;
    type Request = String;

    fn kind(&self) -> &'static str {
        "restore"
    }

    fn create_job(&self, archive_name: String) -> Result<RestoreJob> {
        let archive_dir = &self.config.archive_directory;
        if !archive_dir.join(&archive_name).exists() {
            return Err(EngineError::NotFound(format!("archive '{}'", archive_name)));
        }
        let archive_path = resolve_in_archive_dir(archive_dir, &archive_name)?;
        let entries = list_entries(&archive_path)?;

        let job_id = uuid::Uuid::new_v4().to_string();
        let _span = info_span!("create_restore", job_id = %job_id, archive = %archive_name).entered();

        let scratch_dir = self
            .config
            .work_directory
            .join(format!("restore-{}", job_id));
        std::fs::create_dir_all(&scratch_dir).map_err(|e| EngineError::io(&scratch_dir, e))?;

        info!("Restore job created with {} entries", entries.len());
        Ok(RestoreJob {
            job_id,
            step: RestoreStep::Extracting,
            status: "Restore job created".to_string(),
            progress: 0,
            created_at: Utc::now(),
            archive_name,
            archive_path,
            scratch_dir,
            total_files: entries.len(),
            entries,
            files_processed: 0,
            entries_skipped: 0,
            statements_applied: 0,
            restore_files: Vec::new(),
            restore_processed: 0,
            restore_failed: 0,
            cancelled_at: None,
            last_error: None,
        })
    }

    fn process_batch(&self, job: &mut RestoreJob) -> Result<BatchReport> {
        let _batch_span =
            info_span!("restore_batch", job_id = %job.job_id, step = job.step.as_str()).entered();

        if job.step.is_terminal() {
            return Ok(BatchReport {
                progress: job.progress(),
                skipped: 0,
            });
        }
        if job.cancelled_at.is_some() {
            remove_scratch(&job.scratch_dir);
            info!("Restore cancelled");
            job.status = "Restore cancelled".to_string();
            job.step = RestoreStep::Cancelled;
            job.refresh_progress();
            return Ok(BatchReport {
                progress: job.progress(),
                skipped: 0,
            });
        }

        let skipped = match job.step {
            RestoreStep::Extracting => {
                let _step =
                    info_span!("extracting", scratch = %redact_path(&job.scratch_dir)).entered();
                self.step_extracting(job)?
            }
            RestoreStep::Database => {
                let _step = info_span!("database").entered();
                self.step_database(job)?;
                0
            }
            RestoreStep::Files => {
                let _step = info_span!("files").entered();
                self.step_files(job)
            }
            RestoreStep::Finalize => {
                let _step = info_span!("finalize").entered();
                self.step_finalize(job);
                0
            }
            RestoreStep::Completed | RestoreStep::Cancelled => 0,
        };

        job.last_error = None;
        job.refresh_progress();
        Ok(BatchReport {
            progress: job.progress(),
            skipped,
        })
    }
}
