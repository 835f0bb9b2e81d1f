//! Backup engine.
//!
//! A backup runs through `data -> uploads -> themes -> plugins ->
//! archive_write -> finalize`, skipping whatever the options leave out. The
//! data step streams tables into a temporary statement log, the category
//! steps only account for files that were enumerated at creation, and
//! `archive_write` does the actual I/O in bounded slices, closing the archive
//! after every batch.

use std::fs::OpenOptions;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use super::disk::{format_bytes, DiskSpacePolicy, FsSpaceProbe, SpaceProbe};
use super::progress::{backup_percent, fraction, Progress, ProgressStatus};
use super::step::{enabled_steps, first_enabled, next_enabled, step_index, BackupStep};
use super::{BatchReport, Engine, JobDocument};
use crate::archive::{
    archive_file_name, explicit_file_name, random_suffix, staging_path, ArchiveMetadata,
    ArchiveWriter, DATA_ENTRY,
};
use crate::config::{Config, FileCategory};
use crate::db::{dump, TabularSource};
use crate::error::{EngineError, Result, ScanError};
use crate::sanitize::redact_path;
use crate::scanner::{relative_name, DirectoryScanner, FileEntry};

/// Files above this size are logged when they are added.
const LARGE_FILE_BYTES: u64 = 10 * 1024 * 1024;
/// Attempts per file before it is skipped.
const FILE_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// What the user asked to include.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupOptions {
    #[serde(default)]
    pub data: bool,
    #[serde(default)]
    pub uploads: bool,
    #[serde(default)]
    pub themes: bool,
    #[serde(default)]
    pub plugins: bool,
    /// Explicit archive file name; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Scheduled runs get an `auto_` prefix.
    #[serde(default)]
    pub scheduled: bool,
}

impl Default for BackupOptions {
    /// A full backup.
    fn default() -> Self {
        Self {
            data: true,
            uploads: true,
            themes: true,
            plugins: true,
            filename: None,
            scheduled: false,
        }
    }
}

impl BackupOptions {
    pub fn has_content(&self) -> bool {
        self.data || self.uploads || self.themes || self.plugins
    }

    pub fn includes(&self, category: FileCategory) -> bool {
        match category {
            FileCategory::Uploads => self.uploads,
            FileCategory::Themes => self.themes,
            FileCategory::Plugins => self.plugins,
        }
    }

    /// Falls back to a data-only backup when nothing was selected.
    pub fn normalized(mut self) -> Self {
        if !self.has_content() {
            warn!("No backup content selected, defaulting to data only");
            self.data = true;
        }
        self
    }
}

/// Open table in the data step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCursor {
    pub name: String,
    /// Rows already written.
    pub offset: u64,
    /// Row count captured when the table was opened.
    pub row_count: u64,
}

/// Files of one category, enumerated once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryQueue {
    pub category: FileCategory,
    pub files: Vec<FileEntry>,
    /// Files accounted for by the category step.
    pub processed: usize,
}

impl CategoryQueue {
    pub fn remaining(&self) -> usize {
        self.files.len().saturating_sub(self.processed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupJob {
    pub job_id: String,
    pub step: BackupStep,
    pub status: String,
    pub progress: u8,
    pub options: BackupOptions,
    pub created_at: DateTime<Utc>,

    pub archive_name: String,
    pub archive_path: PathBuf,
    /// Temporary statement log, present when data is included.
    pub data_file: Option<PathBuf>,
    /// Committed length of the statement log. Appends start here, so a
    /// replayed batch overwrites its own earlier output.
    pub data_bytes: u64,

    pub tables: Vec<String>,
    pub tables_processed: usize,
    pub current_table: Option<TableCursor>,
    pub rows_written: u64,

    pub categories: Vec<CategoryQueue>,

    /// All category files plus one unit for the statement log.
    pub total_files_to_zip: usize,
    pub files_zipped: usize,
    pub files_skipped: usize,
    /// Metadata (and statement log) are in the archive.
    pub archive_started: bool,
    pub archive_errors: u32,

    pub cancelled_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl BackupJob {
    fn data_units(&self) -> usize {
        usize::from(self.options.data)
    }

    fn advance(&mut self) {
        let next = next_enabled(self.step, &self.options);
        debug!(from = self.step.as_str(), to = next.as_str(), "Advancing step");
        self.step = next;
    }

    fn step_fraction(&self) -> f64 {
        match self.step {
            BackupStep::Data => {
                if self.tables.is_empty() {
                    return 1.0;
                }
                let partial = self
                    .current_table
                    .as_ref()
                    .map(|t| fraction(t.offset as usize, t.row_count.max(1) as usize))
                    .unwrap_or(0.0);
                (self.tables_processed as f64 + partial) / self.tables.len() as f64
            }
            BackupStep::Uploads | BackupStep::Themes | BackupStep::Plugins => self
                .step
                .category()
                .and_then(|c| self.categories.iter().find(|q| q.category == c))
                .map(|q| fraction(q.processed, q.files.len()))
                .unwrap_or(1.0),
            BackupStep::ArchiveWrite => fraction(self.files_zipped, self.total_files_to_zip),
            BackupStep::Finalize | BackupStep::Completed | BackupStep::Cancelled => 1.0,
        }
    }

    fn refresh_progress(&mut self) {
        self.progress = if self.step.is_terminal() {
            100
        } else {
            backup_percent(
                step_index(self.step, &self.options),
                enabled_steps(&self.options).len(),
                self.step_fraction(),
            )
        };
    }
}

impl JobDocument for BackupJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn progress(&self) -> Progress {
        let status = match self.step {
            BackupStep::Completed => ProgressStatus::Completed,
            BackupStep::Cancelled => ProgressStatus::Cancelled,
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

pub struct BackupEngine {
    config: Arc<Config>,
    source: Arc<dyn TabularSource + Send + Sync>,
    disk: DiskSpacePolicy,
    retry_backoff: Duration,
}

impl BackupEngine {
    pub fn new(config: Arc<Config>, source: Arc<dyn TabularSource + Send + Sync>) -> Self {
        let disk = DiskSpacePolicy::new(config.disk_space.clone(), Arc::new(FsSpaceProbe));
        Self {
            config,
            source,
            disk,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_space_probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.disk = DiskSpacePolicy::new(self.config.disk_space.clone(), probe);
        self
    }

    /// Pause between attempts at adding a file.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn archive_name(&self, options: &BackupOptions, created: DateTime<Utc>) -> Result<String> {
        match &options.filename {
            Some(requested) => explicit_file_name(requested).ok_or_else(|| {
                EngineError::InvalidInput(format!("'{}' is not a usable file name", requested))
            }),
            None => Ok(archive_file_name(
                &self.config.site_name,
                created.with_timezone(&Local),
                options.scheduled,
                random_suffix(),
            )),
        }
    }

    fn scan_category(&self, category: FileCategory) -> Result<Vec<FileEntry>> {
        let config = &self.config;
        let dir = config.category_dir(category);
        let scanner = DirectoryScanner::new(&dir)
            .exclude_dir(&config.archive_directory)
            .exclude_dir(&config.work_directory)
            .exclude_patterns(&config.site_root, &config.excluded_paths);

        let files = match scanner.scan() {
            Ok(files) => files,
            Err(ScanError::RootMissing(_)) => {
                warn!(
                    category = category.as_str(),
                    "Category directory {} does not exist, nothing to back up",
                    dir.display()
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(files
            .into_iter()
            .map(|entry| {
                let relative = relative_name(&config.site_root, &entry.source)
                    .unwrap_or_else(|| format!("{}/{}", category.as_str(), entry.relative));
                FileEntry {
                    source: entry.source,
                    relative,
                }
            })
            .collect())
    }

    fn metadata(&self, job: &BackupJob) -> ArchiveMetadata {
        ArchiveMetadata {
            created: job.created_at.timestamp(),
            origin: self.config.origin.clone(),
            options: serde_json::to_value(&job.options).unwrap_or_default(),
        }
    }

    // ─── Steps ───────────────────────────────────────────────────────────

    fn step_data(&self, job: &mut BackupJob) -> Result<()> {
        let batch = self.config.batch.rows_per_fetch.max(1);

        let mut block = String::new();
        let mut cursor = match job.current_table.clone() {
            Some(cursor) => cursor,
            None => {
                let Some(name) = job.tables.get(job.tables_processed).cloned() else {
                    let objects = dump::object_block(&self.source.schema_objects()?);
                    if !objects.is_empty() {
                        job.data_bytes = self.append_data(job, &objects)?;
                    }
                    job.status = "Database export complete".to_string();
                    job.advance();
                    return Ok(());
                };
                let create_sql = self.source.schema_statement(&name)?;
                let row_count = self.source.row_count(&name)?;
                debug!(table = %name, rows = row_count, "Opening table");
                block.push_str(&dump::schema_block(&name, &create_sql));
                TableCursor {
                    name,
                    offset: 0,
                    row_count,
                }
            }
        };

        let rows = self.source.fetch_rows(&cursor.name, cursor.offset, batch)?;
        block.push_str(&dump::insert_block(&cursor.name, &rows));

        let fetched = rows.len();
        let table_done = fetched < batch || cursor.offset + fetched as u64 >= cursor.row_count;
        if table_done && job.tables_processed + 1 >= job.tables.len() {
            block.push_str(&dump::object_block(&self.source.schema_objects()?));
        }
        job.data_bytes = self.append_data(job, &block)?;

        cursor.offset += fetched as u64;
        job.rows_written += fetched as u64;

        if table_done {
            info!(
                table = %cursor.name,
                rows = cursor.offset,
                "Exported table {}/{}",
                job.tables_processed + 1,
                job.tables.len()
            );
            job.status = format!("Exported table {} ({} rows)", cursor.name, cursor.offset);
            job.current_table = None;
            job.tables_processed += 1;
            if job.tables_processed >= job.tables.len() {
                job.advance();
            }
        } else {
            job.status = format!(
                "Exporting table {} ({}/{} rows)",
                cursor.name, cursor.offset, cursor.row_count
            );
            job.current_table = Some(cursor);
        }
        Ok(())
    }

    /// Writes `block` at the committed end of the statement log and returns
    /// the new committed length.
    fn append_data(&self, job: &BackupJob, block: &str) -> Result<u64> {
        let path = job
            .data_file
            .as_ref()
            .ok_or_else(|| EngineError::InvalidInput("job has no data file".to_string()))?;
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => EngineError::NotFound(format!(
                    "temporary data file '{}'",
                    path.display()
                )),
                _ => EngineError::io(path, e),
            })?;

        let len = file.metadata().map_err(|e| EngineError::io(path, e))?.len();
        if len < job.data_bytes {
            return Err(EngineError::io(
                path,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("data file holds {} bytes, expected {}", len, job.data_bytes),
                ),
            ));
        }
        file.set_len(job.data_bytes)
            .and_then(|_| file.seek(SeekFrom::Start(job.data_bytes)))
            .and_then(|_| file.write_all(block.as_bytes()))
            .and_then(|_| file.flush())
            .map_err(|e| EngineError::io(path, e))?;
        Ok(job.data_bytes + block.len() as u64)
    }

    fn step_category(&self, job: &mut BackupJob) {
        let batch = self.config.batch.category_files.max(1);
        let Some(category) = job.step.category() else {
            job.advance();
            return;
        };

        let done = match job.categories.iter_mut().find(|q| q.category == category) {
            Some(queue) => {
                let take = batch.min(queue.remaining());
                queue.processed += take;
                job.status = format!(
                    "Scheduled {}/{} {} files",
                    queue.processed,
                    queue.files.len(),
                    category.as_str()
                );
                queue.remaining() == 0
            }
            None => true,
        };
        if done {
            job.advance();
        }
    }

    fn step_archive_write(&self, job: &mut BackupJob) -> Result<usize> {
        let configured = if job.archive_errors > 0 {
            self.config.batch.archive_files_after_error
        } else {
            self.config.batch.archive_files
        };
        let batch = self
            .disk
            .adjust_batch(&self.config.archive_directory, configured)?;
        debug!(batch = batch, "Archive batch size");

        let mut writer = match ArchiveWriter::open(&job.archive_path) {
            Ok(writer) => writer,
            Err(e) => {
                job.archive_errors += 1;
                return Err(e.into());
            }
        };

        let mut zipped = job.files_zipped;
        let mut skipped = 0;

        if !job.archive_started {
            if let Err(e) = writer.add_metadata(&self.metadata(job)) {
                job.archive_errors += 1;
                return Err(e.into());
            }
            if job.options.data {
                match job.data_file.as_ref().filter(|p| p.is_file()) {
                    Some(data_file) => {
                        if let Err(e) = writer.add_file(data_file, DATA_ENTRY) {
                            job.archive_errors += 1;
                            return Err(e.into());
                        }
                    }
                    None => {
                        warn!("Temporary data file is missing, archive will hold no data");
                        skipped += 1;
                    }
                }
                zipped += 1;
            }
        }

        let offset = zipped.saturating_sub(job.data_units());
        let slice: Vec<&FileEntry> = job
            .categories
            .iter()
            .flat_map(|q| q.files.iter())
            .skip(offset)
            .take(batch)
            .collect();
        for entry in slice {
            if !self.add_with_retry(&mut writer, entry) {
                skipped += 1;
            }
            zipped += 1;
        }

        if let Err(e) = writer.close() {
            job.archive_errors += 1;
            return Err(e.into());
        }

        job.archive_started = true;
        job.files_zipped = zipped;
        job.files_skipped += skipped;
        job.status = format!(
            "Archived {}/{} files",
            job.files_zipped, job.total_files_to_zip
        );
        if job.files_zipped >= job.total_files_to_zip {
            job.advance();
        }
        Ok(skipped)
    }

    /// Adds one file, retrying once. Returns `false` when the file was skipped.
    fn add_with_retry(&self, writer: &mut ArchiveWriter, entry: &FileEntry) -> bool {
        let size = match entry.source.metadata() {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => {
                warn!(
                    file = %entry.relative,
                    "Skipping file that no longer exists or is not readable"
                );
                return false;
            }
        };
        if size > LARGE_FILE_BYTES {
            info!(
                file = %entry.relative,
                "Adding large file ({})",
                format_bytes(size)
            );
        }

        for attempt in 1..=FILE_ATTEMPTS {
            match writer.add_file(&entry.source, &entry.relative) {
                Ok(_) => return true,
                Err(e) if attempt < FILE_ATTEMPTS => {
                    debug!(file = %entry.relative, attempt, "Add failed, retrying: {}", e);
                    std::thread::sleep(self.retry_backoff);
                }
                Err(e) => {
                    warn!(
                        file = %entry.relative,
                        "Skipping file after {} attempts: {}", FILE_ATTEMPTS, e
                    );
                }
            }
        }
        false
    }

    fn step_finalize(&self, job: &mut BackupJob) -> Result<()> {
        let staging = staging_path(&job.archive_path);
        for path in job.data_file.iter().chain(std::iter::once(&staging)) {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Could not remove temporary file {}: {}", redact_path(path), e);
                }
            }
        }

        let size = match job.archive_path.metadata() {
            Ok(metadata) => metadata.len(),
            Err(_) => {
                return Err(EngineError::NotFound(format!(
                    "archive '{}' is missing",
                    job.archive_name
                )))
            }
        };

        info!(
            archive = %job.archive_name,
            size = size,
            files = job.files_zipped,
            skipped = job.files_skipped,
            "Backup complete ({})",
            format_bytes(size)
        );
        job.status = format!(
            "Backup complete: {} ({})",
            job.archive_name,
            format_bytes(size)
        );
        job.step = BackupStep::Completed;
        Ok(())
    }

    fn cancel(&self, job: &mut BackupJob) {
        let staging = staging_path(&job.archive_path);
        let leftovers = [Some(&job.archive_path), Some(&staging), job.data_file.as_ref()];
        for path in leftovers.into_iter().flatten() {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Removed {}", redact_path(path)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove {}: {}", redact_path(path), e),
            }
        }
        info!("Backup cancelled");
        job.status = "Backup cancelled".to_string();
        job.current_table = None;
        job.step = BackupStep::Cancelled;
    }
}

impl Engine for BackupEngine {
    type Job = BackupJob;
    type Request = BackupOptions;

    fn kind(&self) -> &'static str {
        "backup"
    }

    fn create_job(&self, options: BackupOptions) -> Result<BackupJob> {
        let options = options.normalized();
        let config = &self.config;

        for dir in [&config.archive_directory, &config.work_directory] {
            std::fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))?;
        }

        let created_at = Utc::now();
        let archive_name = self.archive_name(&options, created_at)?;
        let archive_path = config.archive_directory.join(&archive_name);
        if archive_path.exists() {
            return Err(EngineError::InvalidInput(format!(
                "archive '{}' already exists",
                archive_name
            )));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let _span = info_span!("create_backup", job_id = %job_id, archive = %archive_name).entered();

        let tables = if options.data {
            let tables = self.source.list_tables()?;
            info!("Found {} tables", tables.len());
            tables
        } else {
            Vec::new()
        };

        let mut categories = Vec::new();
        for category in FileCategory::ALL {
            if !options.includes(category) {
                continue;
            }
            let files = self.scan_category(category)?;
            info!(
                category = category.as_str(),
                "Found {} files",
                files.len()
            );
            categories.push(CategoryQueue {
                category,
                files,
                processed: 0,
            });
        }

        let (data_file, data_bytes) = if options.data {
            let path = config.work_directory.join(format!("{}.data.sql", job_id));
            let header = dump::header(&config.origin, created_at);
            std::fs::write(&path, header.as_bytes()).map_err(|e| EngineError::io(&path, e))?;
            (Some(path), header.len() as u64)
        } else {
            (None, 0)
        };

        let total_files_to_zip = categories.iter().map(|q| q.files.len()).sum::<usize>()
            + usize::from(options.data);
        let step = first_enabled(&options);
        info!(
            first_step = step.as_str(),
            total = total_files_to_zip,
            "Backup job created"
        );

        Ok(BackupJob {
            job_id,
            step,
            status: "Backup job created".to_string(),
            progress: 0,
            options,
            created_at,
            archive_name,
            archive_path,
            data_file,
            data_bytes,
            tables,
            tables_processed: 0,
            current_table: None,
            rows_written: 0,
            categories,
            total_files_to_zip,
            files_zipped: 0,
            files_skipped: 0,
            archive_started: false,
            archive_errors: 0,
            cancelled_at: None,
            last_error: None,
        })
    }

    fn process_batch(&self, job: &mut BackupJob) -> Result<BatchReport> {
        let _batch_span =
            info_span!("backup_batch", job_id = %job.job_id, step = job.step.as_str()).entered();

        if job.step.is_terminal() {
            return Ok(BatchReport {
                progress: job.progress(),
                skipped: 0,
            });
        }
        if job.cancelled_at.is_some() {
            self.cancel(job);
            job.refresh_progress();
            return Ok(BatchReport {
                progress: job.progress(),
                skipped: 0,
            });
        }

        let skipped = match job.step {
            BackupStep::Data => {
                let _step = info_span!("data").entered();
                self.step_data(job)?;
                0
            }
            BackupStep::Uploads | BackupStep::Themes | BackupStep::Plugins => {
                let _step = info_span!("category").entered();
                self.step_category(job);
                0
            }
            BackupStep::ArchiveWrite => {
                let _step =
                    info_span!("archive_write", archive = %redact_path(&job.archive_path))
                        .entered();
                self.step_archive_write(job)?
            }
            BackupStep::Finalize => {
                let _step = info_span!("finalize").entered();
                self.step_finalize(job)?;
                0
            }
            BackupStep::Completed | BackupStep::Cancelled => 0,
        };

        job.last_error = None;
        job.refresh_progress();
        Ok(BatchReport {
            progress: job.progress(),
            skipped,
        })
    }
}
