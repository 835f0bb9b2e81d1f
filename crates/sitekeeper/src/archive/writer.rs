use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{ArchiveMetadata, METADATA_ENTRY};
use crate::error::ArchiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// An entry with this name was written by an earlier batch.
    AlreadyPresent,
}

/// Suffix of the staging copy a batch writes into.
pub const STAGING_SUFFIX: &str = "partial";

/// Sibling file a batch is written to before it replaces the archive.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(STAGING_SUFFIX);
    path.with_file_name(name)
}

/// Append-mode writer over a growing archive file.
///
/// Each open copies the archive to a staging file and appends there;
/// `close` renames the staging file over the archive. The archive on disk
/// is always the one left by the last successful close, whatever happens
/// to a batch in between.
pub struct ArchiveWriter {
    path: PathBuf,
    staging: PathBuf,
    zip: ZipWriter<File>,
    names: HashSet<String>,
    options: SimpleFileOptions,
}

impl ArchiveWriter {
    /// Creates the archive, or reopens it for appending when it already
    /// holds entries.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let open_err = |source: ZipError| ArchiveError::Open {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| open_err(e.into()))?;
        }

        let staging = staging_path(path);
        let existing = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        let (zip, names) = if existing {
            let names = {
                let archive = ZipArchive::new(File::open(path).map_err(|e| open_err(e.into()))?)
                    .map_err(open_err)?;
                archive.file_names().map(str::to_string).collect()
            };
            std::fs::copy(path, &staging).map_err(|e| open_err(e.into()))?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&staging)
                .map_err(|e| open_err(e.into()))?;
            (ZipWriter::new_append(file).map_err(open_err)?, names)
        } else {
            let file = File::create(&staging).map_err(|e| open_err(e.into()))?;
            (ZipWriter::new(file), HashSet::new())
        };

        Ok(Self {
            path: path.to_path_buf(),
            staging,
            zip,
            names,
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn entry_count(&self) -> usize {
        self.names.len()
    }

    pub fn add_metadata(&mut self, metadata: &ArchiveMetadata) -> Result<AddOutcome, ArchiveError> {
        let json = serde_json::to_vec_pretty(metadata).map_err(|e| self.write_err(
            METADATA_ENTRY,
            io::Error::new(io::ErrorKind::InvalidData, e).into(),
        ))?;
        self.add_stream(&json, METADATA_ENTRY)
    }

    pub fn add_stream(&mut self, bytes: &[u8], name: &str) -> Result<AddOutcome, ArchiveError> {
        if self.names.contains(name) {
            return Ok(AddOutcome::AlreadyPresent);
        }
        self.zip
            .start_file(name, self.options)
            .map_err(|e| self.write_err(name, e))?;
        if let Err(e) = self.zip.write_all(bytes) {
            let _ = self.zip.abort_file();
            return Err(self.write_err(name, e.into()));
        }
        self.names.insert(name.to_string());
        Ok(AddOutcome::Added)
    }

    /// Copies `source` into the archive as `name`. The source is opened before
    /// the entry is started, so a missing file leaves the archive untouched.
    pub fn add_file(&mut self, source: &Path, name: &str) -> Result<AddOutcome, ArchiveError> {
        if self.names.contains(name) {
            return Ok(AddOutcome::AlreadyPresent);
        }
        let mut file = File::open(source).map_err(|e| self.write_err(name, e.into()))?;
        let size = file
            .metadata()
            .map_err(|e| self.write_err(name, e.into()))?
            .len();

        let options = self.options.large_file(size > u32::MAX as u64);
        self.zip
            .start_file(name, options)
            .map_err(|e| self.write_err(name, e))?;
        if let Err(e) = io::copy(&mut file, &mut self.zip) {
            let _ = self.zip.abort_file();
            return Err(self.write_err(name, e.into()));
        }
        self.names.insert(name.to_string());
        Ok(AddOutcome::Added)
    }

    /// Writes the central directory, flushes the staging file and moves it
    /// over the archive.
    pub fn close(self) -> Result<(), ArchiveError> {
        let Self {
            path, staging, zip, ..
        } = self;
        let close_err = |source: ZipError| ArchiveError::Close {
            path: path.clone(),
            source,
        };
        let file = zip.finish().map_err(close_err)?;
        file.sync_all().map_err(|e| close_err(e.into()))?;
        drop(file);
        std::fs::rename(&staging, &path).map_err(|e| close_err(e.into()))
    }

    fn write_err(&self, entry: &str, source: ZipError) -> ArchiveError {
        ArchiveError::Write {
            path: self.path.clone(),
            entry: entry.to_string(),
            source,
        }
    }
}
