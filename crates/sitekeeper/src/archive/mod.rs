//! Archive codec.
//!
//! An archive is a zip container holding a JSON metadata entry, an optional
//! statement log and the selected site files at their site-relative paths.
//! The writer is opened and closed once per batch; every close leaves a
//! complete, reopenable container behind.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;
use crate::sanitize::{sanitize_filename, slugify};

pub mod catalog;
pub mod range;
pub mod reader;
pub mod writer;

pub use catalog::{ArchiveCatalog, ArchiveInfo, ArchiveSummary};
pub use reader::{extract_subset, list_entries, read_metadata, ExtractReport};
pub use writer::{staging_path, AddOutcome, ArchiveWriter};

/// Entry holding [`ArchiveMetadata`] as JSON.
pub const METADATA_ENTRY: &str = "metadata.json";
/// Entry holding the statement log, present iff data was included.
pub const DATA_ENTRY: &str = "data.sql";
/// Root-level names that are never restored as site files.
pub const RESERVED_ENTRIES: [&str; 2] = [METADATA_ENTRY, DATA_ENTRY];
pub const ARCHIVE_EXTENSION: &str = "sitepack";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// Unix timestamp (seconds).
    pub created: i64,
    pub origin: String,
    /// Snapshot of the options the backup was created with.
    pub options: serde_json::Value,
}

pub fn is_reserved_entry(name: &str) -> bool {
    RESERVED_ENTRIES.contains(&name)
}

/// `<slug>_<YYYY-MM-DD_HH-MM-SS>_<NNN>.sitepack`, prefixed with `auto_` for
/// scheduled runs.
pub fn archive_file_name<Tz>(
    site_name: &str,
    created: DateTime<Tz>,
    scheduled: bool,
    suffix: u16,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}{}_{}_{:03}.{}",
        if scheduled { "auto_" } else { "" },
        slugify(site_name),
        created.format("%Y-%m-%d_%H-%M-%S"),
        suffix % 1000,
        ARCHIVE_EXTENSION
    )
}

/// Explicit file name chosen by the caller, cleaned to a single path
/// component with the archive extension.
pub fn explicit_file_name(requested: &str) -> Option<String> {
    let name = sanitize_filename(requested)?;
    let suffix = format!(".{}", ARCHIVE_EXTENSION);
    if name.ends_with(&suffix) {
        Some(name)
    } else {
        Some(format!("{}{}", name, suffix))
    }
}

/// Three random digits for archive names.
pub fn random_suffix() -> u16 {
    (uuid::Uuid::new_v4().as_u128() % 1000) as u16
}

/// Resolves `name` inside `archive_dir` and refuses anything that lands
/// outside it once symlinks and `..` are resolved.
pub fn resolve_in_archive_dir(archive_dir: &Path, name: &str) -> Result<PathBuf, ArchiveError> {
    let candidate = archive_dir.join(name);
    let dir = archive_dir
        .canonicalize()
        .map_err(|_| ArchiveError::OutsideArchiveDirectory(candidate.clone()))?;
    let resolved = candidate
        .canonicalize()
        .map_err(|_| ArchiveError::InvalidArchive(candidate.clone()))?;

    if resolved.parent() != Some(dir.as_path()) {
        return Err(ArchiveError::OutsideArchiveDirectory(candidate));
    }
    if !resolved.is_file() {
        return Err(ArchiveError::InvalidArchive(candidate));
    }
    Ok(resolved)
}
