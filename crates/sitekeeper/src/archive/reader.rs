use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::warn;
use zip::result::ZipError;
use zip::ZipArchive;

use super::{ArchiveMetadata, METADATA_ENTRY};
use crate::error::ArchiveError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub extracted: usize,
    /// Names that were missing or would escape the destination.
    pub skipped: usize,
}

pub(crate) fn open(path: &Path) -> Result<ZipArchive<File>, ArchiveError> {
    let file = File::open(path).map_err(|e| ArchiveError::Read {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    ZipArchive::new(file).map_err(|e| match e {
        ZipError::Io(_) => ArchiveError::Read {
            path: path.to_path_buf(),
            source: e,
        },
        _ => ArchiveError::InvalidArchive(path.to_path_buf()),
    })
}

fn read_err(path: &Path, source: ZipError) -> ArchiveError {
    ArchiveError::Read {
        path: path.to_path_buf(),
        source,
    }
}

/// File entry names in container order. Directory entries are left out.
pub fn list_entries(path: &Path) -> Result<Vec<String>, ArchiveError> {
    let mut archive = open(path)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(|e| read_err(path, e))?;
        if !entry.is_dir() {
            names.push(entry.name().to_string());
        }
    }
    Ok(names)
}

/// Parsed metadata entry, or `None` when the archive has none.
pub fn read_metadata(path: &Path) -> Result<Option<ArchiveMetadata>, ArchiveError> {
    let mut archive = open(path)?;
    let mut entry = match archive.by_name(METADATA_ENTRY) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(read_err(path, e)),
    };
    let mut json = String::new();
    entry
        .read_to_string(&mut json)
        .map_err(|e| read_err(path, e.into()))?;
    match serde_json::from_str(&json) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) => {
            warn!("Unreadable metadata in {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Extracts exactly `names` into `dest`, creating parent directories.
///
/// Unknown names and names that would resolve outside `dest` are skipped
/// with a warning. Failing to write an extracted file is an error.
pub fn extract_subset(
    path: &Path,
    names: &[String],
    dest: &Path,
) -> Result<ExtractReport, ArchiveError> {
    let mut archive = open(path)?;
    let mut report = ExtractReport::default();

    for name in names {
        let mut entry = match archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                warn!("Entry '{}' not found in {}", name, path.display());
                report.skipped += 1;
                continue;
            }
            Err(e) => return Err(read_err(path, e)),
        };

        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe entry name '{}'", name);
            report.skipped += 1;
            continue;
        };
        let target = dest.join(relative);
        let write_err = |e: io::Error| ArchiveError::Write {
            path: target.clone(),
            entry: name.clone(),
            source: e.into(),
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(write_err)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut out = File::create(&target).map_err(write_err)?;
        io::copy(&mut entry, &mut out).map_err(write_err)?;
        report.extracted += 1;
    }

    Ok(report)
}
