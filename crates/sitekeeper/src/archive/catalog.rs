//! Listing and housekeeping of finished archives in the archive directory.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{reader, resolve_in_archive_dir, ArchiveMetadata, ARCHIVE_EXTENSION};
use crate::error::ArchiveError;

/// Smallest possible zip file: an empty end-of-central-directory record.
const MIN_ARCHIVE_BYTES: u64 = 22;
const SIGNATURE_WINDOW: usize = 1024;
const LOCAL_HEADER_SIGNATURE: &[u8] = b"PK\x03\x04";
const END_OF_DIRECTORY_SIGNATURE: &[u8] = b"PK\x05\x06";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveInfo {
    #[serde(flatten)]
    pub summary: ArchiveSummary,
    pub entries: usize,
    pub metadata: Option<ArchiveMetadata>,
}

pub struct ArchiveCatalog {
    dir: PathBuf,
}

impl ArchiveCatalog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Archives in the directory, newest first. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<ArchiveSummary>, ArchiveError> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ArchiveError::Read {
                    path: self.dir.clone(),
                    source: e.into(),
                })
            }
        };

        let mut archives = Vec::new();
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARCHIVE_EXTENSION) {
                continue;
            }
            match summarize(&path) {
                Some(summary) => archives.push(summary),
                None => log::debug!("Skipping unreadable archive {}", path.display()),
            }
        }
        archives.sort_by(|a, b| b.modified.cmp(&a.modified).then(a.name.cmp(&b.name)));
        Ok(archives)
    }

    /// Absolute path of `name`, guarded to the archive directory.
    pub fn path(&self, name: &str) -> Result<PathBuf, ArchiveError> {
        resolve_in_archive_dir(&self.dir, name)
    }

    pub fn info(&self, name: &str) -> Result<ArchiveInfo, ArchiveError> {
        let path = self.path(name)?;
        let summary = summarize(&path).ok_or_else(|| ArchiveError::InvalidArchive(path.clone()))?;
        let entries = reader::list_entries(&path)?.len();
        let metadata = reader::read_metadata(&path)?;
        Ok(ArchiveInfo {
            summary,
            entries,
            metadata,
        })
    }

    /// Cheap structural check: minimum size and a zip signature near the start.
    pub fn validate(&self, name: &str) -> Result<bool, ArchiveError> {
        let path = self.path(name)?;
        Ok(looks_like_archive(&path))
    }

    pub fn delete(&self, name: &str) -> Result<(), ArchiveError> {
        let path = self.path(name)?;
        std::fs::remove_file(&path).map_err(|e| ArchiveError::Write {
            path: path.clone(),
            entry: name.to_string(),
            source: e.into(),
        })?;
        log::info!("Deleted archive {}", name);
        Ok(())
    }
}

fn summarize(path: &Path) -> Option<ArchiveSummary> {
    let metadata = path.metadata().ok()?;
    if !metadata.is_file() {
        return None;
    }
    Some(ArchiveSummary {
        name: path.file_name()?.to_string_lossy().into_owned(),
        size: metadata.len(),
        modified: metadata.modified().ok()?.into(),
    })
}

pub fn looks_like_archive(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if metadata.len() < MIN_ARCHIVE_BYTES {
        return false;
    }
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut head = Vec::with_capacity(SIGNATURE_WINDOW);
    if file.take(SIGNATURE_WINDOW as u64).read_to_end(&mut head).is_err() {
        return false;
    }
    head.windows(4)
        .any(|w| w == LOCAL_HEADER_SIGNATURE || w == END_OF_DIRECTORY_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn make_archive(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut writer = ArchiveWriter::open(&path).unwrap();
        writer.add_stream(b"hello", "a.txt").unwrap();
        writer.close().unwrap();
        path
    }

    #[test]
    fn test_list_newest_first() {
        let dir = TempDir::new().unwrap();
        let old = make_archive(dir.path(), "old.sitepack");
        make_archive(dir.path(), "new.sitepack");
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let past = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();

        let names: Vec<String> = ArchiveCatalog::new(dir.path())
            .list()
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["new.sitepack", "old.sitepack"]);
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let catalog = ArchiveCatalog::new(dir.path().join("none"));
        assert!(catalog.list().unwrap().is_empty());
    }

    #[test]
    fn test_info_counts_entries() {
        let dir = TempDir::new().unwrap();
        make_archive(dir.path(), "a.sitepack");

        let info = ArchiveCatalog::new(dir.path()).info("a.sitepack").unwrap();
        assert_eq!(info.entries, 1);
        assert_eq!(info.summary.name, "a.sitepack");
        assert!(info.metadata.is_none());
    }

    #[test]
    fn test_validate() {
        let dir = TempDir::new().unwrap();
        make_archive(dir.path(), "good.sitepack");
        std::fs::write(dir.path().join("tiny.sitepack"), b"PK").unwrap();
        std::fs::write(dir.path().join("text.sitepack"), vec![b'x'; 4096]).unwrap();

        let catalog = ArchiveCatalog::new(dir.path());
        assert!(catalog.validate("good.sitepack").unwrap());
        assert!(!catalog.validate("tiny.sitepack").unwrap());
        assert!(!catalog.validate("text.sitepack").unwrap());
    }

    #[test]
    fn test_delete_is_guarded() {
        let root = TempDir::new().unwrap();
        let archives = root.path().join("archives");
        std::fs::create_dir(&archives).unwrap();
        make_archive(&archives, "a.sitepack");
        let outside = make_archive(root.path(), "outside.sitepack");

        let catalog = ArchiveCatalog::new(&archives);
        assert!(catalog.delete("../outside.sitepack").is_err());
        assert!(outside.exists());

        catalog.delete("a.sitepack").unwrap();
        assert!(catalog.list().unwrap().is_empty());
    }
}
