use std::io;
use std::path::PathBuf;

use thiserror::Error;
use zip::result::ZipError;

use crate::db::DatabaseError;
use crate::store::StoreError;

const DISK_SPACE_HINT: &str = "This looks like a disk space problem. Free some space in the archive \
     directory (or raise the hosting quota) and retry the batch.";
const PERMISSION_HINT: &str = "This looks like a file system permission problem. Check that the \
     archive and work directories exist and are writable, then retry the batch.";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Failures of the archive codec. Open, write and close are kept apart so
/// callers can tell a permission problem from a full disk.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Could not create or open archive '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("Failed to write entry '{entry}' to archive '{path}': {source}")]
    Write {
        path: PathBuf,
        entry: String,
        #[source]
        source: ZipError,
    },

    #[error("Failed to finalize archive '{path}': {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("Failed to read archive '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("Not a valid archive: '{0}'")]
    InvalidArchive(PathBuf),

    #[error("Path '{0}' is outside the archive directory")]
    OutsideArchiveDirectory(PathBuf),
}

impl ArchiveError {
    /// Underlying I/O error kind, when the failure came from the file system.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        let source = match self {
            ArchiveError::Open { source, .. }
            | ArchiveError::Write { source, .. }
            | ArchiveError::Close { source, .. }
            | ArchiveError::Read { source, .. } => source,
            _ => return None,
        };
        match source {
            ZipError::Io(e) => Some(e.kind()),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Scan root '{0}' does not exist or is not a directory")]
    RootMissing(PathBuf),

    #[error("Scan root '{path}' is not readable: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Coarse classification of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    IoFailure,
    NotFound,
    InvalidInput,
    ResourceExhausted,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O failure on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job made no progress to completion after {0} batches")]
    Stalled(usize),
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Io { .. } => ErrorKind::IoFailure,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
            EngineError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            EngineError::Archive(e) => match e {
                ArchiveError::InvalidArchive(_) | ArchiveError::OutsideArchiveDirectory(_) => {
                    ErrorKind::InvalidInput
                }
                _ if e.io_kind() == Some(io::ErrorKind::StorageFull) => {
                    ErrorKind::ResourceExhausted
                }
                _ => ErrorKind::IoFailure,
            },
            EngineError::Scan(ScanError::RootMissing(_)) => ErrorKind::NotFound,
            EngineError::Scan(_) => ErrorKind::IoFailure,
            EngineError::Database(DatabaseError::MalformedStatement { .. }) => {
                ErrorKind::InvalidInput
            }
            EngineError::Database(_) | EngineError::Store(_) | EngineError::Stalled(_) => {
                ErrorKind::IoFailure
            }
        }
    }

    /// Whether retrying the same batch can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::IoFailure | ErrorKind::ResourceExhausted
        )
    }

    /// One-line remediation hint shown next to the error, if one applies.
    pub fn remediation_hint(&self) -> Option<&'static str> {
        if self.kind() == ErrorKind::ResourceExhausted {
            return Some(DISK_SPACE_HINT);
        }
        match self {
            EngineError::Io { source, .. } => hint_for_io(source.kind()),
            EngineError::Archive(e) => match (e, e.io_kind()) {
                (_, Some(io::ErrorKind::PermissionDenied)) => Some(PERMISSION_HINT),
                (ArchiveError::Write { .. } | ArchiveError::Close { .. }, _) => {
                    Some(DISK_SPACE_HINT)
                }
                (ArchiveError::Open { .. }, _) => Some(PERMISSION_HINT),
                _ => None,
            },
            _ => None,
        }
    }
}

fn hint_for_io(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::PermissionDenied => Some(PERMISSION_HINT),
        io::ErrorKind::StorageFull => Some(DISK_SPACE_HINT),
        _ => None,
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_failure_suggests_disk_space() {
        let err = EngineError::from(ArchiveError::Write {
            path: PathBuf::from("/backups/site.sitepack"),
            entry: "a.txt".to_string(),
            source: ZipError::Io(io::Error::other("write failed")),
        });
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(err.is_retryable());
        assert_eq!(err.remediation_hint(), Some(DISK_SPACE_HINT));
    }

    #[test]
    fn test_open_permission_denied_suggests_permissions() {
        let err = EngineError::from(ArchiveError::Open {
            path: PathBuf::from("/backups/site.sitepack"),
            source: ZipError::Io(io::Error::from(io::ErrorKind::PermissionDenied)),
        });
        assert_eq!(err.remediation_hint(), Some(PERMISSION_HINT));
    }

    #[test]
    fn test_invalid_archive_is_permanent() {
        let err = EngineError::from(ArchiveError::InvalidArchive(PathBuf::from("x")));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!err.is_retryable());
        assert!(err.remediation_hint().is_none());
    }

    #[test]
    fn test_resource_exhausted_is_retryable() {
        let err = EngineError::ResourceExhausted("3 MB free".to_string());
        assert!(err.is_retryable());
        assert_eq!(err.remediation_hint(), Some(DISK_SPACE_HINT));
    }

    #[test]
    fn test_not_found_is_permanent() {
        let err = EngineError::NotFound("backup job".to_string());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_retryable());
    }
}
