pub mod archive;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod runner;
pub mod sanitize;
pub mod scanner;
pub mod store;

pub use archive::{ArchiveCatalog, ArchiveMetadata, ArchiveWriter};
pub use config::{load_config, Config, FileCategory};
pub use db::Database;
pub use engine::{
    BackupEngine, BackupJob, BackupOptions, BackupStep, Engine, JobDocument, Progress,
    ProgressStatus, RestoreEngine, RestoreJob, RestoreStep,
};
pub use error::{ArchiveError, ConfigError, EngineError, ErrorKind, Result, ScanError};
pub use runner::{BatchOutcome, JobRunner};
pub use store::{JobKeys, KeyValueStore, MemoryStore, SqliteStore};
