//! Test harness for isolated backup and restore runs.
//!
//! The `TestHarness` struct owns a temporary directory holding:
//! - a site root with the default category layout
//! - archive and work directories
//! - a file-backed SQLite site database
//! - an in-memory job store

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use assert_fs::prelude::*;
use assert_fs::TempDir;

use sitekeeper::db::{SqlValue, TabularSource};
use sitekeeper::engine::FixedSpaceProbe;
use sitekeeper::scanner::DirectoryScanner;
use sitekeeper::{
    BackupEngine, Config, Database, Engine, JobDocument, JobKeys, JobRunner, MemoryStore,
    RestoreEngine,
};

use super::builders::TableFixture;

/// Upper bound on batches for any single test job.
pub const MAX_CALLS: usize = 10_000;

pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub site_db: Database,
    pub store: Arc<MemoryStore>,
}

impl TestHarness {
    /// Empty site with default batch sizes.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let site_root = base.join("site");
        temp_dir
            .child("site/content")
            .create_dir_all()
            .expect("Failed to create site root");

        let config = Config::for_site(
            &site_root,
            base.join("archives"),
            base.join("work"),
            base.join("site.db"),
        );
        let site_db = Database::open(&config.database).expect("Failed to open site database");

        Self {
            temp_dir,
            config,
            site_db,
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Adjusts the configuration before any engine is built.
    pub fn with_config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn site_root(&self) -> &Path {
        &self.config.site_root
    }

    /// Writes a file under the site root, creating parent directories.
    pub fn write_site_file(&self, relative: &str, content: &[u8]) -> PathBuf {
        let child = self.temp_dir.child(format!("site/{}", relative));
        if let Some(parent) = child.path().parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        child.write_binary(content).expect("Failed to write site file");
        child.path().to_path_buf()
    }

    pub fn seed_sql(&self, sql: &str) {
        self.site_db
            .with_conn(|conn| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .expect("Failed to seed site database");
    }

    pub fn seed_tables(&self, tables: &[TableFixture]) {
        for table in tables {
            self.seed_sql(&table.sql());
        }
    }

    /// A small but varied site: files in every category and two tables with
    /// awkward values.
    pub fn seed_sample_site(&self) {
        self.write_site_file("content/uploads/2026/01/photo.jpg", &[0xFF, 0xD8, 0x00, 0x10, 0xFF]);
        self.write_site_file("content/uploads/2026/02/notes.txt", b"line one\nline two\n");
        self.write_site_file("content/uploads/readme.md", b"# uploads\n");
        self.write_site_file("content/themes/plain/style.css", b"body { margin: 0; }\n");
        self.write_site_file("content/themes/plain/index.html", b"<html></html>\n");
        self.write_site_file("content/plugins/hello/hello.js", b"console.log('hi');\n");

        self.seed_sql(
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, body TEXT, score REAL, cover BLOB);
             INSERT INTO posts (title, body, score, cover) VALUES
                ('Hello', 'first post', 1.5, X'00FF10'),
                ('It''s quoted', 'two' || char(10) || 'lines', NULL, NULL),
                ('Semi;colon', 'ends with;' || char(10), -3.25, X'');
             CREATE TABLE settings (name TEXT PRIMARY KEY, value TEXT) WITHOUT ROWID;
             INSERT INTO settings VALUES ('theme', 'plain'), ('tagline', 'Just; another site');",
        );
    }

    pub fn backup_engine(&self) -> BackupEngine {
        BackupEngine::new(Arc::new(self.config.clone()), Arc::new(self.site_db.clone()))
            .with_space_probe(Arc::new(FixedSpaceProbe(None)))
            .with_retry_backoff(Duration::ZERO)
    }

    pub fn backup_runner(&self) -> JobRunner<BackupEngine> {
        JobRunner::new(
            self.backup_engine(),
            self.store.clone(),
            JobKeys::BACKUP,
            self.config.retention.clone(),
        )
    }

    /// Config and empty database for restoring into a fresh site that shares
    /// this harness's archive directory.
    pub fn restore_target(&self, name: &str) -> (Config, Database) {
        let base = self.temp_path();
        let mut config = Config::for_site(
            base.join(name),
            &self.config.archive_directory,
            base.join(format!("{}-work", name)),
            base.join(format!("{}.db", name)),
        );
        config.batch = self.config.batch.clone();
        let db = Database::open(&config.database).expect("Failed to open target database");
        (config, db)
    }

    pub fn restore_engine(config: &Config, db: &Database) -> RestoreEngine {
        RestoreEngine::new(Arc::new(config.clone()), Arc::new(db.clone()))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Calls `process_batch` until the job is terminal and returns the number
/// of calls.
pub fn run_job<E: Engine>(engine: &E, job: &mut E::Job) -> usize {
    let mut calls = 0;
    while !job.is_terminal() {
        engine.process_batch(job).expect("batch failed");
        calls += 1;
        assert!(calls < MAX_CALLS, "job did not converge");
    }
    calls
}

/// Every regular file under `root`, keyed by root-relative path.
pub fn tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    DirectoryScanner::new(root)
        .scan()
        .expect("Failed to scan tree")
        .into_iter()
        .map(|entry| {
            let bytes = std::fs::read(&entry.source).expect("Failed to read file");
            (entry.relative, bytes)
        })
        .collect()
}

/// All rows of `table` in stable order.
pub fn table_rows(db: &Database, table: &str) -> Vec<Vec<SqlValue>> {
    db.fetch_rows(table, 0, 10_000).expect("Failed to read table")
}
