pub mod archives;
pub mod jobs;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use sitekeeper::config::load_config;
use sitekeeper::{
    logging, BackupEngine, Config, Database, JobKeys, JobRunner, KeyValueStore, RestoreEngine,
    SqliteStore,
};

/// Loaded configuration plus the job store every command shares.
pub struct Context {
    pub config: Arc<Config>,
    store: Arc<dyn KeyValueStore>,
}

impl Context {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Config::default_path()
                .context("Could not determine home directory; pass --config")?,
        };
        let config = load_config(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        logging::init(&config.logging);

        std::fs::create_dir_all(&config.work_directory).with_context(|| {
            format!(
                "Failed to create work directory {}",
                config.work_directory.display()
            )
        })?;
        let state_path = config.state_database_path();
        let store = SqliteStore::open(&state_path)
            .with_context(|| format!("Failed to open job store {}", state_path.display()))?;
        if let Err(e) = store.purge_expired() {
            tracing::debug!("Could not purge expired job store entries: {}", e);
        }

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
        })
    }

    fn site_database(&self) -> anyhow::Result<Database> {
        Database::open(&self.config.database).with_context(|| {
            format!(
                "Failed to open site database {}",
                self.config.database.display()
            )
        })
    }

    pub fn backup_runner(&self) -> anyhow::Result<JobRunner<BackupEngine>> {
        let engine = BackupEngine::new(Arc::clone(&self.config), Arc::new(self.site_database()?));
        Ok(JobRunner::new(
            engine,
            Arc::clone(&self.store),
            JobKeys::BACKUP,
            self.config.retention.clone(),
        ))
    }

    pub fn restore_runner(&self) -> anyhow::Result<JobRunner<RestoreEngine>> {
        let engine = RestoreEngine::new(Arc::clone(&self.config), Arc::new(self.site_database()?));
        Ok(JobRunner::new(
            engine,
            Arc::clone(&self.store),
            JobKeys::RESTORE,
            self.config.retention.clone(),
        ))
    }
}
