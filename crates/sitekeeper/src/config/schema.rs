use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    pub site_root: PathBuf,
    pub archive_directory: PathBuf,
    pub work_directory: PathBuf,
    pub database: PathBuf,
    #[serde(default)]
    pub state_database: Option<PathBuf>,
    #[serde(default = "default_site_name")]
    pub site_name: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub categories: CategoriesConfig,
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_site_name() -> String {
    "site".to_string()
}

impl Config {
    /// Config with every optional section at its default.
    pub fn for_site(
        site_root: impl Into<PathBuf>,
        archive_directory: impl Into<PathBuf>,
        work_directory: impl Into<PathBuf>,
        database: impl Into<PathBuf>,
    ) -> Self {
        Self {
            version: "1.0".to_string(),
            site_root: site_root.into(),
            archive_directory: archive_directory.into(),
            work_directory: work_directory.into(),
            database: database.into(),
            state_database: None,
            site_name: default_site_name(),
            origin: String::new(),
            categories: CategoriesConfig::default(),
            excluded_paths: Vec::new(),
            batch: BatchConfig::default(),
            disk_space: DiskSpaceConfig::default(),
            retention: RetentionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// `~/.sitekeeper/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".sitekeeper").join("config.json"))
    }

    pub fn state_database_path(&self) -> PathBuf {
        self.state_database
            .clone()
            .unwrap_or_else(|| self.work_directory.join("state.db"))
    }

    /// Absolute directory of a file category.
    pub fn category_dir(&self, category: FileCategory) -> PathBuf {
        let relative = match category {
            FileCategory::Uploads => &self.categories.uploads,
            FileCategory::Themes => &self.categories.themes,
            FileCategory::Plugins => &self.categories.plugins,
        };
        resolve(&self.site_root, relative)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// The three file categories a backup can include, in step order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Uploads,
    Themes,
    Plugins,
}

impl FileCategory {
    pub const ALL: [FileCategory; 3] = [
        FileCategory::Uploads,
        FileCategory::Themes,
        FileCategory::Plugins,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Uploads => "uploads",
            FileCategory::Themes => "themes",
            FileCategory::Plugins => "plugins",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoriesConfig {
    #[serde(default = "default_uploads")]
    pub uploads: PathBuf,
    #[serde(default = "default_themes")]
    pub themes: PathBuf,
    #[serde(default = "default_plugins")]
    pub plugins: PathBuf,
}

fn default_uploads() -> PathBuf {
    PathBuf::from("content/uploads")
}

fn default_themes() -> PathBuf {
    PathBuf::from("content/themes")
}

fn default_plugins() -> PathBuf {
    PathBuf::from("content/plugins")
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            uploads: default_uploads(),
            themes: default_themes(),
            plugins: default_plugins(),
        }
    }
}

/// Work-unit sizes. Each one bounds how much a single batch call does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    #[serde(default = "default_rows_per_fetch")]
    pub rows_per_fetch: usize,
    #[serde(default = "default_category_files")]
    pub category_files: usize,
    #[serde(default = "default_archive_files")]
    pub archive_files: usize,
    #[serde(default = "default_archive_files_after_error")]
    pub archive_files_after_error: usize,
    #[serde(default = "default_extract_entries")]
    pub extract_entries: usize,
    #[serde(default = "default_restore_files")]
    pub restore_files: usize,
}

fn default_rows_per_fetch() -> usize {
    200
}

fn default_category_files() -> usize {
    50
}

fn default_archive_files() -> usize {
    100
}

fn default_archive_files_after_error() -> usize {
    25
}

fn default_extract_entries() -> usize {
    100
}

fn default_restore_files() -> usize {
    75
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            rows_per_fetch: default_rows_per_fetch(),
            category_files: default_category_files(),
            archive_files: default_archive_files(),
            archive_files_after_error: default_archive_files_after_error(),
            extract_entries: default_extract_entries(),
            restore_files: default_restore_files(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpaceConfig {
    #[serde(default = "default_true")]
    pub check: bool,
    #[serde(default = "default_low_bytes")]
    pub low_bytes: u64,
    #[serde(default = "default_critical_bytes")]
    pub critical_bytes: u64,
    /// Probes reporting more than this are treated as "no quota".
    #[serde(default = "default_unlimited_bytes")]
    pub unlimited_bytes: u64,
}

fn default_true() -> bool {
    true
}

fn default_low_bytes() -> u64 {
    100 * MIB
}

fn default_critical_bytes() -> u64 {
    10 * MIB
}

fn default_unlimited_bytes() -> u64 {
    100 * 1024 * 1024 * MIB
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            check: true,
            low_bytes: default_low_bytes(),
            critical_bytes: default_critical_bytes(),
            unlimited_bytes: default_unlimited_bytes(),
        }
    }
}

/// Time-to-live of documents in the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionConfig {
    #[serde(default = "default_active_job_secs")]
    pub active_job_secs: u64,
    #[serde(default = "default_completed_job_secs")]
    pub completed_job_secs: u64,
    #[serde(default = "default_progress_secs")]
    pub progress_secs: u64,
}

fn default_active_job_secs() -> u64 {
    86_400
}

fn default_completed_job_secs() -> u64 {
    300
}

fn default_progress_secs() -> u64 {
    86_400
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            active_job_secs: default_active_job_secs(),
            completed_job_secs: default_completed_job_secs(),
            progress_secs: default_progress_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}
