use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::ScanError;

/// A regular file found under a scan root.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileEntry {
    pub source: PathBuf,
    /// Root-relative path with `/` separators; also the archive entry name.
    pub relative: String,
}

pub struct DirectoryScanner {
    root: PathBuf,
    excluded_dirs: Vec<PathBuf>,
    pattern_base: PathBuf,
    excluded_patterns: Vec<glob::Pattern>,
}

impl DirectoryScanner {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            pattern_base: root.clone(),
            root,
            excluded_dirs: Vec::new(),
            excluded_patterns: Vec::new(),
        }
    }

    /// Never descend into `dir`. Compared by real path.
    pub fn exclude_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        let dir = dir.as_ref();
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        self.excluded_dirs.push(dir);
        self
    }

    /// Skip files and directories whose path relative to `base` matches any
    /// of the glob `patterns`. Invalid patterns are logged and ignored.
    pub fn exclude_patterns<P: AsRef<Path>>(mut self, base: P, patterns: &[String]) -> Self {
        self.pattern_base = base.as_ref().to_path_buf();
        self.excluded_patterns = patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Ignoring invalid exclude pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();
        self
    }

    /// Walks the whole tree and returns every regular file, sorted by
    /// relative path. Unreadable subtrees and symlink loops are skipped with a
    /// warning; a missing or unreadable root is an error.
    pub fn scan(&self) -> Result<Vec<FileEntry>, ScanError> {
        if !self.root.is_dir() {
            return Err(ScanError::RootMissing(self.root.clone()));
        }
        std::fs::read_dir(&self.root).map_err(|e| ScanError::RootUnreadable {
            path: self.root.clone(),
            source: e,
        })?;

        let mut seen = HashSet::new();
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e.path(), e.file_type().is_dir()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable path during scan: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let real = entry
                .path()
                .canonicalize()
                .unwrap_or_else(|_| entry.path().to_path_buf());
            if !seen.insert(real) {
                debug!("Skipping duplicate link target: {}", entry.path().display());
                continue;
            }

            let Some(relative) = relative_name(&self.root, entry.path()) else {
                continue;
            };
            files.push(FileEntry {
                source: entry.path().to_path_buf(),
                relative,
            });
        }

        files.sort_by(|a, b| a.relative.cmp(&b.relative));

        info!("Scanned {} files in {}", files.len(), self.root.display());
        Ok(files)
    }

    fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        if is_dir && !self.excluded_dirs.is_empty() {
            let real = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            if self.excluded_dirs.iter().any(|d| *d == real) {
                debug!("Excluding directory: {}", path.display());
                return true;
            }
        }

        if self.excluded_patterns.is_empty() {
            return false;
        }
        match relative_name(&self.pattern_base, path) {
            Some(relative) => self.excluded_patterns.iter().any(|p| p.matches(&relative)),
            None => false,
        }
    }
}

/// `path` relative to `root`, joined with `/`. `None` if `path` is not under `root`.
pub fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
