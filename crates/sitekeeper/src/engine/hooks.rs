use std::path::Path;

/// Called once after restored files are in place, to let the hosting
/// environment drop caches or rebuild routing tables. Failures are logged and
/// do not fail the restore.
pub trait PostRestoreHook: Send + Sync {
    fn after_restore(&self, site_root: &Path) -> std::io::Result<()>;
}

pub struct NoopHook;

impl PostRestoreHook for NoopHook {
    fn after_restore(&self, _site_root: &Path) -> std::io::Result<()> {
        Ok(())
    }
}

impl<F> PostRestoreHook for F
where
    F: Fn(&Path) -> std::io::Result<()> + Send + Sync,
{
    fn after_restore(&self, site_root: &Path) -> std::io::Result<()> {
        self(site_root)
    }
}
