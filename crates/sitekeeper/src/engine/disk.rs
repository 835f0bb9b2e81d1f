//! Free-space policy applied before each archive-write batch.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::config::DiskSpaceConfig;
use crate::error::EngineError;

/// Reports free bytes for the file system holding `path`.
pub trait SpaceProbe: Send + Sync {
    /// `None` when the platform cannot tell.
    fn available_bytes(&self, path: &Path) -> Option<u64>;
}

/// Probe backed by `fs2::available_space`.
pub struct FsSpaceProbe;

impl SpaceProbe for FsSpaceProbe {
    fn available_bytes(&self, path: &Path) -> Option<u64> {
        fs2::available_space(path).ok()
    }
}

/// Always reports the same value.
pub struct FixedSpaceProbe(pub Option<u64>);

impl SpaceProbe for FixedSpaceProbe {
    fn available_bytes(&self, _path: &Path) -> Option<u64> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceStatus {
    Unlimited,
    Plenty(u64),
    Low(u64),
    Critical(u64),
}

#[derive(Clone)]
pub struct DiskSpacePolicy {
    config: DiskSpaceConfig,
    probe: Arc<dyn SpaceProbe>,
}

impl DiskSpacePolicy {
    pub fn new(config: DiskSpaceConfig, probe: Arc<dyn SpaceProbe>) -> Self {
        Self { config, probe }
    }

    pub fn check(&self, path: &Path) -> SpaceStatus {
        if !self.config.check {
            return SpaceStatus::Unlimited;
        }
        match self.probe.available_bytes(path) {
            None | Some(0) => SpaceStatus::Unlimited,
            Some(free) if free > self.config.unlimited_bytes => SpaceStatus::Unlimited,
            Some(free) if free < self.config.critical_bytes => SpaceStatus::Critical(free),
            Some(free) if free < self.config.low_bytes => SpaceStatus::Low(free),
            Some(free) => SpaceStatus::Plenty(free),
        }
    }

    /// Batch size to use given free space at `path`: halved when low (never
    /// below 1), refused when critical.
    pub fn adjust_batch(&self, path: &Path, batch: usize) -> Result<usize, EngineError> {
        match self.check(path) {
            SpaceStatus::Critical(free) => Err(EngineError::ResourceExhausted(format!(
                "only {} free in {}",
                format_bytes(free),
                path.display()
            ))),
            SpaceStatus::Low(free) => {
                let reduced = (batch / 2).max(1);
                warn!(
                    free = free,
                    batch = reduced,
                    "Low disk space ({}), reducing archive batch",
                    format_bytes(free)
                );
                Ok(reduced)
            }
            SpaceStatus::Unlimited | SpaceStatus::Plenty(_) => Ok(batch.max(1)),
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
