//! Step state machines.
//!
//! Both enums are plain values with a fixed total order; moving forward is a
//! pure function of the current step and the job options, so it can be tested
//! without touching the file system.

use serde::{Deserialize, Serialize};

use super::backup::BackupOptions;
use crate::config::FileCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStep {
    Data,
    Uploads,
    Themes,
    Plugins,
    ArchiveWrite,
    Finalize,
    Completed,
    Cancelled,
}

impl BackupStep {
    /// Working steps in execution order. Terminal states are not listed.
    pub const ORDER: [BackupStep; 6] = [
        BackupStep::Data,
        BackupStep::Uploads,
        BackupStep::Themes,
        BackupStep::Plugins,
        BackupStep::ArchiveWrite,
        BackupStep::Finalize,
    ];

    pub fn for_category(category: FileCategory) -> Self {
        match category {
            FileCategory::Uploads => BackupStep::Uploads,
            FileCategory::Themes => BackupStep::Themes,
            FileCategory::Plugins => BackupStep::Plugins,
        }
    }

    pub fn category(self) -> Option<FileCategory> {
        match self {
            BackupStep::Uploads => Some(FileCategory::Uploads),
            BackupStep::Themes => Some(FileCategory::Themes),
            BackupStep::Plugins => Some(FileCategory::Plugins),
            _ => None,
        }
    }

    pub fn is_enabled(self, options: &BackupOptions) -> bool {
        match self {
            BackupStep::Data => options.data,
            BackupStep::Uploads => options.uploads,
            BackupStep::Themes => options.themes,
            BackupStep::Plugins => options.plugins,
            BackupStep::ArchiveWrite | BackupStep::Finalize => true,
            BackupStep::Completed | BackupStep::Cancelled => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BackupStep::Completed | BackupStep::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackupStep::Data => "data",
            BackupStep::Uploads => "uploads",
            BackupStep::Themes => "themes",
            BackupStep::Plugins => "plugins",
            BackupStep::ArchiveWrite => "archive_write",
            BackupStep::Finalize => "finalize",
            BackupStep::Completed => "completed",
            BackupStep::Cancelled => "cancelled",
        }
    }
}

/// The enabled working steps, in order.
pub fn enabled_steps(options: &BackupOptions) -> Vec<BackupStep> {
    BackupStep::ORDER
        .iter()
        .copied()
        .filter(|s| s.is_enabled(options))
        .collect()
}

pub fn first_enabled(options: &BackupOptions) -> BackupStep {
    enabled_steps(options)
        .first()
        .copied()
        .unwrap_or(BackupStep::ArchiveWrite)
}

/// The enabled step after `current`. `Finalize` leads to `Completed`;
/// terminal steps map to themselves.
pub fn next_enabled(current: BackupStep, options: &BackupOptions) -> BackupStep {
    if current.is_terminal() {
        return current;
    }
    BackupStep::ORDER
        .iter()
        .copied()
        .skip_while(|s| *s != current)
        .skip(1)
        .find(|s| s.is_enabled(options))
        .unwrap_or(BackupStep::Completed)
}

/// Position of `step` among the enabled steps, for the progress formula.
pub fn step_index(step: BackupStep, options: &BackupOptions) -> usize {
    let steps = enabled_steps(options);
    steps
        .iter()
        .position(|s| *s == step)
        .unwrap_or(steps.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStep {
    Extracting,
    Database,
    Files,
    Finalize,
    Completed,
    Cancelled,
}

impl RestoreStep {
    pub fn next(self) -> Self {
        match self {
            RestoreStep::Extracting => RestoreStep::Database,
            RestoreStep::Database => RestoreStep::Files,
            RestoreStep::Files => RestoreStep::Finalize,
            RestoreStep::Finalize | RestoreStep::Completed => RestoreStep::Completed,
            RestoreStep::Cancelled => RestoreStep::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RestoreStep::Completed | RestoreStep::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RestoreStep::Extracting => "extracting",
            RestoreStep::Database => "database",
            RestoreStep::Files => "files",
            RestoreStep::Finalize => "finalize",
            RestoreStep::Completed => "completed",
            RestoreStep::Cancelled => "cancelled",
        }
    }
}
