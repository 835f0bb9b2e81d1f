//! Progress snapshots and the formulas that derive them from job counters.

use serde::{Deserialize, Serialize};

use super::step::RestoreStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// What pollers see. Stored separately from the job so reading it is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub progress: u8,
    pub message: String,
    pub job_id: String,
    pub status: ProgressStatus,
}

impl Progress {
    pub fn new(
        job_id: impl Into<String>,
        progress: u8,
        message: impl Into<String>,
        status: ProgressStatus,
    ) -> Self {
        Self {
            progress: progress.min(100),
            message: message.into(),
            job_id: job_id.into(),
            status,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ProgressStatus::Completed | ProgressStatus::Cancelled
        )
    }
}

/// `processed / total`, where an empty queue counts as done.
pub fn fraction(processed: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        (processed.min(total) as f64) / (total as f64)
    }
}

/// Equal-weight allocation over the enabled backup steps:
/// `floor((step_index + fraction) / total_steps * 100)`, clamped to 0..=100.
pub fn backup_percent(step_index: usize, total_steps: usize, fraction: f64) -> u8 {
    if total_steps == 0 {
        return 100;
    }
    let fraction = fraction.clamp(0.0, 1.0);
    let value = ((step_index as f64 + fraction) * 100.0 / total_steps as f64).floor();
    value.clamp(0.0, 100.0) as u8
}

/// Extraction 0-50, database 50-80, files 80-95, finalize 99, done 100.
pub fn restore_percent(step: RestoreStep, fraction: f64) -> u8 {
    let fraction = fraction.clamp(0.0, 1.0);
    let value = match step {
        RestoreStep::Extracting => fraction * 50.0,
        RestoreStep::Database => 50.0 + fraction * 30.0,
        RestoreStep::Files => 80.0 + fraction * 15.0,
        RestoreStep::Finalize => 99.0,
        RestoreStep::Completed | RestoreStep::Cancelled => 100.0,
    };
    value.floor().clamp(0.0, 100.0) as u8
}
