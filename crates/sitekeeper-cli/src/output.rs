//! JSON output for job and archive commands.

use serde::Serialize;
use serde_json::json;
use sitekeeper::{BatchOutcome, Progress};

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_progress(progress: &Progress) -> anyhow::Result<()> {
    print_json(progress)
}

pub fn print_outcome(outcome: &BatchOutcome) -> anyhow::Result<()> {
    match outcome {
        BatchOutcome::Fatal { progress, error } => print_json(&json!({
            "progress": progress.progress,
            "message": progress.message,
            "jobId": progress.job_id,
            "status": progress.status,
            "error": error.to_string(),
            "retryable": error.is_retryable(),
            "hint": error.remediation_hint(),
        })),
        _ => print_progress(outcome.progress()),
    }
}
