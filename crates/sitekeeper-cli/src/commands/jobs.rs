//! Job commands shared by `backup` and `restore`.

use anyhow::bail;
use sitekeeper::{BatchOutcome, Engine, JobRunner};

use crate::output;

fn resolve_job_id<E: Engine>(runner: &JobRunner<E>, job_id: Option<String>) -> anyhow::Result<String> {
    if let Some(job_id) = job_id {
        return Ok(job_id);
    }
    match runner.current_job_id()? {
        Some(job_id) => Ok(job_id),
        None => bail!("No {} job exists; start one first", runner.engine().kind()),
    }
}

pub fn start<E: Engine>(runner: &JobRunner<E>, request: E::Request) -> anyhow::Result<()> {
    let progress = runner.create_job(request)?;
    output::print_progress(&progress)
}

pub fn step<E: Engine>(runner: &JobRunner<E>, job_id: Option<String>) -> anyhow::Result<()> {
    let job_id = resolve_job_id(runner, job_id)?;
    let outcome = runner.step_once(&job_id)?;
    output::print_outcome(&outcome)?;
    if let BatchOutcome::Fatal { error, .. } = outcome {
        return Err(error.into());
    }
    Ok(())
}

pub fn run<E: Engine>(
    runner: &JobRunner<E>,
    request: E::Request,
    max_loops: usize,
) -> anyhow::Result<()> {
    let progress = runner.run_to_completion(request, max_loops)?;
    output::print_progress(&progress)
}

pub fn cancel<E: Engine>(runner: &JobRunner<E>, job_id: Option<String>) -> anyhow::Result<()> {
    let job_id = resolve_job_id(runner, job_id)?;
    let progress = runner.cancel(&job_id)?;
    output::print_progress(&progress)
}

pub fn status<E: Engine>(runner: &JobRunner<E>) -> anyhow::Result<()> {
    match runner.progress()? {
        Some(progress) => output::print_progress(&progress),
        None => bail!("No {} job progress recorded", runner.engine().kind()),
    }
}
