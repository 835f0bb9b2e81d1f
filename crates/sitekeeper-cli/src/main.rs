//! sitekeeper command line interface.
//!
//! Each invocation runs at most one batch unless `run` is used, so the tool
//! can be driven from cron or any other external scheduler.

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::commands::{archives, jobs, Context};

/// Resumable site backup and restore
#[derive(Parser, Debug)]
#[command(name = "sitekeeper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file [default: ~/.sitekeeper/config.json]
    #[arg(short, long, env = "SITEKEEPER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create and drive backup jobs
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Create and drive restore jobs
    #[command(subcommand)]
    Restore(RestoreCommands),

    /// Inspect and manage finished archives
    #[command(subcommand)]
    Archives(ArchiveCommands),
}

/// Content selection for a backup. Selecting nothing backs up data only.
#[derive(Args, Debug, Clone)]
pub struct BackupSelection {
    /// Include the site database
    #[arg(long)]
    pub data: bool,

    /// Include uploaded media
    #[arg(long)]
    pub uploads: bool,

    /// Include themes
    #[arg(long)]
    pub themes: bool,

    /// Include plugins
    #[arg(long)]
    pub plugins: bool,

    /// Include everything
    #[arg(long, conflicts_with_all = ["data", "uploads", "themes", "plugins"])]
    pub all: bool,

    /// Archive file name (the extension is added when missing)
    #[arg(short, long)]
    pub filename: Option<String>,

    /// Mark the archive as produced by a scheduled run
    #[arg(long)]
    pub scheduled: bool,
}

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Create a backup job, replacing any previous one
    Start(BackupSelection),

    /// Process one batch of the current backup job
    Step {
        /// Job id [default: the current job]
        job_id: Option<String>,
    },

    /// Create a backup job and process it to completion
    Run {
        #[command(flatten)]
        selection: BackupSelection,

        /// Give up after this many batches
        #[arg(long, default_value_t = sitekeeper::runner::DEFAULT_MAX_LOOPS)]
        max_loops: usize,
    },

    /// Request cancellation of the current backup job
    Cancel {
        job_id: Option<String>,
    },

    /// Show the stored progress of the current backup job
    Status,
}

#[derive(Subcommand, Debug)]
pub enum RestoreCommands {
    /// Create a restore job for an archive in the archive directory
    Start {
        /// Archive file name
        file: String,
    },

    /// Process one batch of the current restore job
    Step {
        job_id: Option<String>,
    },

    /// Create a restore job and process it to completion
    Run {
        file: String,

        #[arg(long, default_value_t = sitekeeper::runner::DEFAULT_MAX_LOOPS)]
        max_loops: usize,
    },

    /// Request cancellation of the current restore job
    Cancel {
        job_id: Option<String>,
    },

    /// Show the stored progress of the current restore job
    Status,
}

#[derive(Subcommand, Debug)]
pub enum ArchiveCommands {
    /// List archives, newest first
    List,

    /// Show size, entry count and metadata of an archive
    Info { name: String },

    /// Check that a file looks like an archive
    Validate { name: String },

    /// Delete an archive
    Delete { name: String },

    /// Stream an archive (or a byte range of it) to stdout or a file
    Serve {
        name: String,

        /// Range header value, e.g. `bytes=0-1023`
        #[arg(long)]
        range: Option<String>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let ctx = Context::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Backup(cmd) => {
            let runner = ctx.backup_runner()?;
            match cmd {
                BackupCommands::Start(selection) => {
                    jobs::start(&runner, selection.into_options())
                }
                BackupCommands::Step { job_id } => jobs::step(&runner, job_id),
                BackupCommands::Run {
                    selection,
                    max_loops,
                } => jobs::run(&runner, selection.into_options(), max_loops),
                BackupCommands::Cancel { job_id } => jobs::cancel(&runner, job_id),
                BackupCommands::Status => jobs::status(&runner),
            }
        }
        Commands::Restore(cmd) => {
            let runner = ctx.restore_runner()?;
            match cmd {
                RestoreCommands::Start { file } => jobs::start(&runner, file),
                RestoreCommands::Step { job_id } => jobs::step(&runner, job_id),
                RestoreCommands::Run { file, max_loops } => jobs::run(&runner, file, max_loops),
                RestoreCommands::Cancel { job_id } => jobs::cancel(&runner, job_id),
                RestoreCommands::Status => jobs::status(&runner),
            }
        }
        Commands::Archives(cmd) => archives::run(&ctx, cmd),
    }
}

impl BackupSelection {
    fn into_options(self) -> sitekeeper::BackupOptions {
        if self.all {
            return sitekeeper::BackupOptions {
                filename: self.filename,
                scheduled: self.scheduled,
                ..sitekeeper::BackupOptions::default()
            };
        }
        sitekeeper::BackupOptions {
            data: self.data,
            uploads: self.uploads,
            themes: self.themes,
            plugins: self.plugins,
            filename: self.filename,
            scheduled: self.scheduled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_selection_is_passed_through() {
        let cli = Cli::parse_from(["sitekeeper", "backup", "start"]);
        let Commands::Backup(BackupCommands::Start(selection)) = cli.command else {
            panic!("unexpected command");
        };
        let options = selection.into_options();
        assert!(!options.has_content());
    }

    #[test]
    fn test_all_selects_everything() {
        let cli = Cli::parse_from(["sitekeeper", "backup", "run", "--all", "-f", "nightly"]);
        let Commands::Backup(BackupCommands::Run { selection, max_loops }) = cli.command else {
            panic!("unexpected command");
        };
        assert_eq!(max_loops, 1000);
        let options = selection.into_options();
        assert!(options.data && options.uploads && options.themes && options.plugins);
        assert_eq!(options.filename.as_deref(), Some("nightly"));
    }
}
