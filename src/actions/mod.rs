//! CLI subcommand dispatch, following the shape of `bestool`'s
//! `actions.rs`: one `Action` enum variant per subcommand, each wrapping
//! that subcommand's own args struct and `run` function.

use clap::Subcommand;
use miette::Result;

pub mod backup;
pub mod cleanup;
pub mod restore;
pub mod run;
pub mod scan;
pub mod search;
pub mod stats;
pub mod versions;

#[derive(Debug, Clone, Subcommand)]
pub enum Action {
    /// Start the monitor, scheduler, and dashboard; block until signalled
    Run(run::RunArgs),
    /// Back up a single file or directory immediately, bypassing the queue
    Backup(backup::BackupArgs),
    /// Restore one backup record to a destination path
    Restore(restore::RestoreArgs),
    /// List versions of a backed-up file
    Versions(versions::VersionsArgs),
    /// Search backed-up paths
    Search(search::SearchArgs),
    /// Print storage statistics
    Stats(stats::StatsArgs),
    /// Run one retention sweep immediately
    Cleanup(cleanup::CleanupArgs),
    /// Run the initial reconciling scan and report counts, without starting the monitor
    Scan(scan::ScanArgs),
}

pub async fn run(args: crate::args::Args) -> Result<()> {
    let config_path = args.config.clone();
    match args.action {
        Action::Run(sub) => run::run(config_path, sub).await,
        Action::Backup(sub) => backup::run(config_path, sub).await,
        Action::Restore(sub) => restore::run(config_path, sub).await,
        Action::Versions(sub) => versions::run(config_path, sub).await,
        Action::Search(sub) => search::run(config_path, sub).await,
        Action::Stats(sub) => stats::run(config_path, sub).await,
        Action::Cleanup(sub) => cleanup::run(config_path, sub).await,
        Action::Scan(sub) => scan::run(config_path, sub).await,
    }
}
