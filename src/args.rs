use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, warn};

/// Personal continuous-backup agent
#[derive(Debug, Clone, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Path to the YAML config file
    #[arg(long, default_value = "vaultkeep.yaml", global = true)]
    pub config: PathBuf,

    /// Set diagnostic log level
    ///
    /// Use multiple times to increase verbosity, up to '-vvvvv'. Setting
    /// $RUST_LOG also works and takes precedence, but is the only way to
    /// get logs from before these options are parsed.
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write diagnostic logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub action: crate::actions::Action,
}

fn filter_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "info,vaultkeep=debug",
        2 => "debug",
        3 => "debug,vaultkeep=trace",
        _ => "trace",
    }
}

/// Parse CLI arguments and initialise the `tracing` subscriber. Returns the
/// parsed args and, if logging to a file, a guard that must be held for the
/// life of the process to flush buffered writes.
pub fn get_args() -> (Args, Option<tracing_appender::non_blocking::WorkerGuard>) {
    if std::env::var("RUST_LOG").is_ok() {
        eprintln!("note: RUST_LOG is set; -v/--verbose have no effect");
    }

    let args = Args::parse();
    let directive = filter_for_verbosity(args.verbose);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));

    let guard = if let Some(path) = &args.log_file {
        let (dir, prefix) = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => (dir.to_path_buf(), "vaultkeep.log"),
            _ => (PathBuf::from("."), "vaultkeep.log"),
        };
        let appender = tracing_appender::rolling::never(dir, prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_writer(non_blocking)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        None
    };

    debug!(?args, "got arguments");
    if std::env::var("RUST_LOG").is_ok() {
        warn!("RUST_LOG environment variable set, logging options have no effect");
    }

    (args, guard)
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Args::command().debug_assert()
}
