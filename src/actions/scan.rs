use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use miette::{IntoDiagnostic, Result};

use crate::app::App;
use crate::monitor::{EligibilityCheck, Enqueuer, FileMonitor};

#[derive(Debug, Clone, Args)]
pub struct ScanArgs {}

pub async fn run(config_path: PathBuf, _args: ScanArgs) -> Result<()> {
    let app = App::bootstrap(&config_path).await.into_diagnostic()?;

    let monitor = FileMonitor::new(app.config.raw.backup.debounce_seconds);
    let eligibility: Arc<dyn EligibilityCheck> = Arc::new(app.pipeline.clone());
    let enqueuer: Arc<dyn Enqueuer> = Arc::new(app.pipeline.clone());

    let (scanned, queued) = monitor.initial_scan(
        &app.config.raw.backup.watched_directories,
        eligibility.as_ref(),
        enqueuer.as_ref(),
    );

    println!("scanned {scanned} files, {queued} eligible for backup");
    println!("run `vaultkeep run` to actually back them up, or `vaultkeep backup <path>` for one file");
    Ok(())
}
