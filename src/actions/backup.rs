use std::path::PathBuf;

use clap::Args;
use miette::{IntoDiagnostic, Result};

use crate::app::App;

#[derive(Debug, Clone, Args)]
pub struct BackupArgs {
    /// File or directory to back up immediately
    pub path: PathBuf,
}

pub async fn run(config_path: PathBuf, args: BackupArgs) -> Result<()> {
    let app = App::bootstrap(&config_path).await.into_diagnostic()?;

    if args.path.is_dir() {
        let summary = app.pipeline.backup_directory(&args.path).await;
        println!(
            "backed up {} files ({} skipped, {} failed)",
            summary.succeeded, summary.skipped, summary.failed
        );
    } else {
        match app.pipeline.backup_file(&args.path).await {
            crate::pipeline::BackupOutcome::Ok { backup_id, version } => {
                println!("backed up {:?} as version {version} (id {backup_id})", args.path);
            }
            crate::pipeline::BackupOutcome::Skipped { reason } => {
                println!("skipped {:?}: {reason}", args.path);
            }
            crate::pipeline::BackupOutcome::Failed { error } => {
                return Err(error).into_diagnostic();
            }
        }
    }

    Ok(())
}
