use std::path::PathBuf;

use clap::Args;
use miette::{IntoDiagnostic, Result};

use crate::app::App;

#[derive(Debug, Clone, Args)]
pub struct CleanupArgs {}

pub async fn run(config_path: PathBuf, _args: CleanupArgs) -> Result<()> {
    let app = App::bootstrap(&config_path).await.into_diagnostic()?;
    let (cleaned, freed) = app.pipeline.cleanup_old_backups().await.into_diagnostic()?;
    println!("cleaned {cleaned} old versions, freed {freed} bytes");
    Ok(())
}
