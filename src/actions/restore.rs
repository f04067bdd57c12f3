use std::path::PathBuf;

use clap::Args;
use miette::{IntoDiagnostic, Result};

use crate::app::App;

#[derive(Debug, Clone, Args)]
pub struct RestoreArgs {
    /// Id of the backup record to restore
    pub id: i64,
    /// Destination path to write the restored file to
    pub dest: PathBuf,
}

pub async fn run(config_path: PathBuf, args: RestoreArgs) -> Result<()> {
    let app = App::bootstrap(&config_path).await.into_diagnostic()?;
    app.pipeline
        .restore_file(args.id, &args.dest, None)
        .await
        .into_diagnostic()?;
    println!("restored backup {} to {:?}", args.id, args.dest);
    Ok(())
}
