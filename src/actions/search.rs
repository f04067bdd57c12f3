use std::path::PathBuf;

use clap::Args;
use miette::{IntoDiagnostic, Result};

use crate::app::App;

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    /// Substring to search for in backed-up file paths
    pub query: String,

    /// Maximum number of results
    #[arg(long, default_value_t = 50)]
    pub limit: u32,
}

pub async fn run(config_path: PathBuf, args: SearchArgs) -> Result<()> {
    let app = App::bootstrap(&config_path).await.into_diagnostic()?;
    let results = app
        .catalog
        .search_backups(&args.query, &app.config.device_id, args.limit)
        .into_diagnostic()?;

    if results.is_empty() {
        println!("no matches for {:?}", args.query);
        return Ok(());
    }

    for (path, latest) in results {
        println!("{}  (latest backup {})", path, latest.to_rfc3339());
    }
    Ok(())
}
