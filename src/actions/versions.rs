use std::path::PathBuf;

use clap::Args;
use miette::{IntoDiagnostic, Result};

use crate::app::App;

#[derive(Debug, Clone, Args)]
pub struct VersionsArgs {
    /// File path to list backup versions for
    pub path: String,
}

pub async fn run(config_path: PathBuf, args: VersionsArgs) -> Result<()> {
    let app = App::bootstrap(&config_path).await.into_diagnostic()?;
    let versions = app
        .catalog
        .get_file_versions(&args.path, &app.config.device_id)
        .into_diagnostic()?;

    if versions.is_empty() {
        println!("no versions found for {:?}", args.path);
        return Ok(());
    }

    for record in versions {
        println!(
            "v{:<4} id={:<6} {}  {} bytes -> {} bytes  {}",
            record.version,
            record.id,
            record.backup_date.to_rfc3339(),
            record.original_size,
            record.encrypted_size,
            record.object_key,
        );
    }
    Ok(())
}
