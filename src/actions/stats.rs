use std::path::PathBuf;

use clap::Args;
use miette::{IntoDiagnostic, Result};

use crate::app::App;

#[derive(Debug, Clone, Args)]
pub struct StatsArgs {}

pub async fn run(config_path: PathBuf, _args: StatsArgs) -> Result<()> {
    let app = App::bootstrap(&config_path).await.into_diagnostic()?;
    let stats = app.catalog.get_storage_stats(&app.config.device_id).into_diagnostic()?;

    println!("total files:           {}", stats.total_files);
    println!("unique files:           {}", stats.unique_files);
    println!("total original size:   {} bytes", stats.total_original_size);
    println!("total compressed size: {} bytes", stats.total_compressed_size);
    println!("total encrypted size:  {} bytes", stats.total_encrypted_size);
    println!("avg compression ratio: {:.3}", stats.avg_compression_ratio);
    Ok(())
}
