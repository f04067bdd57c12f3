//! Shared startup glue for the CLI subcommands: load config, open the
//! catalog, connect to object storage, and wire them into a pipeline.
//! Every subcommand goes through this instead of constructing its own
//! copy, so `run`, `backup`, `restore`, and friends all see the same
//! configuration semantics.

use std::path::Path;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::BackupPipeline;
use crate::store::{s3::S3Store, ObjectStore};

pub struct App {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub pipeline: Arc<BackupPipeline>,
}

impl App {
    pub async fn bootstrap(config_path: &Path) -> Result<Self> {
        let config = Config::load(config_path)?;
        config.require_secrets()?;
        let config = Arc::new(config);

        let catalog = Arc::new(Catalog::open(&config.raw.database.path)?);

        let store: Arc<dyn ObjectStore> = Arc::new(S3Store::connect(config.object_store_container.clone()).await);
        store.test_connection().await?;

        let pipeline = Arc::new(BackupPipeline::new(config.clone(), catalog.clone(), store));

        Ok(Self {
            config,
            catalog,
            pipeline,
        })
    }
}
