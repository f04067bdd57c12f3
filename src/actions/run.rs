//! The `run` subcommand: start the monitor, scheduler, and dashboard, then
//! block until a shutdown signal arrives.
//!
//! Mirrors `original_source/main.py`'s `BackupSystem.initialize()`/`start()`/
//! `run()`/`shutdown()` sequence: validate config, wire up the collaborators,
//! do an initial reconciling scan, start watching, start the scheduler
//! thread, and block on the shutdown flag until a signal flips it — then
//! stop the monitor and drain whatever is left in the queue before exiting.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Args;
use miette::{IntoDiagnostic, Result};
use tracing::{info, warn};

use crate::app::App;
use crate::dashboard;
use crate::monitor::{EligibilityCheck, Enqueuer, FileMonitor};
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Args)]
pub struct RunArgs {}

pub async fn run(config_path: PathBuf, _args: RunArgs) -> Result<()> {
    let app = Arc::new(App::bootstrap(&config_path).await.into_diagnostic()?);

    let monitor = Arc::new(FileMonitor::new(app.config.raw.backup.debounce_seconds));
    let eligibility: Arc<dyn EligibilityCheck> = Arc::new(app.pipeline.clone());
    let enqueuer: Arc<dyn Enqueuer> = Arc::new(app.pipeline.clone());

    let directories = app.config.raw.backup.watched_directories.clone();
    let (scanned, queued) = monitor.initial_scan(&directories, eligibility.as_ref(), enqueuer.as_ref());
    info!(scanned, queued, "initial scan complete");

    monitor
        .start(directories, eligibility, enqueuer)
        .map_err(|e| crate::error::BackupError::config(format!("failed to start file monitor: {e}")))
        .into_diagnostic()?;

    let scheduler = Scheduler::new();
    scheduler
        .install_signal_handler()
        .map_err(|e| crate::error::BackupError::config(format!("failed to install signal handler: {e}")))
        .into_diagnostic()?;
    let shutdown = scheduler.shutdown_flag();

    let scheduler_thread = {
        let config = app.config.clone();
        let catalog = app.catalog.clone();
        let pipeline = app.pipeline.clone();
        let runtime = tokio::runtime::Handle::current();
        std::thread::Builder::new()
            .name("vaultkeep-scheduler".into())
            .spawn(move || scheduler.run(config, catalog, pipeline, runtime))
            .into_diagnostic()?
    };

    let dashboard_app = app.clone();
    let dashboard_shutdown = shutdown.clone();
    let host = app.config.raw.web.host.clone();
    let port = app.config.raw.web.port;
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind((host.as_str(), port)).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(?e, host, port, "failed to bind dashboard, continuing without it");
                return;
            }
        };
        info!(host, port, "dashboard listening");
        let router = dashboard::router(dashboard_app);
        let serve = axum::serve(listener, router);
        tokio::select! {
            result = serve => {
                if let Err(e) = result {
                    warn!(?e, "dashboard server exited");
                }
            }
            _ = async {
                while !dashboard_shutdown.load(Ordering::SeqCst) {
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            } => {}
        }
    });

    info!("vaultkeep running, press ctrl-c to stop");
    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }

    info!("shutting down");
    monitor.stop();

    match app.pipeline.process_queue().await {
        Ok(summary) => info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            "final queue drain complete"
        ),
        Err(crate::error::BackupError::QueueBusy) => {}
        Err(e) => warn!(?e, "final queue drain failed"),
    }

    if let Err(e) = scheduler_thread.join() {
        warn!(?e, "scheduler thread panicked");
    }

    Ok(())
}
