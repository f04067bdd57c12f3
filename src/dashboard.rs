//! Thin HTTP dashboard collaborator (§6 [EXPANSION]).
//!
//! A genuine external collaborator, not business logic: every handler
//! borrows `Arc<Catalog>`/`Arc<BackupPipeline>` and does nothing but call
//! into them and serialize the result. No auth — this binds to
//! `web.host`/`web.port` from the config, which a user is expected to keep
//! on localhost or behind their own reverse proxy.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::app::App;

#[derive(Clone)]
struct DashboardState {
    app: Arc<App>,
}

pub fn router(app: Arc<App>) -> Router {
    let state = DashboardState { app };
    Router::new()
        .route("/api/versions/*path", get(versions))
        .route("/api/search", get(search))
        .route("/api/stats", get(stats))
        .route("/api/backup/now", post(backup_now))
        .route("/api/cleanup/now", post(cleanup_now))
        .route("/api/restore/:id/progress", get(restore_progress))
        .with_state(state)
}

#[derive(Serialize)]
struct VersionView {
    id: i64,
    version: u32,
    backup_date: String,
    original_size: u64,
    encrypted_size: u64,
    object_key: String,
}

async fn versions(
    State(state): State<DashboardState>,
    AxumPath(path): AxumPath<String>,
) -> Json<Vec<VersionView>> {
    let records = state
        .app
        .catalog
        .get_file_versions(&path, &state.app.config.device_id)
        .unwrap_or_default();

    Json(
        records
            .into_iter()
            .map(|r| VersionView {
                id: r.id,
                version: r.version,
                backup_date: r.backup_date.to_rfc3339(),
                original_size: r.original_size,
                encrypted_size: r.encrypted_size,
                object_key: r.object_key,
            })
            .collect(),
    )
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
}

#[derive(Serialize)]
struct SearchHit {
    path: String,
    latest_backup: String,
}

async fn search(State(state): State<DashboardState>, Query(params): Query<SearchQuery>) -> Json<Vec<SearchHit>> {
    let hits = state
        .app
        .catalog
        .search_backups(&params.q, &state.app.config.device_id, 50)
        .unwrap_or_default();

    Json(
        hits.into_iter()
            .map(|(path, latest)| SearchHit {
                path,
                latest_backup: latest.to_rfc3339(),
            })
            .collect(),
    )
}

async fn stats(State(state): State<DashboardState>) -> Json<crate::catalog::StorageStats> {
    Json(
        state
            .app
            .catalog
            .get_storage_stats(&state.app.config.device_id)
            .unwrap_or_default(),
    )
}

#[derive(Serialize)]
struct TriggerResult {
    ok: bool,
    message: String,
}

async fn backup_now(State(state): State<DashboardState>) -> Json<TriggerResult> {
    match state.app.pipeline.process_queue().await {
        Ok(summary) => Json(TriggerResult {
            ok: true,
            message: format!(
                "{} succeeded, {} skipped, {} failed",
                summary.succeeded, summary.skipped, summary.failed
            ),
        }),
        Err(e) => Json(TriggerResult {
            ok: false,
            message: e.to_string(),
        }),
    }
}

async fn cleanup_now(State(state): State<DashboardState>) -> Json<TriggerResult> {
    match state.app.pipeline.cleanup_old_backups().await {
        Ok((cleaned, freed)) => Json(TriggerResult {
            ok: true,
            message: format!("cleaned {cleaned} versions, freed {freed} bytes"),
        }),
        Err(e) => Json(TriggerResult {
            ok: false,
            message: e.to_string(),
        }),
    }
}

#[derive(Serialize)]
struct ProgressView {
    bytes_done: u64,
    bytes_total: u64,
    done: bool,
    failed: bool,
}

async fn restore_progress(
    State(state): State<DashboardState>,
    AxumPath(id): AxumPath<u64>,
) -> Json<Option<ProgressView>> {
    Json(state.app.pipeline.progress().get(id).map(|p| ProgressView {
        bytes_done: p.bytes_done,
        bytes_total: p.bytes_total,
        done: p.done,
        failed: p.failed,
    }))
}
