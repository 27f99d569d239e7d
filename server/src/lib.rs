//! HTTP surface for the gallery.
//!
//! Serves the embedded gallery page, JSON views over the shared catalog and
//! scan progress, a scan trigger, and raw image bytes confined to the scan
//! root.

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use indexer::{Indexer, IndexerError};
use scanner::ProgressSnapshot;
use serde::Deserialize;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

pub const DEFAULT_PORT: u16 = 8080;
/// How many consecutive ports to probe when the configured one is taken.
pub const PORT_PROBE_RANGE: u16 = 10;

const GALLERY_PAGE: &str = include_str!("../assets/gallery.html");

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Bind Error: {0}")]
    Bind(String),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

struct AppState {
    indexer: Arc<Indexer>,
}

/// Builds the gallery router over a shared indexer.
pub fn router(indexer: Arc<Indexer>) -> Router {
    let state = Arc::new(AppState { indexer });
    Router::new()
        .route("/", get(gallery_page))
        .route("/api/images", get(list_images))
        .route("/api/progress", get(scan_progress))
        .route("/api/categories", get(list_categories))
        .route("/api/faces", get(list_face_groups))
        .route("/api/scan", post(trigger_scan))
        .route("/images/*path", get(serve_image))
        .with_state(state)
}

/// Binds the first free port at or after `port`, probing a bounded range.
#[cfg_attr(feature = "trace-spans", tracing::instrument)]
pub async fn bind_available(port: u16) -> Result<TcpListener, ServerError> {
    let range = probe_range(port);
    let end = *range.end();
    for candidate in range {
        match TcpListener::bind(("0.0.0.0", candidate)).await {
            Ok(listener) => {
                if candidate != port {
                    tracing::warn!("Port {} is taken, falling back to {}", port, candidate);
                }
                return Ok(listener);
            }
            Err(e) => {
                tracing::debug!("Port {} unavailable: {}", candidate, e);
            }
        }
    }
    Err(ServerError::Bind(format!(
        "no free port in {}..={}",
        port, end
    )))
}

/// Ports to try for a configured start: the probe window after it, truncated
/// at the top of the port space. The start itself is always included.
fn probe_range(start: u16) -> RangeInclusive<u16> {
    start..=start.saturating_add(PORT_PROBE_RANGE - 1)
}

/// Runs the gallery server until the process exits.
#[cfg_attr(feature = "trace-spans", tracing::instrument(skip(indexer)))]
pub async fn serve(indexer: Arc<Indexer>, port: u16) -> Result<(), ServerError> {
    let listener = bind_available(port).await?;
    let addr = listener.local_addr()?;
    tracing::info!("Gallery available at http://{}", addr);
    axum::serve(listener, router(indexer)).await?;
    Ok(())
}

async fn gallery_page() -> Html<&'static str> {
    Html(GALLERY_PAGE)
}

#[derive(Debug, Deserialize)]
struct ImagesQuery {
    category: Option<String>,
}

async fn list_images(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImagesQuery>,
) -> Response {
    let catalog = state.indexer.catalog();
    let images = match query.category.as_deref() {
        Some(category) => catalog.images_by_category(category),
        None => catalog.images(),
    };
    match images {
        Ok(images) => (StatusCode::OK, Json(images)).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn scan_progress(State(state): State<Arc<AppState>>) -> Json<ProgressSnapshot> {
    Json(state.indexer.progress().snapshot())
}

async fn list_categories(State(state): State<Arc<AppState>>) -> Response {
    match state.indexer.catalog().category_summary() {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn list_face_groups(State(state): State<Arc<AppState>>) -> Response {
    match state.indexer.catalog().face_groups() {
        Ok(groups) => (StatusCode::OK, Json(groups)).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn trigger_scan(State(state): State<Arc<AppState>>) -> Response {
    match state.indexer.spawn_scan(None) {
        Ok(_) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "started" })),
        )
            .into_response(),
        Err(IndexerError::ScanInProgress) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "scanning",
                "message": "A scan is already running"
            })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

async fn serve_image(
    State(state): State<Arc<AppState>>,
    UrlPath(relative): UrlPath<String>,
) -> Response {
    let root = state.indexer.root().to_path_buf();
    let resolved = match resolve_under_root(&root, &relative).await {
        Some(path) => path,
        None => return not_found(),
    };
    match tokio::fs::read(&resolved).await {
        Ok(bytes) => {
            let content_type = content_type_for(&resolved);
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) => {
            tracing::debug!("Image read failed for {}: {}", resolved.display(), e);
            not_found()
        }
    }
}

/// Resolves a request path against the scan root. Symlinks and `..` segments
/// are settled by canonicalization, so anything that escapes the root comes
/// back as `None`.
async fn resolve_under_root(root: &Path, relative: &str) -> Option<PathBuf> {
    let root = tokio::fs::canonicalize(root).await.ok()?;
    let candidate = tokio::fs::canonicalize(root.join(relative)).await.ok()?;
    candidate.starts_with(&root).then_some(candidate)
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        _ => "application/octet-stream",
    }
}

fn internal_error(e: impl fmt::Display) -> Response {
    tracing::error!("Request failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "internal error" })),
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
        .into_response()
}
