//! Static site server with the team JSON API.
//!
//! ```text
//! GET /health               → {"status":"ok"}
//! GET /api/health           → {"status":"ok","service":"team-routes","timestamp":…}
//! GET /api/team             → pillars, member count, year established
//! GET /api/team/{pillar}    → echo of a known pillar, 404 otherwise
//! GET /*                    → files under the static root
//! ```
//!
//! Static responses carry a one-year `Cache-Control`; images are also marked
//! `immutable`. Directories serve their `index.html`. Paths that escape the
//! root are answered with 404.

use axum::Router;
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub const PILLARS: [&str; 4] = ["Theory", "Infrastructure", "Cinema", "Healing"];
pub const CACHE_IMMUTABLE: &str = "public, max-age=31536000, immutable";
pub const CACHE_DEFAULT: &str = "public, max-age=31536000";

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("static root not found: {0}")]
    RootMissing(PathBuf),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),
}

#[derive(Debug)]
pub struct AppState {
    pub root: PathBuf,
}

pub fn router(root: PathBuf) -> Router {
    let state = Arc::new(AppState { root });
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(api_health))
        .route("/api/team", get(team))
        .route("/api/team/{pillar}", get(team_pillar))
        .route("/", get(static_index))
        .route("/{*path}", get(static_any))
        .with_state(state)
}

/// Bind `addr` and serve until the process is interrupted.
pub async fn serve(root: &Path, addr: SocketAddr) -> Result<(), ServerError> {
    let root = root
        .canonicalize()
        .map_err(|_| ServerError::RootMissing(root.to_path_buf()))?;
    let app = router(root.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(root = %root.display(), "RTS running on http://localhost:{}", addr.port());
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .map_err(ServerError::Serve)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn api_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "team-routes",
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    }))
}

async fn team() -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": "Team data endpoint",
        "data": {
            "pillars": PILLARS,
            "members": 4,
            "established": "2024",
        }
    }))
}

async fn team_pillar(AxumPath(pillar): AxumPath<String>) -> Response {
    if PILLARS.iter().any(|p| p.eq_ignore_ascii_case(&pillar)) {
        Json(json!({
            "status": "success",
            "pillar": pillar,
            "message": format!("{pillar} pillar data"),
        }))
        .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "message": "Pillar not found" })),
        )
            .into_response()
    }
}

async fn static_index(State(state): State<Arc<AppState>>) -> Response {
    serve_path(&state.root, "").await
}

async fn static_any(
    AxumPath(path): AxumPath<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    serve_path(&state.root, &path).await
}

/// Relative path made only of normal components, or `None` when it would
/// leave the root.
pub fn sanitize(raw: &str) -> Option<PathBuf> {
    let rel = PathBuf::from(raw.trim_start_matches('/'));
    rel.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        .then_some(rel)
}

/// File to serve for `raw` under `root`, if any.
pub fn resolve(root: &Path, raw: &str) -> Option<PathBuf> {
    let path = root.join(sanitize(raw)?);
    if path.is_dir() {
        let index = path.join("index.html");
        return index.is_file().then_some(index);
    }
    path.is_file().then_some(path)
}

pub fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

pub fn cache_control(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jpg" | "png" | "svg" | "webp") => CACHE_IMMUTABLE,
        _ => CACHE_DEFAULT,
    }
}

async fn serve_path(root: &Path, raw: &str) -> Response {
    let Some(file) = resolve(root, raw) else {
        debug!(path = raw, "not found");
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };
    let bytes = match tokio::fs::read(&file).await {
        Ok(b) => b,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to read {}: {e}", file.display()),
            )
                .into_response();
        }
    };
    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(&file)),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control(&file)),
    );
    response
}
