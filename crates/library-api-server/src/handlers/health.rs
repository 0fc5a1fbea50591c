use crate::state::ServerContext;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    sessions: usize,
    cache_writable: bool,
}

/// GET /health - liveness plus a cache directory check. Answers 503 when
/// covers could not be persisted.
pub async fn health_check(
    State(ctx): State<ServerContext>,
) -> (StatusCode, Json<HealthResponse>) {
    let cache_writable = cache_writable(ctx.covers.root()).await;
    let (code, status) = if cache_writable {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            sessions: ctx.sessions.len(),
            cache_writable,
        }),
    )
}

/// The cache root exists (or can be created) and is not read-only.
async fn cache_writable(root: &Path) -> bool {
    if let Err(e) = tokio::fs::create_dir_all(root).await {
        warn!("Cover cache root {} unavailable: {}", root.display(), e);
        return false;
    }
    match tokio::fs::metadata(root).await {
        Ok(meta) => !meta.permissions().readonly(),
        Err(e) => {
            warn!("Cover cache root {} unreadable: {}", root.display(), e);
            false
        }
    }
}
