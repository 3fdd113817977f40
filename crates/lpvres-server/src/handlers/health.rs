use crate::error::{ApiError, Result};
use crate::AppState;
use axum::extract::{OriginalUri, State};
use std::sync::Arc;

/// Health endpoint probed by the scheduler's extender configuration
pub async fn health() -> &'static str {
    "OK"
}

/// Health check endpoint
pub async fn healthz() -> &'static str {
    "ok"
}

/// Liveness probe
pub async fn livez() -> &'static str {
    "ok"
}

/// Readiness probe, failing until the cluster cache has synced once
pub async fn readyz(State(state): State<Arc<AppState>>) -> Result<&'static str> {
    if state.cache.has_synced() {
        Ok("ok")
    } else {
        Err(ApiError::NotReady(
            "cluster cache has not synced yet".to_string(),
        ))
    }
}

/// Fallback for unknown routes
pub async fn not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}
