//! Worker introspection surface on the API side
//!
//! `/worker/stats` reads the heartbeat row from the database; the queue and
//! job listings proxy to the worker's own HTTP server with a 5 s deadline.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::envelope::{ok, ApiResult};
use crate::state::AppState;
use retrace_core::Error;

/// GET /worker/stats: latest heartbeat row
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let row = state
        .worker_stats
        .latest()
        .await?
        .ok_or_else(|| Error::dependency("No worker heartbeat recorded"))?;
    Ok(ok(json!(row)))
}

/// GET /worker/queue/stats: proxied to the worker process
pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    proxy(&state, "/worker/queue/stats").await
}

/// GET /worker/jobs: proxied to the worker process
pub async fn jobs(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    proxy(&state, "/worker/jobs").await
}

async fn proxy(state: &AppState, path: &str) -> ApiResult<Json<serde_json::Value>> {
    let url = format!("{}{}", state.config.worker.url.trim_end_matches('/'), path);

    let response = state
        .worker_client
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::dependency(format!("worker unreachable: {}", e)))?;

    if !response.status().is_success() {
        return Err(Error::dependency(format!(
            "worker returned status {}",
            response.status()
        ))
        .into());
    }

    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| Error::dependency(format!("worker returned invalid JSON: {}", e)))?;
    Ok(Json(body))
}
