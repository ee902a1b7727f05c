//! Health endpoints: liveness, readiness, and the admin aggregate

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use std::time::Duration;

use crate::envelope::{ok, ApiError, ApiResult};
use crate::state::AppState;
use retrace_core::Error;

/// Liveness probe: the process is up
pub async fn liveness() -> Json<serde_json::Value> {
    ok(json!({ "status": "alive" }))
}

/// Readiness probe: 503 until the database answers
pub async fn readiness(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let deadline = Duration::from_secs(state.config.database.probe_timeout_secs);
    state
        .db
        .probe(deadline)
        .await
        .map_err(|_| ApiError(Error::dependency("database not ready")))?;
    Ok(ok(json!({ "status": "ready" })))
}

/// Aggregate health: database probe plus worker heartbeat age
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let deadline = Duration::from_secs(state.config.database.probe_timeout_secs);
    let database_healthy = state.db.probe(deadline).await.is_ok();

    let now = Utc::now();
    let stale_after = state.config.worker.heartbeat_stale_secs;
    let worker = match state.worker_stats.latest().await {
        Ok(Some(row)) => {
            let status = if row.is_stale(now, stale_after) {
                "unhealthy"
            } else {
                "healthy"
            };
            json!({
                "status": status,
                "mode": row.worker_mode,
                "lastHeartbeat": row.last_heartbeat,
                "heartbeatAgeSecs": row.heartbeat_age_secs(now),
            })
        }
        Ok(None) => json!({ "status": "unavailable" }),
        Err(_) => json!({ "status": "unknown" }),
    };

    let worker_healthy = worker["status"] == "healthy";
    let status = if !database_healthy {
        "unhealthy"
    } else if !worker_healthy {
        "degraded"
    } else {
        "healthy"
    };

    Ok(ok(json!({
        "status": status,
        "database": { "status": if database_healthy { "healthy" } else { "unhealthy" } },
        "worker": worker,
    })))
}
