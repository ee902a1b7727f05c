//! Build and runtime info

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::envelope::ok;
use crate::state::AppState;

pub async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    ok(json!({
        "name": "retrace",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment.to_string(),
        "workerMode": state.config.worker.mode.to_string(),
        "uptimeSecs": state.uptime_secs(),
    }))
}
