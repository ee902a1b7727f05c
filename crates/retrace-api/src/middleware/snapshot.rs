//! Request snapshot capture
//!
//! Wraps every request under the snapshot prefix: captures method, path,
//! query, redacted headers, and a size-bounded body; resolves geo; observes
//! the response through a size-bounded tee; then persists the snapshot on a
//! spawned task so the response is never blocked. Replay-origin requests
//! (marker header) short-circuit so a replay never snapshots itself.

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, error};

use crate::state::AppState;
use retrace_core::snapshot::{body_value, redact_headers, PlatformGeo};
use retrace_core::{AuthContext, NewSnapshot};

/// Marker set on replayed requests so the middleware skips them
pub const REPLAY_MARKER_HEADER: &str = "x-retrace-replay";

pub async fn snapshot_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    // Health probes under the prefix are traffic, not API usage
    let health_prefix = format!("{}/health", state.config.snapshot.prefix);
    let skip = !path.starts_with(&state.config.snapshot.prefix)
        || path.starts_with(&health_prefix)
        || request.headers().contains_key(REPLAY_MARKER_HEADER);
    if skip {
        return next.run(request).await;
    }

    let started = Instant::now();
    let method = request.method().to_string();
    let query = query_map(request.uri().query());
    let cap = state.config.snapshot.max_body_bytes;
    let extra_deny = state.config.snapshot.redact_headers.clone();

    let request_headers = redact_headers(request.headers(), &extra_deny);
    let request_content_type = content_type(request.headers());

    let platform_geo = request.extensions().get::<PlatformGeo>().cloned();
    let peer_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    let geo = state
        .geo
        .resolve(request.headers(), platform_geo.as_ref(), peer_ip);

    // Buffer the request body; the handler gets the same bytes back
    let (parts, body) = request.into_parts();
    let request_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    let stored_body = body_value(&request_bytes, request_content_type.as_deref(), cap);
    let request = Request::from_parts(parts, Body::from(request_bytes));

    let response = next.run(request).await;

    let status_code = response.status().as_u16() as i32;
    let user_id = response
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| ctx.user_id);
    let response_headers = redact_headers(response.headers(), &extra_deny);
    let response_content_type = content_type(response.headers());

    // Size-bounded tee: buffer, store a truncated copy, rebuild from the
    // same bytes
    let (parts, body) = response.into_parts();
    let response_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "failed to read response body");
            Bytes::new()
        }
    };
    let stored_response = body_value(&response_bytes, response_content_type.as_deref(), cap);
    let response = Response::from_parts(parts, Body::from(response_bytes));

    let snapshot = NewSnapshot {
        method,
        path,
        query,
        body: stored_body,
        headers: request_headers,
        user_id,
        version: env!("CARGO_PKG_VERSION").to_string(),
        stage: state.config.environment.to_string(),
        status_code,
        response_body: stored_response,
        response_headers,
        duration_ms: started.elapsed().as_millis() as i64,
        geo,
    };

    // Persistence happens off the response path; failures are logged only
    let repository = state.snapshots.clone();
    tokio::spawn(async move {
        match repository.insert(snapshot).await {
            Ok(id) => debug!(snapshot_id = id, "snapshot persisted"),
            Err(e) => error!(error = %e, "failed to persist snapshot"),
        }
    });

    response
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Parse the query string into a JSON map; repeated keys join with commas
fn query_map(query: Option<&str>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match map.entry(key.into_owned()) {
                serde_json::map::Entry::Occupied(mut entry) => {
                    if let serde_json::Value::String(existing) = entry.get_mut() {
                        existing.push(',');
                        existing.push_str(&value);
                    }
                }
                serde_json::map::Entry::Vacant(entry) => {
                    entry.insert(serde_json::Value::String(value.into_owned()));
                }
            }
        }
    }
    serde_json::Value::Object(map)
}
