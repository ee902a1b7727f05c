//! Replay engine
//!
//! Rehydrates a stored snapshot into an outbound request and dispatches it
//! in-process against the running router. The marker header keeps the
//! replayed execution out of the snapshot table.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Method, Request, Uri};
use std::time::Instant;
use tower::ServiceExt;

use crate::middleware::snapshot::REPLAY_MARKER_HEADER;
use crate::state::AppState;
use retrace_core::snapshot::body_value;
use retrace_core::{AuthContext, Error, RequestSnapshot, Result};

/// Headers never forwarded on replay
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "host",
];

/// What the caller gets back from a replay
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub status_code: u16,
    pub headers: serde_json::Value,
    pub body: serde_json::Value,
    pub duration: u64,
}

/// Refuse replays the policy does not allow
pub fn check_policy(state: &AppState, snapshot: &RequestSnapshot) -> Result<()> {
    let method_allowed = state
        .config
        .replay
        .allowed_methods
        .iter()
        .any(|m| m.eq_ignore_ascii_case(&snapshot.method));
    if !method_allowed {
        return Err(Error::forbidden(format!(
            "Replay not allowed for method {}",
            snapshot.method
        )));
    }

    let path_denied = state
        .config
        .replay
        .denied_path_prefixes
        .iter()
        .any(|prefix| snapshot.path.starts_with(prefix.as_str()));
    if path_denied {
        return Err(Error::forbidden(format!(
            "Replay not allowed for path {}",
            snapshot.path
        )));
    }

    Ok(())
}

/// Re-issue the captured request and measure the round trip
///
/// `caller` is the verified identity of whoever triggered the replay; the
/// rebuilt request carries it as an extension because the stored headers
/// hold no credentials.
pub async fn replay_snapshot(
    state: &AppState,
    snapshot: &RequestSnapshot,
    caller: &AuthContext,
) -> Result<ReplayOutcome> {
    check_policy(state, snapshot)?;

    let router = state
        .router
        .get()
        .cloned()
        .ok_or_else(|| Error::internal("router not initialized"))?;

    let mut request = rebuild_request(snapshot)?;
    request.extensions_mut().insert(caller.clone());
    let started = Instant::now();

    let response = router
        .oneshot(request)
        .await
        .map_err(|_| Error::internal("in-process dispatch failed"))?;
    let duration = started.elapsed().as_millis() as u64;

    let status_code = response.status().as_u16();
    let mut headers = serde_json::Map::new();
    for (name, value) in response.headers() {
        headers.insert(
            name.as_str().to_string(),
            serde_json::Value::String(value.to_str().unwrap_or("<binary>").to_string()),
        );
    }
    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| Error::internal(format!("failed to read replay response: {}", e)))?;
    let body = body_value(
        &bytes,
        content_type.as_deref(),
        state.config.snapshot.max_body_bytes,
    );

    Ok(ReplayOutcome {
        status_code,
        headers: serde_json::Value::Object(headers),
        body,
        duration,
    })
}

/// Identical method, path+query, headers minus hop-by-hop, original body
fn rebuild_request(snapshot: &RequestSnapshot) -> Result<Request<Body>> {
    let method = Method::from_bytes(snapshot.method.as_bytes())
        .map_err(|_| Error::validation("method", "invalid_method", "Unknown HTTP method"))?;

    let uri: Uri = build_uri(&snapshot.path, &snapshot.query)
        .parse()
        .map_err(|_| Error::internal("stored path is not a valid URI"))?;

    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(headers) = snapshot.headers.as_object() {
        for (name, value) in headers {
            if HOP_BY_HOP.contains(&name.as_str()) {
                continue;
            }
            let (Ok(name), Some(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                value.as_str().and_then(|v| HeaderValue::from_str(v).ok()),
            ) else {
                continue;
            };
            builder = builder.header(name, value);
        }
    }
    builder = builder.header(REPLAY_MARKER_HEADER, "1");

    let body = match &snapshot.body {
        serde_json::Value::Null => Body::empty(),
        serde_json::Value::String(raw) => Body::from(raw.clone()),
        structured => Body::from(serde_json::to_vec(structured)?),
    };

    builder
        .body(body)
        .map_err(|e| Error::internal(format!("failed to rebuild request: {}", e)))
}

fn build_uri(path: &str, query: &serde_json::Value) -> String {
    let pairs: Vec<String> = query
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|v| {
                        format!(
                            "{}={}",
                            url::form_urlencoded::byte_serialize(key.as_bytes())
                                .collect::<String>(),
                            url::form_urlencoded::byte_serialize(v.as_bytes())
                                .collect::<String>()
                        )
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if pairs.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, pairs.join("&"))
    }
}
