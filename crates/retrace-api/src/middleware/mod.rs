//! Middleware for the retrace API

pub mod platform;
pub mod security;
pub mod snapshot;

pub use platform::platform_geo_middleware;
pub use security::security_headers_middleware;
pub use snapshot::snapshot_middleware;

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::envelope::ApiError;
use crate::state::AppState;
use retrace_core::{AuthContext, AuthService, Error, Result};

/// Admin-only middleware: verifies the bearer token and requires the admin
/// role. The verified identity is attached to both the request (handlers)
/// and the response (snapshot capture).
pub async fn admin_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // In-process replays carry the replay caller's verified identity as a
    // request extension; sensitive headers are never stored, so there is no
    // bearer token to re-verify
    let ctx = match request.extensions().get::<AuthContext>() {
        Some(ctx) => ctx.clone(),
        None => match authenticate_admin(&state, request.headers()) {
            Ok(ctx) => ctx,
            Err(e) => return ApiError(e).into_response(),
        },
    };

    if !ctx.is_admin() {
        return ApiError(Error::forbidden("Admin access required")).into_response();
    }

    request.extensions_mut().insert(ctx.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

fn authenticate_admin(state: &AppState, headers: &HeaderMap) -> Result<AuthContext> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| Error::unauthorized("Missing authorization header"))?;

    let token = AuthService::extract_bearer_token(header)
        .ok_or_else(|| Error::unauthorized("Invalid authorization header"))?;

    state.auth.verify_admin(token)
}
