//! Response envelope and error mapping
//!
//! Every payload travels as `{data, error, metadata}`. Errors become
//! `{name, message, issues?}` with the status from the taxonomy; plain 404s
//! keep the terse `{message}` shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use once_cell::sync::Lazy;
use serde_json::json;

use retrace_core::Error;

/// Whether 500 bodies may carry the error chain
static PRODUCTION: Lazy<bool> = Lazy::new(|| {
    std::env::var("NODE_ENV")
        .map(|v| v.eq_ignore_ascii_case("production"))
        .unwrap_or(false)
});

/// Successful envelope without metadata
pub fn ok(data: serde_json::Value) -> Json<serde_json::Value> {
    Json(json!({ "data": data, "error": null, "metadata": null }))
}

/// Successful envelope with metadata (pagination and friends)
pub fn ok_with_meta(
    data: serde_json::Value,
    metadata: serde_json::Value,
) -> Json<serde_json::Value> {
    Json(json!({ "data": data, "error": null, "metadata": metadata }))
}

/// Newtype so core errors can become responses
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status = StatusCode::from_u16(error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status == StatusCode::NOT_FOUND {
            return (status, Json(json!({ "message": error.to_string() }))).into_response();
        }

        let mut body = json!({
            "name": error.name(),
            "message": error.to_string(),
        });
        if let Some(issues) = error.issues() {
            body["issues"] = json!(issues);
        }
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %error, "request failed");
            if !*PRODUCTION {
                if let Some(source) = std::error::Error::source(&error) {
                    body["stack"] = json!(source.to_string());
                }
            } else {
                // Production strips everything but the message
                body["message"] = json!("Internal error");
            }
        }

        (
            status,
            Json(json!({ "data": null, "error": body, "metadata": null })),
        )
            .into_response()
    }
}

/// Shorthand result for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(response: Response) -> serde_json::Value {
        let body = response.into_body();
        let bytes = tokio_test::block_on(axum::body::to_bytes(body, usize::MAX)).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_validation_error_carries_issues() {
        let response =
            ApiError(Error::validation("age", "invalid_type", "expected number")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_of(response);
        assert_eq!(body["error"]["name"], "ValidationError");
        assert_eq!(body["error"]["issues"][0]["path"], "age");
    }

    #[test]
    fn test_not_found_uses_terse_shape() {
        let response = ApiError(Error::not_found("Snapshot not found")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_of(response);
        assert_eq!(body["message"], "Snapshot not found");
        assert!(body.get("data").is_none());
    }

    #[test]
    fn test_forbidden_message_preserved() {
        let response = ApiError(Error::forbidden("Admin access required")).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_of(response);
        assert_eq!(body["error"]["message"], "Admin access required");
        assert_eq!(body["error"]["name"], "AuthError");
    }

    #[test]
    fn test_dependency_unavailable_is_503() {
        let response = ApiError(Error::dependency("worker unreachable")).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_ok_envelope_shape() {
        let Json(body) = ok(json!({"answer": 42}));
        assert_eq!(body["data"]["answer"], 42);
        assert!(body["error"].is_null());
        assert!(body["metadata"].is_null());
    }
}
