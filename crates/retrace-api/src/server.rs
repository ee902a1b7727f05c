//! Router assembly and HTTP server lifecycle

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::{
    admin_middleware, platform_geo_middleware, security_headers_middleware, snapshot_middleware,
};
use crate::routes;
use crate::state::AppState;
use retrace_core::{auto_migrate, create_pool, Config, Database, Result};

/// Connect, migrate, and assemble application state
pub async fn create_app_state(config: Arc<Config>) -> Result<AppState> {
    let pool = create_pool(&config.database).await?;
    auto_migrate(&pool).await?;
    AppState::new(config, Database::new(pool))
}

/// Build the full router and wire it into the state for in-process replay
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Probes stay reachable without credentials
    let public = Router::new()
        .route("/health/liveness", get(routes::health::liveness))
        .route("/health/readiness", get(routes::health::readiness));

    let admin = Router::new()
        .route("/health", get(routes::health::health))
        .route("/info", get(routes::info::info))
        .route("/replay", get(routes::replay::list))
        .route("/replay/:id", get(routes::replay::get_one))
        .route("/replay/:id/replay", post(routes::replay::replay))
        .route("/worker/stats", get(routes::worker::stats))
        .route("/worker/queue/stats", get(routes::worker::queue_stats))
        .route("/worker/jobs", get(routes::worker::jobs))
        // Generic tables; static routes above take precedence
        .route("/:table", get(routes::tables::list).post(routes::tables::create))
        .route(
            "/:table/:id",
            get(routes::tables::get_one)
                .patch(routes::tables::update)
                .delete(routes::tables::remove),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ));

    let router = Router::new()
        .nest("/api/v1", Router::new().merge(public).merge(admin))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            snapshot_middleware,
        ))
        // Runs before the snapshot capture so the platform extension is
        // in place when geo resolves
        .layer(middleware::from_fn(platform_geo_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    // The replay engine dispatches against this same router
    let _ = state.router.set(router.clone());
    router
}

/// Run the API process until SIGINT/SIGTERM
pub async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| retrace_core::Error::config(format!("Invalid host: {}", e)))?,
        config.server.port,
    ));

    let state = create_app_state(config.clone()).await?;
    let app = build_router(state);

    info!("retrace API listening on http://{}", addr);
    log_routes();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| retrace_core::Error::dependency(format!("bind failed: {}", e)))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| retrace_core::Error::internal(format!("server error: {}", e)))?;

    info!("retrace API stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

fn log_routes() {
    info!("Available routes:");
    info!("  GET    /api/v1/health             - aggregate health (admin)");
    info!("  GET    /api/v1/health/liveness    - liveness probe");
    info!("  GET    /api/v1/health/readiness   - readiness probe");
    info!("  GET    /api/v1/info               - build/version/uptime (admin)");
    info!("  *      /api/v1/users[...]         - generic CRUD (admin)");
    info!("  *      /api/v1/logs[...]          - generic CRUD (admin)");
    info!("  *      /api/v1/metrics[...]       - generic CRUD (admin)");
    info!("  GET    /api/v1/replay             - list snapshots (admin)");
    info!("  GET    /api/v1/replay/:id         - snapshot detail (admin)");
    info!("  POST   /api/v1/replay/:id/replay  - re-execute (admin)");
    info!("  GET    /api/v1/worker/stats       - latest heartbeat (admin)");
    info!("  GET    /api/v1/worker/queue/stats - proxied worker stats (admin)");
    info!("  GET    /api/v1/worker/jobs        - proxied job list (admin)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    /// State over a lazy pool: no database is contacted unless a handler
    /// actually queries it
    fn test_state() -> AppState {
        let config = Arc::new(Config::default());
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/retrace_test")
            .unwrap();
        AppState::new(config, Database::new(pool)).unwrap()
    }

    fn admin_token(state: &AppState) -> String {
        state
            .auth
            .issue_access_token(1, "root@example.com", "admin")
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_liveness_needs_no_auth() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health/liveness")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["data"]["status"], "alive");
    }

    #[tokio::test]
    async fn test_admin_route_without_token_is_401() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/users")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_route_with_member_token_is_403() {
        let state = test_state();
        let token = state
            .auth
            .issue_access_token(2, "user@example.com", "member")
            .unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/users")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Admin access required");
    }

    #[tokio::test]
    async fn test_info_with_admin_token() {
        let state = test_state();
        let token = admin_token(&state);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/info")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["data"]["name"], "retrace");
        assert_eq!(body["data"]["environment"], "development");
    }

    #[tokio::test]
    async fn test_security_headers_present() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health/liveness")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(
            headers.get("referrer-policy").unwrap(),
            "strict-origin-when-cross-origin"
        );
        assert!(headers.contains_key("content-security-policy"));
        assert!(headers.contains_key("permissions-policy"));
        // HSTS only in production
        assert!(!headers.contains_key("strict-transport-security"));
    }

    #[tokio::test]
    async fn test_unknown_table_is_404() {
        let state = test_state();
        let token = admin_token(&state);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/payments")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_filter_operator_is_422() {
        let state = test_state();
        let token = admin_token(&state);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/users?age__wat=30")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["error"]["name"], "ValidationError");
        assert_eq!(body["error"]["issues"][0]["path"], "age__wat");
    }

    #[tokio::test]
    async fn test_router_cell_is_set_for_replay() {
        let state = test_state();
        let _app = build_router(state.clone());
        assert!(state.router.get().is_some());
    }
}
