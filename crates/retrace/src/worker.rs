//! Worker process runtime
//!
//! Wires queue, scheduler, registry, dispatcher, and stats publisher
//! together, serves the introspection endpoints (local mode), and drains
//! in-flight work on shutdown within the configured bound.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use retrace_core::jobs::{
    build_queue, build_scheduler, DeadLetterBuffer, Dispatcher, EnqueueOptions, JobContext,
    JobRegistry, JobType, Queue, Scheduler, StatsPublisher,
};
use retrace_core::{
    auto_migrate, create_pool, Config, Database, Error, Result, WorkerMode,
    WorkerStatsRepository,
};

#[derive(Clone)]
struct WorkerCtx {
    queue: Arc<Queue>,
    scheduler: Arc<Scheduler>,
    registry: Arc<JobRegistry>,
    dispatcher: Arc<Dispatcher>,
    dead_letters: Arc<DeadLetterBuffer>,
    stats: Arc<StatsPublisher>,
}

/// Run the worker process until SIGINT/SIGTERM
pub async fn run(mut config: Config) -> Result<()> {
    // Frozen-container semantics: one connection, held across invocations
    if config.worker.mode == WorkerMode::Lambda {
        config.database.pool_size = 1;
        config.database.idle_timeout_secs = config.database.idle_timeout_secs.max(3600);
    }
    let config = Arc::new(config);

    let pool = create_pool(&config.database).await?;
    auto_migrate(&pool).await?;
    let db = Database::new(pool);

    let queue = Arc::new(build_queue(&config).await?);
    let scheduler = Arc::new(build_scheduler(&config, queue.clone()));
    scheduler.seed_defaults().await?;

    let registry = Arc::new(JobRegistry::with_default_handlers());
    let cancel = CancellationToken::new();
    let dead_letters = Arc::new(DeadLetterBuffer::default());

    let dispatcher = Arc::new(Dispatcher::new(
        queue.clone(),
        registry.clone(),
        JobContext::new(db.clone(), config.clone()),
        Duration::from_millis(config.worker.poll_interval_ms),
        cancel.clone(),
        dead_letters.clone(),
    ));

    let stats = Arc::new(StatsPublisher::new(
        queue.clone(),
        scheduler.clone(),
        registry.clone(),
        WorkerStatsRepository::new(db.clone()),
        config.worker.mode.to_string(),
        Duration::from_secs(config.worker.heartbeat_interval_secs),
        cancel.clone(),
    ));

    info!(mode = %config.worker.mode, "worker starting");

    let dispatcher_task = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run().await })
    };

    // Local mode heartbeats on an interval; in lambda mode the container is
    // frozen between events, so stats go out at the invocation boundaries
    let stats_task = match config.worker.mode {
        WorkerMode::Local => {
            let stats = stats.clone();
            Some(tokio::spawn(async move { stats.run().await }))
        }
        WorkerMode::Lambda => {
            stats.publish().await;
            None
        }
    };

    let introspection_task = match config.worker.mode {
        WorkerMode::Local => Some(serve_introspection(
            &config,
            WorkerCtx {
                queue: queue.clone(),
                scheduler: scheduler.clone(),
                registry,
                dispatcher,
                dead_letters,
                stats: stats.clone(),
            },
            cancel.clone(),
        )?),
        WorkerMode::Lambda => None,
    };

    retrace_api::shutdown_signal().await;
    info!("worker shutting down");

    // Stop accepting new work, then drain in-flight within the bound
    scheduler.stop_all().await;
    cancel.cancel();

    let drain = Duration::from_secs(config.worker.drain_timeout_secs);
    if tokio::time::timeout(drain, dispatcher_task).await.is_err() {
        warn!(
            drain_secs = drain.as_secs(),
            "drain bound exceeded; in-flight jobs return via visibility timeout"
        );
    }

    if let Some(task) = stats_task {
        let _ = task.await;
    } else {
        stats.publish().await;
    }
    if let Some(task) = introspection_task {
        let _ = task.await;
    }

    info!("worker stopped");
    Ok(())
}

/// Introspection HTTP server on the worker's own port
fn serve_introspection(
    config: &Config,
    ctx: WorkerCtx,
    cancel: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| Error::config(format!("Invalid host: {}", e)))?,
        config.worker.port,
    ));

    let app = Router::new()
        .route("/worker/jobs", get(worker_jobs))
        .route("/worker/queue/stats", get(worker_queue_stats))
        .route("/worker/scheduler/jobs", get(worker_scheduler_jobs))
        .route("/worker/stats", get(worker_stats))
        .route("/jobs/enqueue", post(enqueue_job))
        .with_state(ctx);

    info!("worker introspection listening on http://{}", addr);

    Ok(tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "failed to bind introspection port");
                return;
            }
        };
        let shutdown = async move { cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(error = %e, "introspection server error");
        }
    }))
}

/// GET /worker/jobs
async fn worker_jobs(State(ctx): State<WorkerCtx>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "availableJobs": ctx.registry.jobs(),
        "counters": ctx.dispatcher.counters(),
        "deadLetters": ctx.dead_letters.list().await,
    }))
}

/// GET /worker/queue/stats
async fn worker_queue_stats(State(ctx): State<WorkerCtx>) -> impl IntoResponse {
    match ctx.queue.stats().await {
        Ok(stats) => Json(serde_json::json!({
            "queue": stats,
            "pending": ctx.queue.pending_summaries().await,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// GET /worker/scheduler/jobs
async fn worker_scheduler_jobs(State(ctx): State<WorkerCtx>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "scheduledJobs": ctx.scheduler.list().await }))
}

/// GET /worker/stats
async fn worker_stats(State(ctx): State<WorkerCtx>) -> Json<serde_json::Value> {
    let report = ctx.stats.collect().await;
    Json(serde_json::json!(report))
}

#[derive(serde::Deserialize)]
struct EnqueueRequest {
    #[serde(rename = "type")]
    job_type: String,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    options: Option<EnqueueOptions>,
}

/// POST /jobs/enqueue
async fn enqueue_job(
    State(ctx): State<WorkerCtx>,
    Json(request): Json<EnqueueRequest>,
) -> impl IntoResponse {
    let job_type = match JobType::from_str(&request.job_type) {
        Ok(job_type) => job_type,
        Err(()) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "error": format!("Unknown job type: {}", request.job_type)
                })),
            )
                .into_response()
        }
    };

    let options = request.options.unwrap_or_default();
    match ctx.queue.enqueue(job_type, request.payload, &options).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "jobId": job_id })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
