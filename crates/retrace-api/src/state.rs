use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use axum::Router;

use retrace_core::snapshot::GeoResolver;
use retrace_core::{
    AuthService, Config, Database, Result, SnapshotRepository, WorkerStatsRepository,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub snapshots: SnapshotRepository,
    pub worker_stats: WorkerStatsRepository,
    pub auth: AuthService,
    pub geo: Arc<GeoResolver>,

    /// Client for worker introspection calls, with the 5 s deadline baked in
    pub worker_client: reqwest::Client,

    pub started_at: Instant,

    /// Set once after the router is built; the replay engine dispatches
    /// against it in-process
    pub router: Arc<OnceLock<Router>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, db: Database) -> Result<Self> {
        let worker_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(
                config.worker.introspection_timeout_secs,
            ))
            .build()
            .map_err(|e| retrace_core::Error::internal(format!("http client: {}", e)))?;

        Ok(Self {
            snapshots: SnapshotRepository::new(db.clone()),
            worker_stats: WorkerStatsRepository::new(db.clone()),
            auth: AuthService::new(config.clone()),
            geo: Arc::new(GeoResolver::from_config(&config.snapshot)),
            worker_client,
            started_at: Instant::now(),
            router: Arc::new(OnceLock::new()),
            config,
            db,
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
