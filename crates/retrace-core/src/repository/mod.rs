//! Repository module for database access

pub mod query_builder;
pub mod snapshot_repository;
pub mod tables;
pub mod worker_stats_repository;

pub use query_builder::{Filter, FilterOperator, QueryBuilder};
pub use snapshot_repository::{SnapshotFilter, SnapshotRepository};
pub use tables::TableRepository;
pub use worker_stats_repository::WorkerStatsRepository;

use sqlx::{Pool, Postgres};
use std::time::Duration;

use crate::config::DatabaseConfig;

/// PostgreSQL database handle
#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Short-deadline liveness probe; reports unavailable on timeout
    pub async fn probe(&self, deadline: Duration) -> crate::Result<()> {
        tokio::time::timeout(deadline, sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map_err(|_| crate::Error::dependency("database probe timed out"))?
            .map_err(|e| crate::Error::dependency(format!("database probe failed: {}", e)))?;
        Ok(())
    }
}

/// Create PostgreSQL connection pool
pub async fn create_pool(config: &DatabaseConfig) -> crate::Result<Pool<Postgres>> {
    use sqlx::postgres::PgPoolOptions;

    tracing::info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(crate::Error::Database)?;

    tracing::info!("PostgreSQL connected successfully");
    Ok(pool)
}
