//! Built-in job handlers

pub mod health_check;
pub mod metric_rollup;
pub mod snapshot_cleanup;

pub use health_check::HealthCheckHandler;
pub use metric_rollup::MetricRollupHandler;
pub use snapshot_cleanup::SnapshotCleanupHandler;
