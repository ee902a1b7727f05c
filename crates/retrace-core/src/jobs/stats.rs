//! Heartbeat publisher
//!
//! Periodically snapshots queue depth, in-flight count, scheduled entries,
//! and registered handlers, and upserts them into the worker's single
//! `worker_stats` row. Local mode runs the interval loop; lambda mode calls
//! `publish` once per invocation instead.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::jobs::queue::Queue;
use crate::jobs::registry::JobRegistry;
use crate::jobs::scheduler::Scheduler;
use crate::models::WorkerStatsReport;
use crate::repository::WorkerStatsRepository;

pub struct StatsPublisher {
    queue: Arc<Queue>,
    scheduler: Arc<Scheduler>,
    registry: Arc<JobRegistry>,
    repository: WorkerStatsRepository,
    mode: String,
    interval: Duration,
    cancel: CancellationToken,
}

impl StatsPublisher {
    pub fn new(
        queue: Arc<Queue>,
        scheduler: Arc<Scheduler>,
        registry: Arc<JobRegistry>,
        repository: WorkerStatsRepository,
        mode: String,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            scheduler,
            registry,
            repository,
            mode,
            interval,
            cancel,
        }
    }

    /// Compute one heartbeat's worth of state
    pub async fn collect(&self) -> WorkerStatsReport {
        let queue_stats = self.queue.stats().await.unwrap_or_default();
        let scheduled = self.scheduler.list().await;
        let available = self.registry.jobs();

        WorkerStatsReport {
            worker_mode: self.mode.clone(),
            queue_size: queue_stats.queue_size,
            processing_count: queue_stats.processing_count,
            scheduled_jobs: serde_json::to_value(scheduled)
                .unwrap_or(serde_json::Value::Array(Vec::new())),
            available_jobs: serde_json::to_value(available)
                .unwrap_or(serde_json::Value::Array(Vec::new())),
        }
    }

    /// Collect and upsert once; failures are logged, never fatal
    pub async fn publish(&self) {
        let report = self.collect().await;
        match self.repository.upsert(&report).await {
            Ok(row) => {
                debug!(
                    mode = %row.worker_mode,
                    queue_size = row.queue_size,
                    processing = row.processing_count,
                    "heartbeat published"
                );
            }
            Err(e) => {
                error!(error = %e, "failed to publish heartbeat");
            }
        }
    }

    /// Interval loop for local mode; publishes a final heartbeat on exit
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "stats publisher running");

        loop {
            self.publish().await;

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        // Shutdown boundary: leave a fresh heartbeat behind
        self.publish().await;
        info!("stats publisher stopped");
    }
}
