//! Worker heartbeat persistence
//!
//! One row per worker mode; the publisher upserts it on an interval.
//! `last_heartbeat` never moves backwards even if the wall clock does.

use crate::models::{WorkerStatsReport, WorkerStatsRow};
use crate::repository::Database;
use crate::Result;

#[derive(Clone)]
pub struct WorkerStatsRepository {
    db: Database,
}

impl WorkerStatsRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upsert this mode's heartbeat row
    pub async fn upsert(&self, report: &WorkerStatsReport) -> Result<WorkerStatsRow> {
        let row = sqlx::query_as::<_, WorkerStatsRow>(
            r#"
            INSERT INTO worker_stats (
                worker_mode, queue_size, processing_count,
                scheduled_jobs_count, available_jobs_count,
                scheduled_jobs, available_jobs, last_heartbeat
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (worker_mode) DO UPDATE SET
                queue_size = EXCLUDED.queue_size,
                processing_count = EXCLUDED.processing_count,
                scheduled_jobs_count = EXCLUDED.scheduled_jobs_count,
                available_jobs_count = EXCLUDED.available_jobs_count,
                scheduled_jobs = EXCLUDED.scheduled_jobs,
                available_jobs = EXCLUDED.available_jobs,
                last_heartbeat = GREATEST(NOW(), worker_stats.last_heartbeat + interval '1 microsecond'),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&report.worker_mode)
        .bind(report.queue_size)
        .bind(report.processing_count)
        .bind(report.scheduled_jobs_count())
        .bind(report.available_jobs_count())
        .bind(&report.scheduled_jobs)
        .bind(&report.available_jobs)
        .fetch_one(self.db.pool())
        .await?;

        Ok(row)
    }

    /// Most recent heartbeat row across modes
    pub async fn latest(&self) -> Result<Option<WorkerStatsRow>> {
        let row = sqlx::query_as::<_, WorkerStatsRow>(
            "SELECT * FROM worker_stats ORDER BY last_heartbeat DESC LIMIT 1",
        )
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row)
    }
}
