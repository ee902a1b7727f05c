//! Worker heartbeat model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single heartbeat row a worker maintains for its mode
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkerStatsRow {
    pub id: i64,
    pub worker_mode: String,
    pub queue_size: i64,
    pub processing_count: i64,
    pub scheduled_jobs_count: i64,
    pub available_jobs_count: i64,
    pub scheduled_jobs: serde_json::Value,
    pub available_jobs: serde_json::Value,
    pub last_heartbeat: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkerStatsRow {
    /// Age of the heartbeat relative to `now`
    pub fn heartbeat_age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_heartbeat).num_seconds()
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_after_secs: i64) -> bool {
        self.heartbeat_age_secs(now) > stale_after_secs
    }
}

/// One heartbeat's worth of worker state, computed by the stats publisher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatsReport {
    pub worker_mode: String,
    pub queue_size: i64,
    pub processing_count: i64,
    pub scheduled_jobs: serde_json::Value,
    pub available_jobs: serde_json::Value,
}

impl WorkerStatsReport {
    pub fn scheduled_jobs_count(&self) -> i64 {
        self.scheduled_jobs.as_array().map(|a| a.len()).unwrap_or(0) as i64
    }

    pub fn available_jobs_count(&self) -> i64 {
        self.available_jobs.as_array().map(|a| a.len()).unwrap_or(0) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(age_secs: i64) -> WorkerStatsRow {
        let now = Utc::now();
        WorkerStatsRow {
            id: 1,
            worker_mode: "local".to_string(),
            queue_size: 0,
            processing_count: 0,
            scheduled_jobs_count: 0,
            available_jobs_count: 0,
            scheduled_jobs: serde_json::json!([]),
            available_jobs: serde_json::json!([]),
            last_heartbeat: now - Duration::seconds(age_secs),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_staleness_threshold() {
        let now = Utc::now();
        assert!(!row(0).is_stale(now, 300));
        assert!(!row(299).is_stale(now, 300));
        assert!(row(400).is_stale(now, 300));
    }

    #[test]
    fn test_report_counts() {
        let report = WorkerStatsReport {
            worker_mode: "local".to_string(),
            queue_size: 3,
            processing_count: 1,
            scheduled_jobs: serde_json::json!([{"id": "a"}, {"id": "b"}]),
            available_jobs: serde_json::json!([{"type": "HEALTH_CHECK"}]),
        };
        assert_eq!(report.scheduled_jobs_count(), 2);
        assert_eq!(report.available_jobs_count(), 1);
    }
}
