//! SNAPSHOT_CLEANUP job: soft-delete snapshots past the retention window

use chrono::{Duration, Utc};
use tracing::info;

use crate::jobs::job::{JobMetadata, JobType};
use crate::jobs::{JobContext, JobError, JobHandler, JobResult};
use crate::repository::SnapshotRepository;

pub struct SnapshotCleanupHandler;

#[async_trait::async_trait]
impl JobHandler for SnapshotCleanupHandler {
    fn metadata(&self) -> JobMetadata {
        JobMetadata {
            job_type: JobType::SnapshotCleanup,
            name: "Snapshot cleanup",
            description: "Soft-deletes request snapshots older than the retention window",
            category: Some("maintenance"),
            default_options: Default::default(),
        }
    }

    fn validate(&self, payload: &serde_json::Value) -> JobResult<()> {
        if let Some(days) = payload.get("retentionDays") {
            match days.as_i64() {
                Some(days) if days > 0 => {}
                _ => {
                    return Err(JobError::Validation(
                        "retentionDays must be a positive integer".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    async fn handle(&self, ctx: &JobContext, payload: &serde_json::Value) -> JobResult<()> {
        let retention_days = payload
            .get("retentionDays")
            .and_then(|v| v.as_i64())
            .unwrap_or(ctx.config.snapshot.retention_days);

        let cutoff = Utc::now() - Duration::days(retention_days);
        let pruned = SnapshotRepository::new(ctx.db.clone())
            .prune_older_than(cutoff)
            .await
            .map_err(|e| JobError::Execution(e.to_string()))?;

        info!(pruned, retention_days, "snapshot cleanup complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_empty_payload() {
        assert!(SnapshotCleanupHandler.validate(&serde_json::json!({})).is_ok());
    }

    #[test]
    fn test_validate_accepts_positive_retention() {
        assert!(SnapshotCleanupHandler
            .validate(&serde_json::json!({"retentionDays": 7}))
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_retention() {
        assert!(SnapshotCleanupHandler
            .validate(&serde_json::json!({"retentionDays": 0}))
            .is_err());
        assert!(SnapshotCleanupHandler
            .validate(&serde_json::json!({"retentionDays": "week"}))
            .is_err());
    }
}
