//! METRIC_ROLLUP job: aggregate raw metrics into hourly rollup rows

use tracing::info;

use crate::jobs::job::{JobMetadata, JobType};
use crate::jobs::{JobContext, JobError, JobHandler, JobResult};

pub struct MetricRollupHandler;

#[async_trait::async_trait]
impl JobHandler for MetricRollupHandler {
    fn metadata(&self) -> JobMetadata {
        JobMetadata {
            job_type: JobType::MetricRollup,
            name: "Metric rollup",
            description: "Aggregates the previous hour's metrics into a rollup row",
            category: Some("maintenance"),
            default_options: Default::default(),
        }
    }

    async fn handle(&self, ctx: &JobContext, _payload: &serde_json::Value) -> JobResult<()> {
        // One rollup row per completed hour; raw rows keep their own kind
        let result = sqlx::query(
            r#"
            INSERT INTO metrics (data)
            SELECT jsonb_build_object(
                'kind', 'hourly_rollup',
                'hour', to_char(date_trunc('hour', NOW() - interval '1 hour'),
                                'YYYY-MM-DD"T"HH24:00:00"Z"'),
                'count', COUNT(*)
            )
            FROM metrics
            WHERE created_at >= date_trunc('hour', NOW() - interval '1 hour')
              AND created_at < date_trunc('hour', NOW())
              AND deleted_at IS NULL
              AND COALESCE(data->>'kind', '') <> 'hourly_rollup'
            "#,
        )
        .execute(ctx.db.pool())
        .await
        .map_err(|e| JobError::Execution(e.to_string()))?;

        info!(rows = result.rows_affected(), "metric rollup complete");
        Ok(())
    }
}
