//! HEALTH_CHECK job: probe the database and log the outcome

use std::time::Duration;
use tracing::{info, warn};

use crate::jobs::job::{JobMetadata, JobType};
use crate::jobs::{JobContext, JobError, JobHandler, JobResult};

pub struct HealthCheckHandler;

#[async_trait::async_trait]
impl JobHandler for HealthCheckHandler {
    fn metadata(&self) -> JobMetadata {
        JobMetadata {
            job_type: JobType::HealthCheck,
            name: "Health check",
            description: "Probes the database and logs the result",
            category: Some("system"),
            default_options: Default::default(),
        }
    }

    async fn handle(&self, ctx: &JobContext, _payload: &serde_json::Value) -> JobResult<()> {
        let deadline = Duration::from_secs(ctx.config.database.probe_timeout_secs);

        match ctx.db.probe(deadline).await {
            Ok(()) => {
                info!("health check: database healthy");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "health check: database unhealthy");
                Err(JobError::Execution(format!("database probe failed: {}", e)))
            }
        }
    }
}
