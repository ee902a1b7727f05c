//! Background job subsystem
//!
//! - Typed jobs with payloads owned by their handlers
//! - Pluggable queue: in-memory (local mode) or SQS (lambda mode)
//! - Pluggable scheduler: in-process cron ticker or EventBridge-managed
//! - Dispatcher loop with exponential-backoff retry and graceful shutdown
//! - Heartbeat publisher upserting worker state into `worker_stats`

pub mod dead_letter;
pub mod dispatcher;
pub mod handlers;
pub mod job;
pub mod memory_queue;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod sqs_queue;
pub mod stats;

pub use dead_letter::DeadLetterBuffer;
pub use dispatcher::{Dispatcher, DispatcherCounters};
pub use job::{EnqueueOptions, Job, JobMetadata, JobType};
pub use memory_queue::MemoryQueue;
pub use queue::{build_queue, Queue, QueueStats};
pub use registry::JobRegistry;
pub use scheduler::{build_scheduler, CronEntry, CronScheduler, ExternalScheduler, Scheduler};
pub use sqs_queue::SqsQueue;
pub use stats::StatsPublisher;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::repository::Database;

/// Job processing result type
pub type JobResult<T> = Result<T, JobError>;

/// Error types for job processing
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum JobError {
    #[error("Job execution failed: {0}")]
    Execution(String),

    #[error("Invalid payload: {0}")]
    Validation(String),

    #[error("Job serialization error: {0}")]
    Serialization(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Unknown job type: {0}")]
    UnknownType(String),

    #[error("Job cancelled")]
    Cancelled,
}

impl From<JobError> for crate::Error {
    fn from(err: JobError) -> Self {
        crate::Error::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::Serialization(err.to_string())
    }
}

/// Dependencies handed to every job handler
#[derive(Clone)]
pub struct JobContext {
    pub db: Database,
    pub config: Arc<Config>,
}

impl JobContext {
    pub fn new(db: Database, config: Arc<Config>) -> Self {
        Self { db, config }
    }
}

/// Job handler trait for executing jobs
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    /// Describe this handler for the registry and introspection
    fn metadata(&self) -> JobMetadata;

    /// Check the payload shape before execution
    fn validate(&self, _payload: &serde_json::Value) -> JobResult<()> {
        Ok(())
    }

    /// Execute the job
    async fn handle(&self, ctx: &JobContext, payload: &serde_json::Value) -> JobResult<()>;
}
