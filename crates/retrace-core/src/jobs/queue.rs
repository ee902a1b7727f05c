//! Queue variants behind one capability set
//!
//! `Queue` is an explicit sum over the two implementations; the dispatcher
//! and stats publisher only ever see this type.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{Config, WorkerMode};
use crate::jobs::job::{EnqueueOptions, Job, JobType};
use crate::jobs::memory_queue::MemoryQueue;
use crate::jobs::sqs_queue::SqsQueue;
use crate::jobs::{JobError, JobResult};

/// Depth snapshot shared by both variants
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queue_size: i64,
    pub processing_count: i64,
}

pub enum Queue {
    Memory(MemoryQueue),
    Sqs(SqsQueue),
}

impl Queue {
    /// Construct a fresh job and enqueue it; returns the job id
    pub async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        options: &EnqueueOptions,
    ) -> JobResult<Uuid> {
        match self {
            Queue::Memory(queue) => queue.enqueue(job_type, payload, options).await,
            Queue::Sqs(queue) => queue.enqueue(job_type, payload, options).await,
        }
    }

    /// Insert an already-built job record (the retry path)
    pub async fn requeue(&self, job: Job) -> JobResult<()> {
        match self {
            Queue::Memory(queue) => queue.requeue(job).await,
            Queue::Sqs(queue) => queue.requeue(job).await,
        }
    }

    /// Earliest eligible pending job, marked in-flight; None when drained
    pub async fn dequeue(&self) -> JobResult<Option<Job>> {
        match self {
            Queue::Memory(queue) => queue.dequeue().await,
            Queue::Sqs(queue) => queue.dequeue().await,
        }
    }

    /// Idempotent removal from the in-flight set
    pub async fn acknowledge(&self, job: &Job) -> JobResult<()> {
        match self {
            Queue::Memory(queue) => queue.acknowledge(job.id).await,
            Queue::Sqs(queue) => queue.acknowledge(job).await,
        }
    }

    /// Drop from in-flight without re-enqueueing
    pub async fn reject(&self, job: &Job, reason: Option<&str>) -> JobResult<()> {
        match self {
            Queue::Memory(queue) => queue.reject(job.id, reason).await,
            Queue::Sqs(queue) => queue.reject(job, reason).await,
        }
    }

    pub async fn stats(&self) -> JobResult<QueueStats> {
        match self {
            Queue::Memory(queue) => queue.stats().await,
            Queue::Sqs(queue) => queue.stats().await,
        }
    }

    /// Pending-job summaries; only meaningful for the in-process variant
    pub async fn pending_summaries(&self) -> Vec<serde_json::Value> {
        match self {
            Queue::Memory(queue) => queue.pending_summaries().await,
            Queue::Sqs(_) => Vec::new(),
        }
    }
}

/// One-time factory selecting the variant from config
pub async fn build_queue(config: &Config) -> JobResult<Queue> {
    match config.worker.mode {
        WorkerMode::Local => Ok(Queue::Memory(MemoryQueue::new())),
        WorkerMode::Lambda => {
            let queue_url = config
                .worker
                .sqs_queue_url
                .clone()
                .ok_or_else(|| JobError::Queue("SQS_QUEUE_URL not configured".to_string()))?;
            let region = config
                .worker
                .aws_region
                .clone()
                .ok_or_else(|| JobError::Queue("AWS_REGION not configured".to_string()))?;
            Ok(Queue::Sqs(SqsQueue::connect(queue_url, region).await))
        }
    }
}
