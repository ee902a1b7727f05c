//! In-process job queue (local mode)
//!
//! Intentionally volatile: queue contents do not survive a restart. A single
//! mutex serializes all mutation; a job handed out by `dequeue` is owned by
//! the dispatcher until it acknowledges or rejects it.

use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::jobs::job::{EnqueueOptions, Job, JobType};
use crate::jobs::queue::QueueStats;
use crate::jobs::JobResult;

#[derive(Default)]
struct Inner {
    /// Pending jobs kept sorted by effective time; stable for equal keys
    pending: Vec<Job>,

    /// Jobs handed to the dispatcher, keyed by id
    in_flight: HashMap<Uuid, Job>,
}

#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct and insert a fresh job; returns its id
    pub async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        options: &EnqueueOptions,
    ) -> JobResult<Uuid> {
        validator::Validate::validate(options)
            .map_err(|e| crate::jobs::JobError::Validation(e.to_string()))?;
        let job = Job::new(job_type, payload, options);
        let id = job.id;
        self.push(job).await;
        Ok(id)
    }

    /// Insert an already-built job (retry path)
    pub async fn requeue(&self, job: Job) -> JobResult<()> {
        self.push(job).await;
        Ok(())
    }

    async fn push(&self, job: Job) {
        let mut inner = self.inner.lock().await;
        let key = job.effective_time();
        let position = inner
            .pending
            .partition_point(|existing| existing.effective_time() <= key);
        debug!(job_id = %job.id, job_type = %job.job_type, "enqueued job");
        inner.pending.insert(position, job);
    }

    /// Earliest eligible pending job, moved to the in-flight set
    pub async fn dequeue(&self) -> JobResult<Option<Job>> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;

        let position = match inner.pending.iter().position(|job| job.is_eligible(now)) {
            Some(position) => position,
            None => return Ok(None),
        };

        let job = inner.pending.remove(position);
        inner.in_flight.insert(job.id, job.clone());
        Ok(Some(job))
    }

    /// Remove from in-flight; a no-op for unknown ids
    pub async fn acknowledge(&self, id: Uuid) -> JobResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.in_flight.remove(&id).is_none() {
            debug!(job_id = %id, "acknowledge for unknown job id");
        }
        Ok(())
    }

    /// Remove from in-flight without re-enqueueing; retry policy lives in
    /// the dispatcher
    pub async fn reject(&self, id: Uuid, reason: Option<&str>) -> JobResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.in_flight.remove(&id).is_some() {
            debug!(job_id = %id, reason = reason.unwrap_or(""), "rejected job");
        }
        Ok(())
    }

    pub async fn stats(&self) -> JobResult<QueueStats> {
        let inner = self.inner.lock().await;
        Ok(QueueStats {
            queue_size: inner.pending.len() as i64,
            processing_count: inner.in_flight.len() as i64,
        })
    }

    /// Pending-job summaries for introspection
    pub async fn pending_summaries(&self) -> Vec<serde_json::Value> {
        let inner = self.inner.lock().await;
        inner.pending.iter().map(|job| job.summary()).collect()
    }
}
