//! Dispatcher: the worker's job-processing loop
//!
//! Pulls one job at a time, resolves its handler through the registry, and
//! applies the retry policy on failure. Handler errors never escape the
//! loop. Every suspension point honors the cancellation token.

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::jobs::dead_letter::DeadLetterBuffer;
use crate::jobs::job::Job;
use crate::jobs::queue::Queue;
use crate::jobs::registry::JobRegistry;
use crate::jobs::JobContext;

/// Lifetime counters for introspection
#[derive(Default)]
pub struct Counters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of the counters
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherCounters {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

pub struct Dispatcher {
    queue: Arc<Queue>,
    registry: Arc<JobRegistry>,
    ctx: JobContext,
    poll_interval: Duration,
    cancel: CancellationToken,
    counters: Counters,
    dead_letters: Arc<DeadLetterBuffer>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<Queue>,
        registry: Arc<JobRegistry>,
        ctx: JobContext,
        poll_interval: Duration,
        cancel: CancellationToken,
        dead_letters: Arc<DeadLetterBuffer>,
    ) -> Self {
        Self {
            queue,
            registry,
            ctx,
            poll_interval,
            cancel,
            counters: Counters::default(),
            dead_letters,
        }
    }

    pub fn counters(&self) -> DispatcherCounters {
        DispatcherCounters {
            processed: self.counters.processed.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// The consumer loop; returns when the token is cancelled
    pub async fn run(&self) {
        info!("dispatcher running");

        while !self.cancel.is_cancelled() {
            match self.queue.dequeue().await {
                Ok(Some(job)) => {
                    self.process(job).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    error!(error = %e, "dequeue failed");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        info!("dispatcher stopped");
    }

    /// Process one dequeued job; the job is owned here until ack
    pub async fn process(&self, job: Job) {
        if job.attempts_exhausted() {
            warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                attempts = job.attempts,
                "job arrived with attempts exhausted"
            );
            self.dead_letters.push(&job, "attempts exhausted").await;
            self.ack(&job).await;
            return;
        }

        let handler = match self.registry.get(job.job_type) {
            Some(handler) => handler,
            None => {
                // Poison: cannot be retried against an unknown type
                warn!(job_id = %job.id, job_type = %job.job_type, "no handler registered");
                self.ack(&job).await;
                return;
            }
        };

        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        let result = match handler.validate(&job.payload) {
            Ok(()) => handler.handle(&self.ctx, &job.payload).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                self.ack(&job).await;
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);

                if job.attempts + 1 < job.max_attempts {
                    let retry = job.retry(Utc::now());
                    warn!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        attempt = job.attempts + 1,
                        max_attempts = job.max_attempts,
                        backoff_ms = job.backoff_ms(),
                        error = %e,
                        "job failed; retry scheduled"
                    );
                    if let Err(requeue_err) = self.queue.requeue(retry).await {
                        error!(job_id = %job.id, error = %requeue_err, "failed to requeue retry");
                    }
                } else {
                    error!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        attempts = job.attempts + 1,
                        error = %e,
                        "job failed permanently"
                    );
                    self.dead_letters.push(&job, e.to_string()).await;
                }

                // Ack the original either way so the queue never re-surfaces it
                self.ack(&job).await;
            }
        }
    }

    async fn ack(&self, job: &Job) {
        if let Err(e) = self.queue.acknowledge(job).await {
            error!(job_id = %job.id, error = %e, "acknowledge failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::jobs::job::{EnqueueOptions, JobMetadata, JobType};
    use crate::jobs::memory_queue::MemoryQueue;
    use crate::jobs::{JobError, JobHandler, JobResult};
    use crate::repository::Database;
    use chrono::DateTime;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Mutex;

    fn test_ctx() -> JobContext {
        // Lazy pool: no connection is made unless a handler touches the db
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/retrace_test")
            .unwrap();
        JobContext::new(Database::new(pool), Arc::new(Config::default()))
    }

    /// Fails the first `failures` invocations, then succeeds
    struct FlakyHandler {
        failures: u64,
        invocations: Arc<Mutex<Vec<DateTime<Utc>>>>,
    }

    #[async_trait::async_trait]
    impl JobHandler for FlakyHandler {
        fn metadata(&self) -> JobMetadata {
            JobMetadata {
                job_type: JobType::HealthCheck,
                name: "Flaky",
                description: "fails a fixed number of times",
                category: None,
                default_options: Default::default(),
            }
        }

        async fn handle(
            &self,
            _ctx: &JobContext,
            _payload: &serde_json::Value,
        ) -> JobResult<()> {
            let mut invocations = self.invocations.lock().unwrap();
            invocations.push(Utc::now());
            if invocations.len() as u64 <= self.failures {
                Err(JobError::Execution("induced failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn dispatcher_with(
        handler: Arc<dyn JobHandler>,
        queue: Arc<Queue>,
        poll: Duration,
    ) -> Dispatcher {
        let mut registry = JobRegistry::new();
        registry.register(handler);
        Dispatcher::new(
            queue,
            Arc::new(registry),
            test_ctx(),
            poll,
            CancellationToken::new(),
            Arc::new(DeadLetterBuffer::default()),
        )
    }

    #[tokio::test]
    async fn test_success_acks_and_counts() {
        let queue = Arc::new(Queue::Memory(MemoryQueue::new()));
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = dispatcher_with(
            Arc::new(FlakyHandler {
                failures: 0,
                invocations: invocations.clone(),
            }),
            queue.clone(),
            Duration::from_millis(10),
        );

        queue
            .enqueue(
                JobType::HealthCheck,
                serde_json::json!({}),
                &EnqueueOptions::default(),
            )
            .await
            .unwrap();
        let job = queue.dequeue().await.unwrap().unwrap();
        dispatcher.process(job).await;

        let counters = dispatcher.counters();
        assert_eq!(counters.processed, 1);
        assert_eq!(counters.succeeded, 1);
        assert_eq!(counters.failed, 0);

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.queue_size, 0);
        assert_eq!(stats.processing_count, 0);
    }

    #[tokio::test]
    async fn test_failure_schedules_backoff_retry() {
        let queue = Arc::new(Queue::Memory(MemoryQueue::new()));
        let dispatcher = dispatcher_with(
            Arc::new(FlakyHandler {
                failures: u64::MAX,
                invocations: Arc::new(Mutex::new(Vec::new())),
            }),
            queue.clone(),
            Duration::from_millis(10),
        );

        queue
            .enqueue(
                JobType::HealthCheck,
                serde_json::json!({}),
                &EnqueueOptions::with_max_attempts(3),
            )
            .await
            .unwrap();
        let job = queue.dequeue().await.unwrap().unwrap();
        let before = Utc::now();
        dispatcher.process(job).await;

        // Original acked, retry pending with attempts=1 deferred ~1s
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.queue_size, 1);
        assert_eq!(stats.processing_count, 0);

        let pending = queue.pending_summaries().await;
        assert_eq!(pending[0]["attempts"], 1);
        let scheduled_for: DateTime<Utc> =
            serde_json::from_value(pending[0]["scheduledFor"].clone()).unwrap();
        let delta_ms = (scheduled_for - before).num_milliseconds();
        assert!((900..=1500).contains(&delta_ms), "delta {}ms", delta_ms);
    }

    #[tokio::test]
    async fn test_exhausted_job_dead_letters_without_retry() {
        let queue = Arc::new(Queue::Memory(MemoryQueue::new()));
        let dead_letters = Arc::new(DeadLetterBuffer::default());
        let mut registry = JobRegistry::new();
        registry.register(Arc::new(FlakyHandler {
            failures: u64::MAX,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }));
        let dispatcher = Dispatcher::new(
            queue.clone(),
            Arc::new(registry),
            test_ctx(),
            Duration::from_millis(10),
            CancellationToken::new(),
            dead_letters.clone(),
        );

        queue
            .enqueue(
                JobType::HealthCheck,
                serde_json::json!({}),
                &EnqueueOptions::with_max_attempts(1),
            )
            .await
            .unwrap();
        let job = queue.dequeue().await.unwrap().unwrap();
        dispatcher.process(job).await;

        assert_eq!(queue.stats().await.unwrap().queue_size, 0);
        assert_eq!(dead_letters.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_handler_is_poison() {
        let queue = Arc::new(Queue::Memory(MemoryQueue::new()));
        let dispatcher = Dispatcher::new(
            queue.clone(),
            Arc::new(JobRegistry::new()),
            test_ctx(),
            Duration::from_millis(10),
            CancellationToken::new(),
            Arc::new(DeadLetterBuffer::default()),
        );

        queue
            .enqueue(
                JobType::MetricRollup,
                serde_json::json!({}),
                &EnqueueOptions::default(),
            )
            .await
            .unwrap();
        let job = queue.dequeue().await.unwrap().unwrap();
        dispatcher.process(job).await;

        // Acked without invocation, nothing requeued
        let counters = dispatcher.counters();
        assert_eq!(counters.processed, 0);
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.queue_size, 0);
        assert_eq!(stats.processing_count, 0);
    }

    #[tokio::test]
    async fn test_retry_until_success_with_backoff() {
        let queue = Arc::new(Queue::Memory(MemoryQueue::new()));
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Arc::new(dispatcher_with(
            Arc::new(FlakyHandler {
                failures: 1,
                invocations: invocations.clone(),
            }),
            queue.clone(),
            Duration::from_millis(20),
        ));

        let cancel = dispatcher.cancel.clone();
        let runner = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run().await })
        };

        queue
            .enqueue(
                JobType::HealthCheck,
                serde_json::json!({}),
                &EnqueueOptions::with_max_attempts(5),
            )
            .await
            .unwrap();

        // First attempt fails, retry fires after the 1s backoff
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if dispatcher.counters().succeeded == 1 {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "retry never succeeded");
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        cancel.cancel();
        runner.await.unwrap();

        let invocations = invocations.lock().unwrap();
        assert_eq!(invocations.len(), 2);
        let gap_ms = (invocations[1] - invocations[0]).num_milliseconds();
        assert!(gap_ms >= 950, "backoff gap was {}ms", gap_ms);

        drop(invocations);
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.queue_size, 0);
        assert_eq!(stats.processing_count, 0);
    }
}
