//! SQS-backed job queue (lambda mode)
//!
//! Jobs travel as JSON message bodies. Native delay is used for deferred
//! jobs, clamped at the broker's 900 s maximum. A received message stays
//! invisible for the visibility timeout; `reject` leaves it there so the
//! broker's redrive policy decides what happens next.

use aws_sdk_sqs::types::QueueAttributeName;
use aws_sdk_sqs::Client;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::jobs::job::{EnqueueOptions, Job, JobType};
use crate::jobs::queue::QueueStats;
use crate::jobs::{JobError, JobResult};

/// SQS caps DelaySeconds at 15 minutes
const MAX_DELAY_SECS: i64 = 900;

/// One message per receive, long-polled
const RECEIVE_WAIT_SECS: i32 = 20;

/// How long a received message stays invisible
const VISIBILITY_TIMEOUT_SECS: i32 = 300;

pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }

    /// Build a client from the configured region and queue URL
    pub async fn connect(queue_url: String, region: String) -> Self {
        let region = aws_sdk_sqs::config::Region::new(region);
        let shared_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        Self::new(Client::new(&shared_config), queue_url)
    }

    pub async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        options: &EnqueueOptions,
    ) -> JobResult<Uuid> {
        validator::Validate::validate(options)
            .map_err(|e| JobError::Validation(e.to_string()))?;
        let job = Job::new(job_type, payload, options);
        let id = job.id;
        self.send(&job).await?;
        Ok(id)
    }

    pub async fn requeue(&self, job: Job) -> JobResult<()> {
        self.send(&job).await
    }

    async fn send(&self, job: &Job) -> JobResult<()> {
        let body = serde_json::to_string(job)?;
        let delay = delay_seconds(job);

        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .delay_seconds(delay)
            .send()
            .await
            .map_err(|e| JobError::Queue(format!("send_message failed: {}", e)))?;

        debug!(job_id = %job.id, job_type = %job.job_type, delay, "sent job to SQS");
        Ok(())
    }

    /// Long-poll receive of a single message
    pub async fn dequeue(&self) -> JobResult<Option<Job>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(RECEIVE_WAIT_SECS)
            .visibility_timeout(VISIBILITY_TIMEOUT_SECS)
            .send()
            .await
            .map_err(|e| JobError::Queue(format!("receive_message failed: {}", e)))?;

        let message = match output.messages().first() {
            Some(message) => message.clone(),
            None => return Ok(None),
        };

        let body = message
            .body()
            .ok_or_else(|| JobError::Queue("message without body".to_string()))?;
        let mut job: Job = serde_json::from_str(body)?;
        job.receipt_handle = message.receipt_handle().map(|h| h.to_string());

        Ok(Some(job))
    }

    /// Delete the message behind this job's receipt handle
    pub async fn acknowledge(&self, job: &Job) -> JobResult<()> {
        let receipt_handle = match &job.receipt_handle {
            Some(handle) => handle,
            None => {
                warn!(job_id = %job.id, "acknowledge without receipt handle");
                return Ok(());
            }
        };

        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| JobError::Queue(format!("delete_message failed: {}", e)))?;

        Ok(())
    }

    /// Leave the message invisible until its visibility timeout expires
    pub async fn reject(&self, job: &Job, reason: Option<&str>) -> JobResult<()> {
        debug!(
            job_id = %job.id,
            reason = reason.unwrap_or(""),
            "rejected job; broker redrive applies"
        );
        Ok(())
    }

    pub async fn stats(&self) -> JobResult<QueueStats> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
            .send()
            .await
            .map_err(|e| JobError::Queue(format!("get_queue_attributes failed: {}", e)))?;

        let attributes = output.attributes();
        let read = |name: &QueueAttributeName| -> i64 {
            attributes
                .and_then(|map| map.get(name))
                .and_then(|value| value.parse().ok())
                .unwrap_or(0)
        };

        Ok(QueueStats {
            queue_size: read(&QueueAttributeName::ApproximateNumberOfMessages),
            processing_count: read(&QueueAttributeName::ApproximateNumberOfMessagesNotVisible),
        })
    }
}

/// Seconds until eligibility, clamped to the broker limit
fn delay_seconds(job: &Job) -> i32 {
    let Some(at) = job.scheduled_for else {
        return 0;
    };
    let secs = (at - Utc::now()).num_seconds();
    secs.clamp(0, MAX_DELAY_SECS) as i32
}
