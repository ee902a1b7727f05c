//! Job types and definitions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Enumerated job tags; wire names are SCREAMING_SNAKE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Probe the database and log the outcome
    HealthCheck,

    /// Soft-delete request snapshots past the retention window
    SnapshotCleanup,

    /// Aggregate raw metrics into hourly rollups
    MetricRollup,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::HealthCheck => write!(f, "HEALTH_CHECK"),
            JobType::SnapshotCleanup => write!(f, "SNAPSHOT_CLEANUP"),
            JobType::MetricRollup => write!(f, "METRIC_ROLLUP"),
        }
    }
}

impl FromStr for JobType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HEALTH_CHECK" => Ok(JobType::HealthCheck),
            "SNAPSHOT_CLEANUP" => Ok(JobType::SnapshotCleanup),
            "METRIC_ROLLUP" => Ok(JobType::MetricRollup),
            _ => Err(()),
        }
    }
}

/// Options accepted at enqueue time
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueOptions {
    /// Retry cap; defaults to 3
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 25))]
    pub max_attempts: Option<u32>,

    /// Defer execution by this many milliseconds
    #[serde(rename = "delay", skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,

    /// Absolute eligibility time; wins over `delay` when both are set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl EnqueueOptions {
    pub fn with_delay_ms(delay_ms: u64) -> Self {
        Self {
            delay_ms: Some(delay_ms),
            ..Default::default()
        }
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Default::default()
        }
    }

    /// Resolve the eligibility time relative to `now`
    pub fn resolve_scheduled_for(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if let Some(at) = self.scheduled_for {
            return Some(at);
        }
        self.delay_ms
            .map(|ms| now + Duration::milliseconds(ms as i64))
    }
}

/// Describes a registered handler
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'static str>,
    pub default_options: EnqueueOptions,
}

/// Default retry cap when options don't say otherwise
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// One unit of work; immutable once enqueued (retries create a new record)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub job_type: JobType,

    pub payload: serde_json::Value,

    /// Attempts already consumed (0 on first enqueue)
    pub attempts: u32,

    pub max_attempts: u32,

    pub created_at: DateTime<Utc>,

    /// Ineligible until wall clock reaches this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,

    /// Broker receipt token attached on receive; never part of the message
    #[serde(skip)]
    pub receipt_handle: Option<String>,
}

impl Job {
    /// Build a fresh job from enqueue inputs
    pub fn new(job_type: JobType, payload: serde_json::Value, options: &EnqueueOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type,
            payload,
            attempts: 0,
            max_attempts: options.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            created_at: now,
            scheduled_for: options.resolve_scheduled_for(now),
            receipt_handle: None,
        }
    }

    /// Eligible when `scheduled_for` is unset or past
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.scheduled_for {
            Some(at) => at <= now,
            None => true,
        }
    }

    /// Ordering key for delivery: scheduled time, or creation time
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.scheduled_for.unwrap_or(self.created_at)
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Backoff before the next retry: 2^attempts seconds
    pub fn backoff_ms(&self) -> u64 {
        2u64.saturating_pow(self.attempts).saturating_mul(1000)
    }

    /// A new job record for the next attempt, deferred by the backoff
    pub fn retry(&self, now: DateTime<Utc>) -> Job {
        Job {
            id: Uuid::new_v4(),
            job_type: self.job_type,
            payload: self.payload.clone(),
            attempts: self.attempts + 1,
            max_attempts: self.max_attempts,
            created_at: now,
            scheduled_for: Some(now + Duration::milliseconds(self.backoff_ms() as i64)),
            receipt_handle: None,
        }
    }

    /// Introspection-friendly summary
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "type": self.job_type.to_string(),
            "attempts": self.attempts,
            "maxAttempts": self.max_attempts,
            "scheduledFor": self.scheduled_for,
            "createdAt": self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_wire_names() {
        assert_eq!(JobType::HealthCheck.to_string(), "HEALTH_CHECK");
        assert_eq!(
            "SNAPSHOT_CLEANUP".parse::<JobType>().unwrap(),
            JobType::SnapshotCleanup
        );
        assert!("NOPE".parse::<JobType>().is_err());

        let json = serde_json::to_string(&JobType::MetricRollup).unwrap();
        assert_eq!(json, "\"METRIC_ROLLUP\"");
    }

    #[test]
    fn test_new_job_defaults() {
        let job = Job::new(
            JobType::HealthCheck,
            serde_json::json!({}),
            &EnqueueOptions::default(),
        );
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(job.scheduled_for.is_none());
        assert!(job.is_eligible(Utc::now()));
    }

    #[test]
    fn test_delay_defers_scheduled_for() {
        let job = Job::new(
            JobType::HealthCheck,
            serde_json::json!({}),
            &EnqueueOptions::with_delay_ms(5_000),
        );
        let scheduled_for = job.scheduled_for.unwrap();
        assert!(scheduled_for > Utc::now());
        assert!(!job.is_eligible(Utc::now()));
        assert!(job.is_eligible(scheduled_for));
    }

    #[test]
    fn test_scheduled_for_wins_over_delay() {
        let at = Utc::now() + Duration::hours(1);
        let options = EnqueueOptions {
            delay_ms: Some(1_000),
            scheduled_for: Some(at),
            ..Default::default()
        };
        let job = Job::new(JobType::HealthCheck, serde_json::json!({}), &options);
        assert_eq!(job.scheduled_for, Some(at));
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let mut job = Job::new(
            JobType::HealthCheck,
            serde_json::json!({}),
            &EnqueueOptions::default(),
        );
        assert_eq!(job.backoff_ms(), 1_000);
        job.attempts = 1;
        assert_eq!(job.backoff_ms(), 2_000);
        job.attempts = 2;
        assert_eq!(job.backoff_ms(), 4_000);
    }

    #[test]
    fn test_retry_produces_new_deferred_record() {
        let job = Job::new(
            JobType::SnapshotCleanup,
            serde_json::json!({"retentionDays": 7}),
            &EnqueueOptions::with_max_attempts(5),
        );
        let now = Utc::now();
        let retry = job.retry(now);

        assert_ne!(retry.id, job.id);
        assert_eq!(retry.attempts, 1);
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.payload, job.payload);
        assert_eq!(
            retry.scheduled_for.unwrap(),
            now + Duration::milliseconds(1_000)
        );
    }

    #[test]
    fn test_receipt_handle_not_serialized() {
        let mut job = Job::new(
            JobType::HealthCheck,
            serde_json::json!({}),
            &EnqueueOptions::default(),
        );
        job.receipt_handle = Some("receipt".to_string());
        let json = serde_json::to_value(&job).unwrap();
        assert!(json.get("receiptHandle").is_none());

        let roundtrip: Job = serde_json::from_value(json).unwrap();
        assert!(roundtrip.receipt_handle.is_none());
    }

    #[test]
    fn test_options_wire_shape() {
        let options: EnqueueOptions =
            serde_json::from_str(r#"{"maxAttempts": 5, "delay": 2000}"#).unwrap();
        assert_eq!(options.max_attempts, Some(5));
        assert_eq!(options.delay_ms, Some(2000));
    }
}
