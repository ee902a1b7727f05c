//! In-memory dead-letter buffer
//!
//! Local mode has no broker redrive, so exhausted jobs land here for
//! introspection. Bounded ring; oldest entries fall off first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use crate::jobs::job::Job;

const DEFAULT_CAPACITY: usize = 100;

/// One exhausted job with its final error
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub job: serde_json::Value,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

pub struct DeadLetterBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<DeadLetter>>,
}

impl Default for DeadLetterBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl DeadLetterBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn push(&self, job: &Job, error: impl Into<String>) {
        let mut entries = self.entries.lock().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(DeadLetter {
            job: job.summary(),
            error: error.into(),
            failed_at: Utc::now(),
        });
    }

    /// Newest first
    pub async fn list(&self) -> Vec<DeadLetter> {
        let entries = self.entries.lock().await;
        entries.iter().rev().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{EnqueueOptions, JobType};

    fn job() -> Job {
        Job::new(
            JobType::HealthCheck,
            serde_json::json!({}),
            &EnqueueOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_push_and_list_newest_first() {
        let buffer = DeadLetterBuffer::default();
        buffer.push(&job(), "first").await;
        buffer.push(&job(), "second").await;

        let entries = buffer.list().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].error, "second");
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let buffer = DeadLetterBuffer::with_capacity(2);
        buffer.push(&job(), "a").await;
        buffer.push(&job(), "b").await;
        buffer.push(&job(), "c").await;

        let entries = buffer.list().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].error, "c");
        assert_eq!(entries[1].error, "b");
    }
}
