//! Scheduler variants behind one capability set
//!
//! `CronScheduler` runs one ticker task per entry and enqueues on each fire.
//! `ExternalScheduler` only mirrors the statically declared entries; an
//! EventBridge rule targeting the worker owns the actual firing.

use chrono::Utc;
use cron::Schedule;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{Config, WorkerMode};
use crate::jobs::job::{EnqueueOptions, JobType};
use crate::jobs::queue::Queue;
use crate::jobs::{JobError, JobResult};

/// One scheduled recurring job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronEntry {
    pub id: Uuid,
    pub cron_expression: String,
    #[serde(rename = "jobType")]
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub enabled: bool,
}

struct EntryState {
    entry: CronEntry,
    cancel: CancellationToken,
}

/// Parse a five-field UTC cron expression
///
/// The `cron` crate wants a seconds field, so one is prepended.
pub fn parse_cron_expression(expr: &str) -> JobResult<Schedule> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(JobError::Scheduler(format!(
            "Expected 5 cron fields, got {}: {}",
            fields, expr
        )));
    }
    Schedule::from_str(&format!("0 {}", expr))
        .map_err(|e| JobError::Scheduler(format!("Invalid cron expression '{}': {}", expr, e)))
}

pub struct CronScheduler {
    queue: Arc<Queue>,
    entries: Mutex<HashMap<Uuid, EntryState>>,
}

impl CronScheduler {
    pub fn new(queue: Arc<Queue>) -> Self {
        Self {
            queue,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Validate, record, and start a ticker for the entry
    pub async fn schedule(
        &self,
        expr: &str,
        job_type: JobType,
        payload: serde_json::Value,
    ) -> JobResult<Uuid> {
        let schedule = parse_cron_expression(expr)?;
        let entry = CronEntry {
            id: Uuid::new_v4(),
            cron_expression: expr.to_string(),
            job_type,
            payload,
            enabled: true,
        };
        self.schedule_parsed(entry, schedule).await
    }

    async fn schedule_parsed(&self, entry: CronEntry, schedule: Schedule) -> JobResult<Uuid> {
        let id = entry.id;
        let cancel = CancellationToken::new();

        spawn_ticker(
            self.queue.clone(),
            entry.clone(),
            schedule,
            cancel.clone(),
        );

        info!(entry_id = %id, job_type = %entry.job_type, expr = %entry.cron_expression, "scheduled cron entry");
        self.entries
            .lock()
            .await
            .insert(id, EntryState { entry, cancel });
        Ok(id)
    }

    /// Stop and remove one entry
    pub async fn unschedule(&self, id: Uuid) -> JobResult<()> {
        match self.entries.lock().await.remove(&id) {
            Some(state) => {
                state.cancel.cancel();
                info!(entry_id = %id, "unscheduled cron entry");
                Ok(())
            }
            None => Err(JobError::Scheduler(format!("Unknown cron entry: {}", id))),
        }
    }

    pub async fn list(&self) -> Vec<CronEntry> {
        let entries = self.entries.lock().await;
        let mut list: Vec<CronEntry> = entries.values().map(|s| s.entry.clone()).collect();
        list.sort_by_key(|e| e.id);
        list
    }

    /// Terminate every ticker; entries remain listed as disabled
    pub async fn stop_all(&self) {
        let mut entries = self.entries.lock().await;
        for state in entries.values_mut() {
            state.cancel.cancel();
            state.entry.enabled = false;
        }
        info!(count = entries.len(), "stopped all cron tickers");
    }
}

fn spawn_ticker(
    queue: Arc<Queue>,
    entry: CronEntry,
    schedule: Schedule,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let next = match schedule.upcoming(Utc).next() {
                Some(next) => next,
                None => {
                    warn!(entry_id = %entry.id, "cron schedule has no upcoming fire");
                    break;
                }
            };
            let wait = (next - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            // Fire errors are logged and skipped; the next fire proceeds
            if let Err(e) = queue
                .enqueue(
                    entry.job_type,
                    entry.payload.clone(),
                    &EnqueueOptions::default(),
                )
                .await
            {
                error!(entry_id = %entry.id, error = %e, "cron fire failed to enqueue");
            }
        }
    });
}

pub struct ExternalScheduler {
    /// Statically declared entries; the managed cron owns firing
    entries: Mutex<HashMap<Uuid, CronEntry>>,

    /// The managed target, kept for logging and introspection
    target_arn: String,
}

impl ExternalScheduler {
    pub fn new(target_arn: String) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            target_arn,
        }
    }

    /// Record a declared entry; firing is EventBridge's job
    pub async fn schedule(
        &self,
        expr: &str,
        job_type: JobType,
        payload: serde_json::Value,
    ) -> JobResult<Uuid> {
        parse_cron_expression(expr)?;
        let entry = CronEntry {
            id: Uuid::new_v4(),
            cron_expression: expr.to_string(),
            job_type,
            payload,
            enabled: true,
        };
        let id = entry.id;
        info!(
            entry_id = %id,
            job_type = %entry.job_type,
            target = %self.target_arn,
            "declared externally managed cron entry"
        );
        self.entries.lock().await.insert(id, entry);
        Ok(id)
    }

    pub async fn unschedule(&self, id: Uuid) -> JobResult<()> {
        match self.entries.lock().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(JobError::Scheduler(format!("Unknown cron entry: {}", id))),
        }
    }

    /// Reflects the declared entries, not the external state
    pub async fn list(&self) -> Vec<CronEntry> {
        let entries = self.entries.lock().await;
        let mut list: Vec<CronEntry> = entries.values().cloned().collect();
        list.sort_by_key(|e| e.id);
        list
    }

    pub async fn stop_all(&self) {
        // Nothing ticks locally
    }
}

pub enum Scheduler {
    Cron(CronScheduler),
    External(ExternalScheduler),
}

impl Scheduler {
    pub async fn schedule(
        &self,
        expr: &str,
        job_type: JobType,
        payload: serde_json::Value,
    ) -> JobResult<Uuid> {
        match self {
            Scheduler::Cron(s) => s.schedule(expr, job_type, payload).await,
            Scheduler::External(s) => s.schedule(expr, job_type, payload).await,
        }
    }

    pub async fn unschedule(&self, id: Uuid) -> JobResult<()> {
        match self {
            Scheduler::Cron(s) => s.unschedule(id).await,
            Scheduler::External(s) => s.unschedule(id).await,
        }
    }

    pub async fn list(&self) -> Vec<CronEntry> {
        match self {
            Scheduler::Cron(s) => s.list().await,
            Scheduler::External(s) => s.list().await,
        }
    }

    pub async fn stop_all(&self) {
        match self {
            Scheduler::Cron(s) => s.stop_all().await,
            Scheduler::External(s) => s.stop_all().await,
        }
    }

    /// Seed the default recurring entries
    pub async fn seed_defaults(&self) -> JobResult<()> {
        self.schedule("*/5 * * * *", JobType::HealthCheck, serde_json::json!({}))
            .await?;
        self.schedule(
            "10 3 * * *",
            JobType::SnapshotCleanup,
            serde_json::json!({}),
        )
        .await?;
        self.schedule("0 * * * *", JobType::MetricRollup, serde_json::json!({}))
            .await?;
        Ok(())
    }
}

/// One-time factory selecting the variant from config
pub fn build_scheduler(config: &Config, queue: Arc<Queue>) -> Scheduler {
    match config.worker.mode {
        WorkerMode::Local => Scheduler::Cron(CronScheduler::new(queue)),
        WorkerMode::Lambda => Scheduler::External(ExternalScheduler::new(
            config
                .worker
                .lambda_arn
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        )),
    }
}
