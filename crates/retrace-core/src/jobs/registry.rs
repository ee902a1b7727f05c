//! Job registry: job-type tag -> handler + metadata

use std::collections::HashMap;
use std::sync::Arc;

use crate::jobs::handlers::{HealthCheckHandler, MetricRollupHandler, SnapshotCleanupHandler};
use crate::jobs::job::{JobMetadata, JobType};
use crate::jobs::JobHandler;

#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler registered
    pub fn with_default_handlers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HealthCheckHandler));
        registry.register(Arc::new(SnapshotCleanupHandler));
        registry.register(Arc::new(MetricRollupHandler));
        registry
    }

    /// Register a handler under its declared job type; last write wins
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.metadata().job_type;
        self.handlers.insert(job_type, handler);
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    /// Metadata for every registered handler, for introspection
    pub fn jobs(&self) -> Vec<JobMetadata> {
        let mut jobs: Vec<JobMetadata> =
            self.handlers.values().map(|h| h.metadata()).collect();
        jobs.sort_by_key(|m| m.job_type.to_string());
        jobs
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
