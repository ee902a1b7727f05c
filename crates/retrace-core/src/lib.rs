//! retrace-core: domain library for the retrace observability and replay
//! system
//!
//! Holds the configuration, error taxonomy, data model, repositories, job
//! subsystem (queue, scheduler, dispatcher, heartbeat), snapshot capture
//! helpers, and the auth verifier. The HTTP surface lives in `retrace-api`;
//! the binary in `retrace`.

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod jobs;
pub mod models;
pub mod repository;
pub mod services;
pub mod snapshot;

// Re-export commonly used types
pub use config::{Config, Environment, WorkerMode};
pub use db::{auto_migrate, Migrator};
pub use error::{Error, Issue, IssueList, Result};
pub use models::{
    GenericRecord, GeoContext, GeoSource, NewSnapshot, PaginationInfo, PaginationParams,
    RequestSnapshot, WorkerStatsReport, WorkerStatsRow,
};
pub use repository::{create_pool, Database, SnapshotRepository, TableRepository, WorkerStatsRepository};
pub use services::{AuthContext, AuthService, Claims};
