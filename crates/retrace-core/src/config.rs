use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::{Error, Result};

/// Deployment environment, selected by `NODE_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

impl Environment {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" => Some(Environment::Development),
            "test" => Some(Environment::Test),
            "staging" => Some(Environment::Staging),
            "production" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Worker deployment mode, selected by `WORKER_MODE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// Long-lived process with an internal queue and cron ticker
    Local,

    /// Invoked by a managed dispatcher; queue is SQS, cron is EventBridge
    Lambda,
}

impl Default for WorkerMode {
    fn default() -> Self {
        WorkerMode::Local
    }
}

impl fmt::Display for WorkerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerMode::Local => write!(f, "local"),
            WorkerMode::Lambda => write!(f, "lambda"),
        }
    }
}

/// Main configuration structure for retrace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub replay: ReplayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from the environment only
    pub fn from_env() -> Result<Self> {
        if let Ok(config_path) = std::env::var("RETRACE_CONFIG") {
            return Self::load(&config_path);
        }

        let default_paths = ["./config/default.toml", "/etc/retrace/config.toml"];
        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::load(path);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the recognized environment variables onto the file config
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("NODE_ENV") {
            self.environment = Environment::from_str_loose(&v)
                .ok_or_else(|| Error::Config(format!("Invalid NODE_ENV: {}", v)))?;
        }
        if let Ok(v) = std::env::var("PORT") {
            self.server.port = v
                .parse()
                .map_err(|_| Error::Config(format!("Invalid PORT: {}", v)))?;
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Ok(v) = std::env::var("JWT_ACCESS_EXPIRES_IN") {
            self.auth.access_expires_in_secs = v
                .parse()
                .map_err(|_| Error::Config(format!("Invalid JWT_ACCESS_EXPIRES_IN: {}", v)))?;
        }
        if let Ok(v) = std::env::var("JWT_REFRESH_EXPIRES_IN_DAYS") {
            self.auth.refresh_expires_in_days = v.parse().map_err(|_| {
                Error::Config(format!("Invalid JWT_REFRESH_EXPIRES_IN_DAYS: {}", v))
            })?;
        }
        if let Ok(v) = std::env::var("WORKER_MODE") {
            self.worker.mode = match v.to_lowercase().as_str() {
                "local" => WorkerMode::Local,
                "lambda" => WorkerMode::Lambda,
                _ => return Err(Error::Config(format!("Invalid WORKER_MODE: {}", v))),
            };
        }
        if let Ok(v) = std::env::var("WORKER_URL") {
            self.worker.url = v;
        }
        if let Ok(v) = std::env::var("WORKER_PORT") {
            self.worker.port = v
                .parse()
                .map_err(|_| Error::Config(format!("Invalid WORKER_PORT: {}", v)))?;
        }
        if let Ok(v) = std::env::var("SQS_QUEUE_URL") {
            self.worker.sqs_queue_url = Some(v);
        }
        if let Ok(v) = std::env::var("AWS_REGION") {
            self.worker.aws_region = Some(v);
        }
        if let Ok(v) = std::env::var("LAMBDA_ARN") {
            self.worker.lambda_arn = Some(v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("Invalid server port".to_string()));
        }

        if self.database.url.is_empty() {
            return Err(Error::Config("DATABASE_URL is required".to_string()));
        }

        if self.database.pool_size == 0 {
            return Err(Error::Config(
                "Database pool size must be > 0".to_string(),
            ));
        }

        if self.environment.is_production() && self.auth.jwt_secret == default_jwt_secret() {
            return Err(Error::Config(
                "JWT_SECRET must be set in production".to_string(),
            ));
        }

        if self.worker.mode == WorkerMode::Lambda {
            if self.worker.sqs_queue_url.is_none() {
                return Err(Error::Config(
                    "SQS_QUEUE_URL is required when WORKER_MODE=lambda".to_string(),
                ));
            }
            if self.worker.aws_region.is_none() {
                return Err(Error::Config(
                    "AWS_REGION is required when WORKER_MODE=lambda".to_string(),
                ));
            }
            if self.worker.lambda_arn.is_none() {
                return Err(Error::Config(
                    "LAMBDA_ARN is required when WORKER_MODE=lambda".to_string(),
                ));
            }
        }

        if self.snapshot.max_body_bytes == 0 {
            return Err(Error::Config(
                "snapshot.max_body_bytes must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_graceful_shutdown")]
    pub graceful_shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            graceful_shutdown_timeout_secs: default_graceful_shutdown(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pool_size(),
            idle_timeout_secs: default_idle_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_access_expiry")]
    pub access_expires_in_secs: u64,

    #[serde(default = "default_refresh_expiry_days")]
    pub refresh_expires_in_days: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_expires_in_secs: default_access_expiry(),
            refresh_expires_in_days: default_refresh_expiry_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub mode: WorkerMode,

    /// Base URL for intra-process worker introspection calls
    #[serde(default = "default_worker_url")]
    pub url: String,

    /// Listen port for the worker introspection server (local mode)
    #[serde(default = "default_worker_port")]
    pub port: u16,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Heartbeat rows older than this are reported unhealthy
    #[serde(default = "default_heartbeat_stale")]
    pub heartbeat_stale_secs: i64,

    /// Bounded wait for in-flight jobs on shutdown
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,

    /// Deadline for outbound introspection calls
    #[serde(default = "default_introspection_timeout")]
    pub introspection_timeout_secs: u64,

    #[serde(default)]
    pub sqs_queue_url: Option<String>,

    #[serde(default)]
    pub aws_region: Option<String>,

    #[serde(default)]
    pub lambda_arn: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: WorkerMode::default(),
            url: default_worker_url(),
            port: default_worker_port(),
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_stale_secs: default_heartbeat_stale(),
            drain_timeout_secs: default_drain_timeout(),
            introspection_timeout_secs: default_introspection_timeout(),
            sqs_queue_url: None,
            aws_region: None,
            lambda_arn: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Only requests under this prefix are captured
    #[serde(default = "default_snapshot_prefix")]
    pub prefix: String,

    /// Stored request/response bodies are truncated at this bound
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Header names redacted from stored snapshots, case-insensitive
    /// (merged with the built-in `authorization` and `cookie`)
    #[serde(default)]
    pub redact_headers: Vec<String>,

    /// Optional CSV file of `start_ip,end_ip,country` ranges for IP geo lookup
    #[serde(default)]
    pub geo_db_path: Option<String>,

    /// SnapshotCleanup job retention window
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            prefix: default_snapshot_prefix(),
            max_body_bytes: default_max_body_bytes(),
            redact_headers: Vec::new(),
            geo_db_path: None,
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Methods eligible for replay
    #[serde(default = "default_replay_methods")]
    pub allowed_methods: Vec<String>,

    /// Path prefixes refused for replay regardless of method
    #[serde(default)]
    pub denied_path_prefixes: Vec<String>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            allowed_methods: default_replay_methods(),
            denied_path_prefixes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of fatal, error, warn, info, debug, trace, silent
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Map the configured level onto a tracing EnvFilter directive
    pub fn env_filter(&self) -> String {
        let level = match self.level.to_lowercase().as_str() {
            "fatal" | "error" => "error",
            "warn" => "warn",
            "info" => "info",
            "debug" => "debug",
            "trace" => "trace",
            "silent" => "off",
            _ => "info",
        };
        format!("retrace={level},tower_http=warn,sqlx=warn", level = level)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_graceful_shutdown() -> u64 {
    30
}

fn default_pool_size() -> u32 {
    5
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_probe_timeout() -> u64 {
    2
}

fn default_jwt_secret() -> String {
    "insecure-dev-secret".to_string()
}

fn default_access_expiry() -> u64 {
    900
}

fn default_refresh_expiry_days() -> u64 {
    30
}

fn default_worker_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_worker_port() -> u16 {
    8081
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_heartbeat_stale() -> i64 {
    300
}

fn default_drain_timeout() -> u64 {
    25
}

fn default_introspection_timeout() -> u64 {
    5
}

fn default_snapshot_prefix() -> String {
    "/api/v1".to_string()
}

fn default_max_body_bytes() -> usize {
    65536
}

fn default_retention_days() -> i64 {
    30
}

fn default_replay_methods() -> Vec<String> {
    vec![
        "GET".to_string(),
        "POST".to_string(),
        "PUT".to_string(),
        "PATCH".to_string(),
        "DELETE".to_string(),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}
