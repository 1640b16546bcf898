//! Configuration
//!
//! Layered with the `config` crate, lowest precedence first: built-in defaults, the global
//! file, workspace files, then `GATEHOUSE__SECTION__KEY` environment variables.

use crate::backoff::BackoffPolicy;
use crate::logging::LoggingConfig;
use crate::orchestrator::{PipelineSettings, WorkerPoolConfig};
use crate::queue::RetryPolicy;
use crate::validation::Taxonomy;
use config::{ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod merge;
mod sources;

pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatehouseConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub taxonomy: Taxonomy,
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub unknown_error_ceiling: u32,
    pub stale_after_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            unknown_error_ceiling: 3,
            stale_after_ms: 600_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersConfig {
    pub count: usize,
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    pub generation_timeout_ms: u64,
    pub publish_timeout_ms: u64,
    pub recovery_interval_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: 4,
            poll_interval_ms: 500,
            batch_size: 8,
            generation_timeout_ms: 120_000,
            publish_timeout_ms: 30_000,
            recovery_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub auto_publish: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// `$XDG_DATA_HOME/gatehouse/store`, or `.gatehouse/store` when no home is known.
pub fn default_storage_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "gatehouse")
        .map(|dirs| dirs.data_dir().join("store"))
        .unwrap_or_else(|| PathBuf::from(".gatehouse/store"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub windows_hours: Vec<u64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            windows_hours: vec![24, 168, 720],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    pub generation_endpoint: Option<String>,
    pub publish_endpoint: Option<String>,
    pub api_key: Option<String>,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Queue(String),
    Workers(String),
    Metrics(String),
    Taxonomy(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Queue(msg) => write!(f, "queue: {}", msg),
            ValidationError::Workers(msg) => write!(f, "workers: {}", msg),
            ValidationError::Metrics(msg) => write!(f, "metrics: {}", msg),
            ValidationError::Taxonomy(msg) => write!(f, "taxonomy: {}", msg),
            ValidationError::Logging(msg) => write!(f, "logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl GatehouseConfig {
    /// Validate the entire configuration, returning every violation.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let q = &self.queue;
        if q.max_attempts == 0 {
            errors.push(ValidationError::Queue("max_attempts must be at least 1".into()));
        }
        if q.base_delay_ms == 0 {
            errors.push(ValidationError::Queue("base_delay_ms must be positive".into()));
        }
        if q.base_delay_ms > q.max_delay_ms {
            errors.push(ValidationError::Queue(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                q.base_delay_ms, q.max_delay_ms
            )));
        }
        if q.unknown_error_ceiling == 0 {
            errors.push(ValidationError::Queue(
                "unknown_error_ceiling must be at least 1".into(),
            ));
        }
        if q.stale_after_ms == 0 {
            errors.push(ValidationError::Queue("stale_after_ms must be positive".into()));
        }

        let w = &self.workers;
        if w.count == 0 {
            errors.push(ValidationError::Workers("count must be at least 1".into()));
        }
        if w.batch_size == 0 {
            errors.push(ValidationError::Workers("batch_size must be at least 1".into()));
        }
        for (name, value) in [
            ("poll_interval_ms", w.poll_interval_ms),
            ("generation_timeout_ms", w.generation_timeout_ms),
            ("publish_timeout_ms", w.publish_timeout_ms),
            ("recovery_interval_ms", w.recovery_interval_ms),
        ] {
            if value == 0 {
                errors.push(ValidationError::Workers(format!("{} must be positive", name)));
            }
        }
        for (name, value) in [
            ("generation_timeout_ms", w.generation_timeout_ms),
            ("publish_timeout_ms", w.publish_timeout_ms),
        ] {
            if value >= q.stale_after_ms {
                errors.push(ValidationError::Workers(format!(
                    "{} ({}) must be below queue.stale_after_ms ({})",
                    name, value, q.stale_after_ms
                )));
            }
        }

        if self.metrics.windows_hours.is_empty() {
            errors.push(ValidationError::Metrics("windows_hours cannot be empty".into()));
        }
        if self.metrics.windows_hours.contains(&0) {
            errors.push(ValidationError::Metrics("windows must be at least one hour".into()));
        }

        for (category, subs) in &self.taxonomy.categories {
            if category.trim().is_empty() {
                errors.push(ValidationError::Taxonomy("empty category id".into()));
            }
            if subs.iter().any(|s| s.trim().is_empty()) {
                errors.push(ValidationError::Taxonomy(format!(
                    "category '{}' has an empty subcategory id",
                    category
                )));
            }
        }

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.queue.max_attempts,
            backoff: BackoffPolicy::new(
                Duration::from_millis(self.queue.base_delay_ms),
                Duration::from_millis(self.queue.max_delay_ms),
            ),
            unknown_error_ceiling: self.queue.unknown_error_ceiling,
            stale_after: Duration::from_millis(self.queue.stale_after_ms),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            generation_timeout: Duration::from_millis(self.workers.generation_timeout_ms),
            publish_timeout: Duration::from_millis(self.workers.publish_timeout_ms),
            auto_publish: self.pipeline.auto_publish,
            metrics_windows_hours: self.metrics.windows_hours.clone(),
        }
    }

    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            workers: self.workers.count,
            poll_interval: Duration::from_millis(self.workers.poll_interval_ms),
            batch_size: self.workers.batch_size,
            recovery_interval: Duration::from_millis(self.workers.recovery_interval_ms),
        }
    }
}

/// Loads [`GatehouseConfig`] from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Built-in defaults only.
    pub fn default() -> GatehouseConfig {
        GatehouseConfig::default()
    }

    /// Defaults, global file, workspace files under `workspace_root`, then environment.
    pub fn load(workspace_root: &Path) -> Result<GatehouseConfig, ConfigError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        builder
            .add_source(Environment::with_prefix("GATEHOUSE").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Defaults overlaid with one explicit file.
    pub fn load_from_file(path: &Path) -> Result<GatehouseConfig, ConfigError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        builder
            .add_source(File::from(path))
            .build()?
            .try_deserialize()
    }

    /// Parse a TOML string on top of the defaults.
    pub fn load_from_str(toml: &str) -> Result<GatehouseConfig, ConfigError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        builder
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
