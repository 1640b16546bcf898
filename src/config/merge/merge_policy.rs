//! Merge rules: built-in defaults sit beneath every file and environment source.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

use crate::config::default_storage_path;

/// Create a Config builder with the built-in defaults applied.
///
/// Only scalar keys are seeded here; sections absent from every source fall back to their
/// serde defaults.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("queue.max_attempts", 5)?
        .set_default("queue.base_delay_ms", 1_000)?
        .set_default("queue.max_delay_ms", 300_000)?
        .set_default("queue.unknown_error_ceiling", 3)?
        .set_default("queue.stale_after_ms", 600_000)?
        .set_default("workers.count", 4)?
        .set_default("workers.poll_interval_ms", 500)?
        .set_default("workers.batch_size", 8)?
        .set_default("workers.generation_timeout_ms", 120_000)?
        .set_default("workers.publish_timeout_ms", 30_000)?
        .set_default("workers.recovery_interval_ms", 60_000)?
        .set_default("pipeline.auto_publish", false)?
        .set_default(
            "storage.path",
            default_storage_path().to_string_lossy().into_owned(),
        )?
        .set_default("metrics.windows_hours", vec![24_i64, 168, 720])
}
