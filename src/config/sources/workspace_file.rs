//! Workspace config files: config/config.toml, then config/{GATEHOUSE_ENV}.toml.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::{Path, PathBuf};

/// Environment variable selecting the per-environment overlay.
pub const ENV_NAME_VAR: &str = "GATEHOUSE_ENV";

const DEFAULT_ENV_NAME: &str = "development";

fn environment_name() -> String {
    std::env::var(ENV_NAME_VAR)
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENV_NAME.to_string())
}

/// Workspace config files in ascending precedence.
pub fn candidate_paths(workspace_root: &Path) -> [PathBuf; 2] {
    let config_dir = workspace_root.join("config");
    [
        config_dir.join("config.toml"),
        config_dir.join(format!("{}.toml", environment_name())),
    ]
}

/// Add whichever workspace files exist to the builder.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(candidate_paths(workspace_root)
        .into_iter()
        .filter(|path| path.exists())
        .fold(builder, |builder, path| {
            builder.add_source(File::from(path).required(false))
        }))
}
