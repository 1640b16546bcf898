//! Layered configuration loading from files and the environment.

use gatehouse::config::{ConfigLoader, ValidationError};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

#[test]
fn test_explicit_file_with_taxonomy() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("gatehouse.toml");
    std::fs::write(
        &path,
        r#"
[queue]
base_delay_ms = 500
max_delay_ms = 8000

[workers]
count = 2

[taxonomy.categories]
engineering = ["distributed-systems"]
design = ["visual"]
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.workers.count, 2);
    assert!(config.taxonomy.has_category("design"));
    assert!(config.taxonomy.has_subcategory("engineering", "distributed-systems"));

    let policy = config.retry_policy();
    assert_eq!(policy.backoff.base_delay, Duration::from_millis(500));
    assert_eq!(policy.backoff.max_delay, Duration::from_secs(8));
}

#[test]
fn test_environment_overrides_workspace_file() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp = TempDir::new().unwrap();
    let config_dir = temp.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "[queue]\nmax_attempts = 3\n").unwrap();

    std::env::set_var("GATEHOUSE__QUEUE__MAX_ATTEMPTS", "9");
    let config = ConfigLoader::load(temp.path());
    std::env::remove_var("GATEHOUSE__QUEUE__MAX_ATTEMPTS");

    assert_eq!(config.unwrap().queue.max_attempts, 9);
}

#[test]
fn test_workspace_file_without_environment() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp = TempDir::new().unwrap();
    let config_dir = temp.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "[queue]\nmax_attempts = 3\n").unwrap();

    let config = ConfigLoader::load(temp.path()).unwrap();
    assert_eq!(config.queue.max_attempts, 3);
    assert_eq!(config.queue.stale_after_ms, 600_000);
}

#[test]
fn test_invalid_file_is_reported_by_section() {
    let config = ConfigLoader::load_from_str(
        r#"
[queue]
unknown_error_ceiling = 0

[workers]
generation_timeout_ms = 900000
"#,
    )
    .unwrap();

    let errors = config.validate().unwrap_err();
    assert!(errors.iter().any(|e| matches!(e, ValidationError::Queue(_))));
    assert!(errors.iter().any(|e| matches!(e, ValidationError::Workers(_))));
    assert!(errors
        .iter()
        .all(|e| e.to_string().starts_with("queue:") || e.to_string().starts_with("workers:")));
}

#[test]
fn test_malformed_toml_is_an_error() {
    assert!(ConfigLoader::load_from_str("[queue\nmax_attempts = 3").is_err());
}
