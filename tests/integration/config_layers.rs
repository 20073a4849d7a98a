//! Integration tests for layered configuration

use crate::integration::test_utils::{EnvGuard, ENV_MUTEX};
use easel::config::{ConfigLoader, ENV_NAME_VAR};
use tempfile::TempDir;

#[test]
fn test_environment_overrides_files() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("workspace");
    std::fs::create_dir_all(workspace.join("config")).unwrap();
    std::fs::write(
        workspace.join("config").join("config.toml"),
        "[queue]\npacing_ms = 1500\n\n[watchdog]\nstuck_threshold_ms = 240000\n",
    )
    .unwrap();

    let _env = EnvGuard::set(&[
        ("XDG_CONFIG_HOME", Some(temp_dir.path().join("xdg").to_str().unwrap())),
        (ENV_NAME_VAR, None),
        ("EASEL__QUEUE__PACING_MS", Some("250")),
    ]);

    let config = ConfigLoader::load(&workspace).unwrap();
    assert_eq!(config.queue.pacing_ms, 250);
    assert_eq!(config.watchdog.stuck_threshold_ms, 240_000);
    assert_eq!(config.queue.variation_concurrency, 3);

    let session = config.session_config();
    assert_eq!(session.queue.pacing_ms, 250);
    assert_eq!(session.retry.primary.max_retries, 5);
}

#[test]
fn test_backends_and_classifier_overrides_from_file() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("easel.toml");
    std::fs::write(
        &path,
        r#"
[backend]
name = "imagen"
base_url = "https://images.example/v1"
model = "imagen-4"

[backup]
name = "flux"
base_url = "https://flux.example"
model = "flux-pro"

[classifier.overrides.permission-denied]
retryable = true
recoverable = true
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.backup.as_ref().unwrap().name, "flux");

    let classifier = config.classifier.build();
    let c = classifier.classify(&easel::error::GenerationError::Status {
        code: 403,
        message: "forbidden".to_string(),
    });
    assert!(c.retryable);
}
