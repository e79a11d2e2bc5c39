//! Configuration loading across file and default layers.

use scribe::config::ScribeConfig;
use tempfile::TempDir;

#[test]
fn missing_file_yields_defaults() {
    let config = ScribeConfig::load(None).unwrap();
    assert_eq!(config.provider.model, "gpt-4o-mini");
    assert_eq!(config.credentials.env_var, "SCRIBE_API_KEY");
    assert!(config.validate().is_ok());
}

#[test]
fn full_file_round_trips_into_wired_components() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("scribe.toml");
    std::fs::write(
        &config_file,
        r#"
[provider]
endpoint = "http://localhost:9999/v1"
model = "local-model"
max_tokens = 2048

[credentials]
env_var = "SCRIBE_ITEST_KEY_UNSET"
shared = ["key-one"]
quarantine_window_secs = 120

[retry]
max_attempts = 2
base_delay_ms = 10
max_delay_ms = 100

[queue]
workers = 1

[logging]
level = "warn"
format = "json"
"#,
    )
    .unwrap();

    let config = ScribeConfig::load(Some(&config_file)).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.provider.max_tokens, Some(2048));
    assert_eq!(config.logging.level, "warn");

    let policy = config.retry.to_policy();
    assert_eq!(policy.max_attempts, 2);

    let pool = config.credentials.build_pool();
    let candidates = pool.acquire(None);
    // Shared credential first, compiled-in fallback last.
    assert_eq!(candidates[0].value, "key-one");
    assert_eq!(
        candidates.last().unwrap().value,
        scribe::credential::FALLBACK_CREDENTIAL
    );
}

#[test]
fn invalid_file_surfaces_validation_errors() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("scribe.toml");
    std::fs::write(
        &config_file,
        r#"
[provider]
model = ""

[queue]
workers = 0
"#,
    )
    .unwrap();

    let config = ScribeConfig::load(Some(&config_file)).unwrap();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(config.validated().is_err());
}
