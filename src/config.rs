//! Configuration System
//!
//! Hierarchical configuration with file and environment sources. Values come
//! from an optional TOML file overridden by `SCRIBE_`-prefixed environment
//! variables, with validation collected across all sections before anything
//! is wired up.

use crate::credential::{CredentialPool, StaticCallerSource, StaticSharedSource};
use crate::error::PipelineError;
use crate::logging::LoggingConfig;
use crate::retry::RetryPolicy;
use crate::worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use crate::provider::ProviderConfig;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScribeConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub credentials: CredentialConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub queue: WorkerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Credential discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Environment variable consulted for the environment-tier credential.
    #[serde(default = "default_env_var")]
    pub env_var: String,

    /// Shared-pool credentials, tried in listed order.
    #[serde(default)]
    pub shared: Vec<String>,

    /// Per-caller credentials, keyed by caller identity.
    #[serde(default)]
    pub callers: HashMap<String, String>,

    #[serde(default = "default_quarantine_window_secs")]
    pub quarantine_window_secs: u64,
}

fn default_env_var() -> String {
    "SCRIBE_API_KEY".to_string()
}

fn default_quarantine_window_secs() -> u64 {
    3600
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            env_var: default_env_var(),
            shared: Vec::new(),
            callers: HashMap::new(),
            quarantine_window_secs: default_quarantine_window_secs(),
        }
    }
}

impl CredentialConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.env_var.is_empty() {
            return Err("env_var cannot be empty".to_string());
        }
        if self.quarantine_window_secs == 0 {
            return Err("quarantine_window_secs must be positive".to_string());
        }
        Ok(())
    }

    /// Wire a credential pool from this configuration.
    pub fn build_pool(&self) -> CredentialPool {
        CredentialPool::new(
            Arc::new(StaticCallerSource::new(self.callers.clone())),
            Arc::new(StaticSharedSource::new(self.shared.clone())),
            self.env_var.clone(),
            Duration::from_secs(self.quarantine_window_secs),
        )
    }
}

/// Retry schedule configuration, in file-friendly units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be positive".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("max_delay_ms must be at least base_delay_ms".to_string());
        }
        Ok(())
    }

    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// Storage paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".scribe/jobs")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.store_path.as_os_str().is_empty() {
            return Err("store_path cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Provider(String),
    Credentials(String),
    Retry(String),
    Queue(String),
    Storage(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(msg) => write!(f, "provider: {}", msg),
            ValidationError::Credentials(msg) => write!(f, "credentials: {}", msg),
            ValidationError::Retry(msg) => write!(f, "retry: {}", msg),
            ValidationError::Queue(msg) => write!(f, "queue: {}", msg),
            ValidationError::Storage(msg) => write!(f, "storage: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ScribeConfig {
    /// Load configuration from an optional file plus `SCRIBE_` environment
    /// overrides (double underscore as the section separator, e.g.
    /// `SCRIBE_PROVIDER__MODEL`).
    pub fn load(file: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("SCRIBE")
                .separator("__")
                .try_parsing(true),
        );

        let config: ScribeConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate every section, collecting all problems.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }
        if let Err(e) = self.credentials.validate() {
            errors.push(ValidationError::Credentials(e));
        }
        if let Err(e) = self.retry.validate() {
            errors.push(ValidationError::Retry(e));
        }
        if let Err(e) = self.queue.validate() {
            errors.push(ValidationError::Queue(e));
        }
        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and render failures as one `PipelineError`.
    pub fn validated(self) -> Result<Self, PipelineError> {
        self.validate().map_err(|errors| {
            let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            PipelineError::Config(format!(
                "configuration validation failed:\n{}",
                rendered.join("\n")
            ))
        })?;
        Ok(self)
    }
}
