//! Configuration System
//!
//! Hierarchical configuration for backends, retry budgets, pacing, the watchdog, storage
//! and logging. Layers, lowest precedence first: built-in defaults, the global config file,
//! the workspace's `config/` files, then `EASEL__*` environment variables.

use crate::backend::BackendConfig;
use crate::backoff::RetryConfig;
use crate::classifier::{ClassificationPolicy, Classifier, Disposition, ErrorCategory};
use crate::client::ClientConfig;
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::persistence::StorageConfig;
use crate::queue::QueueConfig;
use crate::session::SessionConfig;
use crate::watchdog::WatchdogConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

mod loader;
mod merge;
mod sources;

pub use loader::ConfigLoader;
pub use sources::workspace_file::ENV_NAME_VAR;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EaselConfig {
    /// Primary image backend
    #[serde(default)]
    pub backend: Option<BackendConfig>,

    /// Backup backend, only used for capacity fallback
    #[serde(default)]
    pub backup: Option<BackendConfig>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub watchdog: WatchdogConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Per-category overrides of the retry/recovery table, keyed by category name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub overrides: HashMap<String, Disposition>,
}

impl ClassifierConfig {
    fn resolved(&self) -> Result<HashMap<ErrorCategory, Disposition>, String> {
        self.overrides
            .iter()
            .map(|(name, disposition)| {
                ErrorCategory::parse(name)
                    .map(|category| (category, *disposition))
                    .ok_or_else(|| format!("unknown error category '{}'", name))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        self.resolved().map(|_| ())
    }

    /// Build the classifier. Unknown category names are skipped (validation reports them).
    pub fn build(&self) -> Classifier {
        let overrides: HashMap<ErrorCategory, Disposition> = self
            .overrides
            .iter()
            .filter_map(|(name, d)| ErrorCategory::parse(name).map(|c| (c, *d)))
            .collect();
        Classifier::new(ClassificationPolicy::with_overrides(&overrides))
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Backend(String, String),
    Section(&'static str, String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Backend(name, msg) => write!(f, "Backend '{}': {}", name, msg),
            ValidationError::Section(section, msg) => write!(f, "[{}] {}", section, msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl EaselConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (slot, backend) in [("backend", &self.backend), ("backup", &self.backup)] {
            if let Some(backend) = backend {
                if let Err(e) = backend.validate() {
                    errors.push(ValidationError::Backend(
                        format!("{} ({})", backend.name, slot),
                        e,
                    ));
                }
            }
        }
        if let (Some(primary), Some(backup)) = (&self.backend, &self.backup) {
            if primary.name == backup.name {
                errors.push(ValidationError::Backend(
                    backup.name.clone(),
                    "backup must have a different name than the primary backend".to_string(),
                ));
            }
        }

        let sections: [(&'static str, Result<(), String>); 6] = [
            ("classifier", self.classifier.validate()),
            ("retry", self.retry.validate()),
            ("client", self.client.validate()),
            ("queue", self.queue.validate()),
            ("watchdog", self.watchdog.validate()),
            ("logging", self.logging.validate()),
        ];
        for (section, result) in sections {
            if let Err(e) = result {
                errors.push(ValidationError::Section(section, e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold errors into one `ApiError`.
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            retry: self.retry,
            queue: self.queue,
            watchdog: self.watchdog,
        }
    }
}
