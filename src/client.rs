//! Generation Client
//!
//! Wraps one call to the primary backend in a hard wall-clock timeout. Capacity failures
//! (quota, overload) get exactly one hop to the backup backend; everything else is returned
//! to the caller, whose retry loop decides what happens next.

use crate::artifact::ArtifactKind;
use crate::backend::{GeneratedImage, GenerationBackend};
use crate::classifier::Classifier;
use crate::error::GenerationError;
use crate::request::GenerationSpec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for primary artifact calls.
    #[serde(default = "default_primary_timeout_ms")]
    pub primary_timeout_ms: u64,
    /// Timeout for derivative calls, which are expected to be quicker.
    #[serde(default = "default_derivative_timeout_ms")]
    pub derivative_timeout_ms: u64,
    #[serde(default = "default_fallback_enabled")]
    pub fallback_enabled: bool,
}

fn default_primary_timeout_ms() -> u64 {
    120_000
}

fn default_derivative_timeout_ms() -> u64 {
    60_000
}

fn default_fallback_enabled() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            primary_timeout_ms: default_primary_timeout_ms(),
            derivative_timeout_ms: default_derivative_timeout_ms(),
            fallback_enabled: default_fallback_enabled(),
        }
    }
}

impl ClientConfig {
    pub fn timeout_for(&self, kind: ArtifactKind) -> Duration {
        match kind {
            ArtifactKind::Primary => Duration::from_millis(self.primary_timeout_ms),
            ArtifactKind::Derivative => Duration::from_millis(self.derivative_timeout_ms),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.primary_timeout_ms == 0 || self.derivative_timeout_ms == 0 {
            return Err("timeouts must be greater than zero".to_string());
        }
        Ok(())
    }
}

pub struct GenerationClient {
    primary: Arc<dyn GenerationBackend>,
    backup: Option<Arc<dyn GenerationBackend>>,
    classifier: Classifier,
    config: ClientConfig,
}

impl GenerationClient {
    pub fn new(
        primary: Arc<dyn GenerationBackend>,
        backup: Option<Arc<dyn GenerationBackend>>,
        classifier: Classifier,
        config: ClientConfig,
    ) -> Self {
        Self {
            primary,
            backup,
            classifier,
            config,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// One logical attempt: the timed primary call plus, for capacity failures, the single
    /// backup hop. A failed hop surfaces the primary's error.
    pub async fn generate(
        &self,
        spec: &GenerationSpec,
        kind: ArtifactKind,
    ) -> Result<GeneratedImage, GenerationError> {
        let limit = self.config.timeout_for(kind);
        let original = match timed(self.primary.as_ref(), spec, limit).await {
            Ok(image) => return Ok(image),
            Err(error) => error,
        };

        let category = self.classifier.classify(&original).category;
        let backup = match &self.backup {
            Some(backup) if self.config.fallback_enabled && category.is_capacity() => backup,
            _ => return Err(original),
        };

        info!(
            primary = %self.primary.name(),
            backup = %backup.name(),
            category = %category,
            "Primary backend out of capacity, trying backup"
        );
        let reshaped = backup.reshape(spec);
        match timed(backup.as_ref(), &reshaped, limit).await {
            Ok(image) => {
                debug!(backup = %backup.name(), "Backup backend produced image");
                Ok(image)
            }
            Err(backup_error) => {
                warn!(
                    backup = %backup.name(),
                    error = %backup_error,
                    "Backup backend failed, surfacing primary error"
                );
                Err(original)
            }
        }
    }
}

/// Race `backend.generate` against a timer. The losing call is dropped.
async fn timed(
    backend: &dyn GenerationBackend,
    spec: &GenerationSpec,
    limit: Duration,
) -> Result<GeneratedImage, GenerationError> {
    match tokio::time::timeout(limit, backend.generate(spec)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                backend = %backend.name(),
                timeout_ms = limit.as_millis() as u64,
                "Generation call timed out"
            );
            Err(GenerationError::Timeout {
                after_ms: limit.as_millis() as u64,
            })
        }
    }
}
