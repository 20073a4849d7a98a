//! Generation Backend Abstraction
//!
//! The external image service the orchestrator drives. A primary backend serves every
//! call; an optional backup implementing the same contract is only used by the client's
//! capacity fallback.

use crate::error::{ApiError, GenerationError};
use crate::request::GenerationSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod http;

pub use http::HttpImageBackend;

/// Produced image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagePayload {
    Url(String),
    Inline { mime_type: String, data: String },
}

impl ImagePayload {
    /// Short human-readable description for tables and logs.
    pub fn describe(&self) -> String {
        match self {
            ImagePayload::Url(url) => url.clone(),
            ImagePayload::Inline { mime_type, data } => {
                format!("inline {} ({} bytes b64)", mime_type, data.len())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub payload: ImagePayload,
    /// Name of the backend that produced it.
    pub backend: String,
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Produce one image for `spec`.
    async fn generate(&self, spec: &GenerationSpec) -> Result<GeneratedImage, GenerationError>;

    fn name(&self) -> &str;

    /// Adapt a request written for another backend to this one's limits.
    fn reshape(&self, spec: &GenerationSpec) -> GenerationSpec {
        spec.clone()
    }
}

/// Connection settings for an HTTP image backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Label used in logs and on produced images.
    #[serde(default = "default_backend_name")]
    pub name: String,
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable to read the key from when `api_key` is unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// References beyond this count are dropped when a request is reshaped for this backend.
    #[serde(default)]
    pub max_reference_assets: Option<usize>,
}

fn default_backend_name() -> String {
    "primary".to_string()
}

impl BackendConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("base_url cannot be empty".to_string());
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!("base_url must be http(s): {}", self.base_url));
        }
        if self.model.trim().is_empty() {
            return Err("model cannot be empty".to_string());
        }
        Ok(())
    }

    /// Resolve the API key from config or the named environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_ref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|key| !key.is_empty())
        })
    }
}

/// Build a backend from its configuration.
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn GenerationBackend>, ApiError> {
    config
        .validate()
        .map_err(|e| ApiError::ConfigError(format!("Backend '{}': {}", config.name, e)))?;
    Ok(Arc::new(HttpImageBackend::new(config.clone())?))
}
