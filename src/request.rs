//! Units of work submitted to the orchestrator.

use crate::error::ApiError;
use crate::types::{ArtifactId, AspectRatio};
use serde::{Deserialize, Serialize};

/// Reference image handed to the backend alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceAsset {
    pub name: String,
    pub mime_type: String,
    /// Base64 payload or URL, passed through untouched.
    pub data: String,
}

/// What a generation backend is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSpec {
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub reference_assets: Vec<ReferenceAsset>,
}

impl GenerationSpec {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: AspectRatio::default(),
            reference_assets: Vec::new(),
        }
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_reference(mut self, asset: ReferenceAsset) -> Self {
        self.reference_assets.push(asset);
        self
    }
}

/// Whether a unit of work produces a primary or a derivative of an existing primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkTarget {
    Primary,
    Derivative { parent_id: ArtifactId },
}

/// One logical generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfWork {
    /// Logical key this work answers (angle, content slot, ...).
    pub request_key: String,
    pub spec: GenerationSpec,
    #[serde(default = "default_target")]
    pub target: WorkTarget,
}

fn default_target() -> WorkTarget {
    WorkTarget::Primary
}

impl UnitOfWork {
    pub fn primary(request_key: impl Into<String>, spec: GenerationSpec) -> Self {
        Self {
            request_key: request_key.into(),
            spec,
            target: WorkTarget::Primary,
        }
    }

    pub fn derivative(
        parent_id: ArtifactId,
        request_key: impl Into<String>,
        spec: GenerationSpec,
    ) -> Self {
        Self {
            request_key: request_key.into(),
            spec,
            target: WorkTarget::Derivative { parent_id },
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.request_key.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "request key cannot be empty".to_string(),
            ));
        }
        if self.spec.prompt.trim().is_empty() {
            return Err(ApiError::InvalidRequest(format!(
                "prompt for '{}' cannot be empty",
                self.request_key
            )));
        }
        Ok(())
    }
}
