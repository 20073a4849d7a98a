//! HTTP image backend: JSON in, image URL or inline base64 out.

use super::{BackendConfig, GeneratedImage, GenerationBackend, ImagePayload};
use crate::error::{ApiError, GenerationError};
use crate::request::GenerationSpec;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const BACKEND_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    aspect_ratio: &'a str,
    reference_assets: Vec<ReferencePart<'a>>,
}

#[derive(Serialize)]
struct ReferencePart<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    image_data: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

fn map_http_error(error: reqwest::Error) -> GenerationError {
    if let Some(status) = error.status() {
        GenerationError::Status {
            code: status.as_u16(),
            message: error.to_string(),
        }
    } else if error.is_timeout() {
        GenerationError::Transport(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        GenerationError::Transport(format!("Connection error: {}", error))
    } else if error.is_decode() {
        GenerationError::MalformedOutput(format!("Failed to decode response: {}", error))
    } else {
        GenerationError::Transport(format!("HTTP error: {}", error))
    }
}

pub struct HttpImageBackend {
    client: Client,
    config: BackendConfig,
    api_key: Option<String>,
}

impl HttpImageBackend {
    pub fn new(config: BackendConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(BACKEND_HTTP_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        let api_key = config.resolve_api_key();
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generate", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationBackend for HttpImageBackend {
    async fn generate(&self, spec: &GenerationSpec) -> Result<GeneratedImage, GenerationError> {
        let request = ImageRequest {
            model: &self.config.model,
            prompt: &spec.prompt,
            aspect_ratio: spec.aspect_ratio.as_str(),
            reference_assets: spec
                .reference_assets
                .iter()
                .map(|asset| ReferencePart {
                    mime_type: &asset.mime_type,
                    data: &asset.data,
                })
                .collect(),
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        debug!(
            backend = %self.config.name,
            model = %self.config.model,
            references = spec.reference_assets.len(),
            "Sending image request"
        );
        let response = builder.send().await.map_err(map_http_error)?;

        if !response.status().is_success() {
            let code = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Status { code, message });
        }

        let body: ImageResponse = response.json().await.map_err(map_http_error)?;
        let payload = match (body.image_url, body.image_data) {
            (Some(url), _) if !url.is_empty() => ImagePayload::Url(url),
            (_, Some(data)) if !data.is_empty() => ImagePayload::Inline {
                mime_type: body.mime_type.unwrap_or_else(|| "image/png".to_string()),
                data,
            },
            _ => {
                return Err(GenerationError::MalformedOutput(
                    "No image in backend response".to_string(),
                ))
            }
        };

        Ok(GeneratedImage {
            payload,
            backend: self.config.name.clone(),
        })
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn reshape(&self, spec: &GenerationSpec) -> GenerationSpec {
        let mut reshaped = spec.clone();
        if let Some(limit) = self.config.max_reference_assets {
            reshaped.reference_assets.truncate(limit);
        }
        reshaped
    }
}
