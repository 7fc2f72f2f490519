//! Inference server client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::request::ChatCompletionRequest;
use super::tokens::DEFAULT_CONTEXT_LEN;
use crate::error::BackendError;

/// Timeout for health probes and model metadata queries.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const HEALTH_PATH: &str = "/health";
const MODELS_PATH: &str = "/v1/models";
const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Active model as reported by the inference server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    /// Model identifier used in completion requests.
    pub id: String,
    /// Maximum context length in tokens.
    pub max_model_len: usize,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    max_model_len: Option<usize>,
}

/// Operations the cache warmer needs from an inference server.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Whether the server reports itself ready.
    async fn health(&self) -> bool;

    /// The first served model, or `None` if no model is loaded.
    async fn model_info(&self) -> BackendResult<Option<ModelInfo>>;

    /// Send a completion request, discarding the response body.
    async fn complete(&self, request: &ChatCompletionRequest) -> BackendResult<()>;
}

/// OpenAI-compatible HTTP backend (vLLM and friends).
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, request_timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| crate::Error::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl InferenceBackend for HttpBackend {
    async fn health(&self) -> bool {
        match self
            .client
            .get(self.url(HEALTH_PATH))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => {
                let healthy = response.status() == StatusCode::OK;
                if !healthy {
                    tracing::debug!(status = %response.status(), "Backend not ready");
                }
                healthy
            }
            Err(e) => {
                tracing::debug!(error = %e, "Health probe failed");
                false
            }
        }
    }

    async fn model_info(&self) -> BackendResult<Option<ModelInfo>> {
        let response = self
            .client
            .get(self.url(MODELS_PATH))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::status(MODELS_PATH, response.status().as_u16()));
        }

        let models: ModelList = response.json().await?;

        Ok(models.data.into_iter().next().map(|entry| ModelInfo {
            id: entry.id,
            max_model_len: entry.max_model_len.unwrap_or(DEFAULT_CONTEXT_LEN),
        }))
    }

    async fn complete(&self, request: &ChatCompletionRequest) -> BackendResult<()> {
        let response = self
            .client
            .post(self.url(COMPLETIONS_PATH))
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::status(
                COMPLETIONS_PATH,
                response.status().as_u16(),
            ))
        }
    }
}
