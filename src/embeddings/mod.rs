// Embeddings module
// Encoding backends: in-process encoder or the remote embedding service

pub mod http;


use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Config, EmbeddingBackendKind};
use crate::encoder::TextEncoder;
use crate::{RecipeError, Result};

pub use http::{HttpEmbeddingClient, ServiceHealth};

/// Anything that turns a batch of texts into vectors
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Identifier reported by health and diagnostics output
    fn backend_id(&self) -> &str;

    /// Longest input, in tokens, the backend accepts before truncating
    fn max_input_length(&self) -> usize;

    /// One vector per text, in input order; empty input never reaches the backend
    async fn encode(&self, texts: &[String], prefix: &str, normalize: bool)
    -> Result<Vec<Vec<f32>>>;
}

/// Runs the in-process encoder on the blocking pool
#[derive(Debug, Clone)]
pub struct LocalBackend {
    encoder: Arc<TextEncoder>,
    backend_id: String,
}

impl LocalBackend {
    #[inline]
    pub fn new(encoder: Arc<TextEncoder>) -> Self {
        let backend_id = format!("local:{}", encoder.model_name());
        Self {
            encoder,
            backend_id,
        }
    }

    #[cfg(feature = "onnx")]
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(Arc::new(TextEncoder::from_config(config)?)))
    }
}

#[async_trait]
impl EmbeddingBackend for LocalBackend {
    fn backend_id(&self) -> &str {
        &self.backend_id
    }

    fn max_input_length(&self) -> usize {
        self.encoder.max_length()
    }

    async fn encode(
        &self,
        texts: &[String],
        prefix: &str,
        normalize: bool,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encoder = Arc::clone(&self.encoder);
        let texts = texts.to_vec();
        let prefix = prefix.to_string();

        tokio::task::spawn_blocking(move || encoder.encode(&texts, &prefix, normalize))
            .await
            .map_err(|e| RecipeError::EncodingBackend(format!("Encoder task failed: {}", e)))?
    }
}

/// Build the backend selected by `[embedding] backend`
#[inline]
pub fn build_backend(config: &Config) -> Result<Arc<dyn EmbeddingBackend>> {
    match config.embedding.backend {
        EmbeddingBackendKind::Http => {
            debug!("Using HTTP embedding backend at {}", config.embedding.url);
            let client = HttpEmbeddingClient::new(&config.embedding, config.encoder.max_length)?;
            Ok(Arc::new(client))
        }
        #[cfg(feature = "onnx")]
        EmbeddingBackendKind::Local => {
            debug!("Using local encoder {}", config.encoder.model_name);
            Ok(Arc::new(LocalBackend::from_config(config)?))
        }
        #[cfg(not(feature = "onnx"))]
        EmbeddingBackendKind::Local => Err(RecipeError::Config(
            "backend = \"local\" requires building with the `onnx` feature".to_string(),
        )),
    }
}

/// Body of `POST /embed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub texts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize: Option<bool>,
}

impl EmbedRequest {
    /// Validate an untyped payload: `texts` must be a non-empty array of strings
    #[inline]
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let texts = value
            .get("texts")
            .ok_or_else(|| RecipeError::InputValidation("`texts` is required".to_string()))?;

        let items = texts.as_array().ok_or_else(|| {
            RecipeError::InputValidation("`texts` must be an array of strings".to_string())
        })?;

        if items.is_empty() {
            return Err(RecipeError::InputValidation(
                "`texts` must not be empty".to_string(),
            ));
        }

        if let Some((index, _)) = items.iter().enumerate().find(|(_, item)| !item.is_string()) {
            return Err(RecipeError::InputValidation(format!(
                "`texts[{}]` is not a string",
                index
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| RecipeError::InputValidation(format!("Invalid embed request: {}", e)))
    }

    #[inline]
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| RecipeError::InputValidation(format!("Invalid JSON: {}", e)))?;
        Self::from_value(value)
    }
}

/// Successful `/embed` reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedSuccess {
    pub model: String,
    pub normalize: bool,
    pub count: usize,
    pub embeddings: Vec<Vec<f32>>,
}

/// `/embed` reply, either vectors or an error detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbedResponse {
    Success(EmbedSuccess),
    Failure { detail: serde_json::Value },
}

impl EmbedResponse {
    #[inline]
    pub fn success(model: impl Into<String>, normalize: bool, embeddings: Vec<Vec<f32>>) -> Self {
        Self::Success(EmbedSuccess {
            model: model.into(),
            normalize,
            count: embeddings.len(),
            embeddings,
        })
    }

    /// Vectors for `expected` inputs, or an error describing why there are none
    #[inline]
    pub fn into_embeddings(self, expected: usize) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::Success(success) => {
                if success.embeddings.len() != expected || success.count != expected {
                    return Err(RecipeError::EncodingBackend(format!(
                        "Expected {} embeddings, service returned {} (count {})",
                        expected,
                        success.embeddings.len(),
                        success.count
                    )));
                }

                let width = success.embeddings.first().map_or(0, Vec::len);
                if success.embeddings.iter().any(|v| v.len() != width || v.is_empty()) {
                    return Err(RecipeError::EncodingBackend(
                        "Service returned embeddings of inconsistent dimension".to_string(),
                    ));
                }

                Ok(success.embeddings)
            }
            Self::Failure { detail } => Err(RecipeError::EncodingBackend(format!(
                "Embedding service error: {}",
                detail_message(&detail)
            ))),
        }
    }
}

/// Flatten a `detail` payload (string or validation list) into one line
#[inline]
pub fn detail_message(detail: &serde_json::Value) -> String {
    match detail {
        serde_json::Value::String(message) => message.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| {
                item.get("msg")
                    .and_then(serde_json::Value::as_str)
                    .map_or_else(|| item.to_string(), str::to_string)
            })
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}
