
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{EmbedRequest, EmbedResponse, EmbeddingBackend, detail_message};
use crate::config::EmbeddingConfig;
use crate::{RecipeError, Result};

const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// `GET /health` reply of the embedding service.
///
/// The service reports its loaded model; any 2xx reply means it is up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceHealth {
    pub model_path: Option<String>,
    pub tokenizer_name: Option<String>,
    pub tokenizer_path: Option<String>,
    pub prefix: Option<String>,
    pub max_length: Option<usize>,
}

/// Status and body of a completed exchange, whatever the status
#[derive(Debug)]
struct Reply {
    status: u16,
    body: String,
}

/// Client for the remote embedding service
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    base_url: Url,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff: Duration,
    max_input_length: usize,
    backend_id: String,
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

impl HttpEmbeddingClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig, max_input_length: usize) -> Result<Self> {
        let mut base_url = config.service_url()?;
        // Endpoints are joined relative to the base, which needs a trailing slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            backend_id: format!("http:{}", base_url.as_str().trim_end_matches('/')),
            base_url,
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
            retry_attempts: config.retry_attempts.max(1),
            backoff: DEFAULT_BACKOFF,
            max_input_length,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Delay before the first retry; doubles on each further attempt
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| {
            RecipeError::Config(format!("Failed to build URL for {}: {}", path, e))
        })
    }

    /// Query the service health endpoint
    #[inline]
    pub fn health_check(&self) -> Result<ServiceHealth> {
        let url = self.endpoint("health")?;
        debug!("Checking embedding service health at {}", url);

        let reply = self.send_with_retry(|| self.agent.get(url.as_str()).call())?;
        if !(200..300).contains(&reply.status) {
            return Err(RecipeError::EncodingBackend(format!(
                "Health check failed with HTTP {}",
                reply.status
            )));
        }

        let health = serde_json::from_str::<ServiceHealth>(&reply.body).unwrap_or_else(|e| {
            debug!("Health body is not a model report ({}), service still up", e);
            ServiceHealth::default()
        });

        info!(
            "Embedding service at {} is up (tokenizer {:?})",
            self.base_url, health.tokenizer_name
        );
        Ok(health)
    }

    /// Send one `/embed` request and return the parsed reply
    #[inline]
    pub fn embed(&self, request: &EmbedRequest) -> Result<EmbedResponse> {
        let url = self.endpoint("embed")?;
        let request_json = serde_json::to_string(request).map_err(|e| {
            RecipeError::EncodingBackend(format!("Failed to serialize embed request: {}", e))
        })?;

        debug!("Requesting {} embeddings from {}", request.texts.len(), url);

        let reply = self.send_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
        })?;

        match serde_json::from_str::<EmbedResponse>(&reply.body) {
            Ok(EmbedResponse::Success(success)) if !(200..300).contains(&reply.status) => {
                Err(RecipeError::EncodingBackend(format!(
                    "HTTP {} with a success body for model {}",
                    reply.status, success.model
                )))
            }
            Ok(response) => Ok(response),
            Err(_) if !(200..300).contains(&reply.status) => {
                Err(RecipeError::EncodingBackend(format!(
                    "Embedding service returned HTTP {}",
                    reply.status
                )))
            }
            Err(e) => Err(RecipeError::EncodingBackend(format!(
                "Failed to parse embed response: {}",
                e
            ))),
        }
    }

    /// Issue `request_fn` until it yields a non-5xx reply or attempts run out.
    ///
    /// Transport failures and 5xx replies are retried with exponential
    /// backoff; anything else is returned as-is for the caller to interpret.
    fn send_with_retry<F>(&self, mut request_fn: F) -> Result<Reply>
    where
        F: FnMut() -> std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            let outcome = request_fn().and_then(|mut response| {
                let status = response.status().as_u16();
                response
                    .body_mut()
                    .read_to_string()
                    .map(|body| Reply { status, body })
            });

            match outcome {
                Ok(reply) if reply.status >= 500 => {
                    warn!(
                        "Server error (status {}), attempt {}/{}",
                        reply.status, attempt, self.retry_attempts
                    );
                    let detail = serde_json::from_str::<EmbedResponse>(&reply.body)
                        .ok()
                        .and_then(|response| match response {
                            EmbedResponse::Failure { detail } => Some(detail_message(&detail)),
                            EmbedResponse::Success(_) => None,
                        })
                        .unwrap_or_else(|| reply.body.clone());
                    last_error = Some(RecipeError::EncodingBackend(format!(
                        "HTTP {}: {}",
                        reply.status, detail
                    )));
                }
                Ok(reply) => {
                    debug!("Request completed on attempt {}", attempt);
                    return Ok(reply);
                }
                Err(error) => {
                    let retryable = matches!(
                        error,
                        ureq::Error::ConnectionFailed
                            | ureq::Error::HostNotFound
                            | ureq::Error::Timeout(_)
                            | ureq::Error::Io(_)
                    );

                    if !retryable {
                        warn!("Non-retryable error: {}", error);
                        return Err(RecipeError::EncodingBackend(format!(
                            "Request failed: {}",
                            error
                        )));
                    }

                    warn!(
                        "Transport error: {}, attempt {}/{}",
                        error, attempt, self.retry_attempts
                    );
                    last_error = Some(RecipeError::EncodingBackend(format!(
                        "Transport error: {}",
                        error
                    )));
                }
            }

            if attempt < self.retry_attempts {
                let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                debug!("Waiting {:?} before retry", delay);
                std::thread::sleep(delay);
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| {
            RecipeError::EncodingBackend("Request failed after retries".to_string())
        }))
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingClient {
    fn backend_id(&self) -> &str {
        &self.backend_id
    }

    fn max_input_length(&self) -> usize {
        self.max_input_length
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

        let client = self.clone();
        let expected = texts.len();
        let request = EmbedRequest {
            texts: texts.to_vec(),
            prefix: Some(prefix.to_string()),
            normalize: Some(normalize),
        };

        let response = tokio::task::spawn_blocking(move || client.embed(&request))
            .await
            .map_err(|e| RecipeError::EncodingBackend(format!("Request task failed: {}", e)))??;

        response.into_embeddings(expected)
    }
}
