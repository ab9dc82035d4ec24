//! Embedding backend abstraction and HTTP client.
//!
//! The backend contract is `embed(texts) -> vectors` with a fixed dimension
//! advertised once; the dimension flows into export manifests so merge
//! targets can reject incompatible packages.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::utils::retry::{RetryConfig, with_retry};

/// Replaceable embedding backend.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a batch of texts into fixed-dimension vectors, one per input.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Vector dimension this backend produces.
    fn dimension(&self) -> usize;

    /// Model identifier, recorded in export manifests.
    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP embedding client against an Ollama-style `/api/embed` endpoint.
///
/// Requests are split into `batch_size` batches; each batch is retried with
/// bounded backoff. A failed batch fails only the unit being embedded, not
/// unrelated units in the same run.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    retry: RetryConfig,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1) as usize,
            retry: RetryConfig::default(),
        })
    }

    async fn embed_one_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: &self.model,
            input: batch,
        };

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout
            } else {
                EmbeddingError::RequestError(e)
            }
        })?;

        if !response.status().is_success() {
            return Err(EmbeddingError::ServerError(format!(
                "embed request failed with status: {}",
                response.status()
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if parsed.embeddings.len() != batch.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                parsed.embeddings.len()
            )));
        }

        for vector in &parsed.embeddings {
            if vector.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }

        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let result = with_retry(&self.retry, || self.embed_one_batch(batch))
                .await
                .into_result()?;
            vectors.extend(result);
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
