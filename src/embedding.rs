//! Embedding providers.
//!
//! Implements [`EmbeddingProvider`] for the configured backend:
//! - **[`DisabledProvider`]** returns errors; used when no provider is configured.
//! - **[`VoyageProvider`]** calls the Voyage AI embeddings API with batching
//!   and linear backoff on HTTP 429.
//!
//! Use [`create_provider`] to build the provider named in `[embedding]`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use chainlens_core::embedding::{EmbeddingProvider, InputKind};

use crate::config::EmbeddingConfig;
use crate::retry::{retry, RetryPolicy};

/// Failure of a single embedding request.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding API rate limited the request (HTTP 429)")]
    RateLimited,
    #[error("embedding API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, EmbedError::RateLimited)
    }
}

/// A no-op provider that always returns errors.
pub struct DisabledProvider {
    dims: usize,
}

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, _texts: &[String], _kind: InputKind) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled. Set [embedding] provider = \"voyage\" in config.")
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
    model: &'a str,
    input_type: &'static str,
    output_dimension: usize,
    output_dtype: &'static str,
}

/// Embedding provider backed by the Voyage AI HTTP API.
///
/// Texts are sent in groups of `batch_size`. Each request that comes back
/// with HTTP 429 is retried after `backoff × (retry + 1)`; any other
/// failure aborts the whole call.
pub struct VoyageProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    api_key: String,
    batch_size: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

impl VoyageProvider {
    /// Create a provider, reading the API key from the environment
    /// variable named by `embedding.api_key_env`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("{} environment variable not set", config.api_key_env),
        };
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        if config.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            dims: config.dims,
            api_key,
            batch_size: config.batch_size,
            timeout: Duration::from_secs(config.timeout_secs),
            retry: RetryPolicy::linear(config.max_retries, Duration::from_secs(config.backoff_secs)),
        })
    }

    /// One HTTP round trip for at most `batch_size` texts.
    async fn request(&self, texts: &[String], kind: InputKind) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = EmbedRequest {
            input: texts,
            model: &self.model,
            input_type: kind.as_str(),
            output_dimension: self.dims,
            output_dtype: "float",
        };
        // Multi-text requests get twice the single-query budget.
        let timeout = if texts.len() > 1 {
            self.timeout * 2
        } else {
            self.timeout
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EmbedError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        let vectors = parse_voyage_response(&json)?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dims,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for VoyageProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], kind: InputKind) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::debug!(batch = batch_no, size = batch.len(), "embedding batch");
            let vectors = retry(&self.retry, EmbedError::is_rate_limited, || {
                self.request(batch, kind)
            })
            .await?;
            out.extend(vectors);
        }
        Ok(out)
    }
}

/// Extract `data[].embedding` arrays, ordered by each item's `index`.
fn parse_voyage_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::InvalidResponse("missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbedError::InvalidResponse("missing embedding".into()))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let vector = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| EmbedError::InvalidResponse("non-numeric component".into()))
            })
            .collect::<Result<Vec<f32>, _>>()?;
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Create the provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider { dims: config.dims })),
        "voyage" => Ok(Arc::new(VoyageProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
