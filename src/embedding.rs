//! Embedding client for the external embeddings API.
//!
//! [`EmbeddingClient`] calls the `POST /v1/embeddings` endpoint with bearer
//! auth. Batch embedding partitions input and issues one request per group
//! sequentially, with a short fixed delay between groups, to respect
//! upstream rate limits. Order preservation is mandatory: output vector *i*
//! always corresponds to input text *i*.
//!
//! Failures carry a typed [`EmbedError`] variant so callers branch on the
//! error kind rather than on message content:
//! - [`EmbedError::Config`] — no credential; raised at construction.
//! - [`EmbedError::Auth`] — HTTP 401/403; never retried.
//! - [`EmbedError::Upstream`] — other non-success responses; retryable.
//! - [`EmbedError::Shape`] — response missing the expected vector payload.
//! - [`EmbedError::Transport`] — network failure; retryable.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — similarity between two stored vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 BLOB encoding
//!   for SQLite storage

use std::time::Duration;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;

/// Environment variable holding the embedding API credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Delay inserted between consecutive batch requests (not before the first,
/// not after the last).
const BATCH_DELAY: Duration = Duration::from_millis(100);

/// Typed embedding failure.
#[derive(Debug)]
pub enum EmbedError {
    /// Client misconfiguration (missing credential). Raised eagerly at
    /// construction, before any request is attempted.
    Config(String),
    /// Authentication/authorization rejection from upstream. Fail-fast.
    Auth { status: u16, message: String },
    /// Any other non-success upstream response.
    Upstream { status: u16, message: String },
    /// Response body did not contain the expected vector payload.
    Shape(String),
    /// Network-level failure before a response was received.
    Transport(String),
}

impl EmbedError {
    /// Whether a retry wrapper may attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbedError::Upstream { .. } | EmbedError::Transport(_) | EmbedError::Shape(_)
        )
    }
}

impl std::fmt::Display for EmbedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedError::Config(msg) => write!(f, "embedding client misconfigured: {}", msg),
            EmbedError::Auth { status, message } => {
                write!(f, "embedding API auth error {}: {}", status, message)
            }
            EmbedError::Upstream { status, message } => {
                write!(f, "embedding API error {}: {}", status, message)
            }
            EmbedError::Shape(msg) => write!(f, "invalid embedding API response: {}", msg),
            EmbedError::Transport(msg) => write!(f, "embedding API request failed: {}", msg),
        }
    }
}

impl std::error::Error for EmbedError {}

/// Dimension mismatch between two vectors that were expected to share an
/// embedding space. Always a bug or mixed-model data; never truncated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionMismatch {
    pub left: usize,
    pub right: usize,
}

impl std::fmt::Display for DimensionMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "embedding dimension mismatch: {} vs {}",
            self.left, self.right
        )
    }
}

impl std::error::Error for DimensionMismatch {}

/// Interface the pipeline and search service embed through. Concrete
/// production impl is [`EmbeddingClient`]; tests substitute fakes.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality fixed by model choice (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed many texts, returning vectors in input order.
    async fn embed_batch(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// HTTP client for the external embedding model endpoint.
#[derive(Debug)]
pub struct EmbeddingClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl EmbeddingClient {
    /// Build a client from configuration. The credential is resolved from
    /// `OPENAI_API_KEY` here, eagerly, so a missing key fails construction
    /// instead of the first request.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| EmbedError::Config(format!("{} not set", API_KEY_ENV)))?;
        if api_key.trim().is_empty() {
            return Err(EmbedError::Config(format!("{} is empty", API_KEY_ENV)));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
        })
    }

    /// One request against the embeddings endpoint. `input` is either a
    /// single string or an array of strings, matching the upstream wire
    /// shape; `expected` is how many vectors the response must carry.
    async fn request(
        &self,
        input: serde_json::Value,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let resp = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = upstream_message(resp).await;
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(EmbedError::Auth {
                    status: status.as_u16(),
                    message,
                });
            }
            return Err(EmbedError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EmbedError::Shape(e.to_string()))?;
        let vectors = parse_embedding_response(&json)?;
        if vectors.len() != expected {
            return Err(EmbedError::Shape(format!(
                "expected {} vectors, got {}",
                expected,
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self
            .request(serde_json::Value::String(text.to_string()), 1)
            .await?;
        Ok(vectors.remove(0))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let batch_size = batch_size.max(1);
        let mut out = Vec::with_capacity(texts.len());

        let groups: Vec<&[String]> = texts.chunks(batch_size).collect();
        let last = groups.len().saturating_sub(1);

        for (i, group) in groups.into_iter().enumerate() {
            let input = serde_json::Value::Array(
                group
                    .iter()
                    .map(|t| serde_json::Value::String(t.clone()))
                    .collect(),
            );
            let vectors = self.request(input, group.len()).await?;
            out.extend(vectors);

            if i < last {
                tokio::time::sleep(BATCH_DELAY).await;
            }
        }

        Ok(out)
    }
}

/// Retry wrapper for single-text embedding with exponential backoff
/// (1s, 2s between three attempts by default). Auth and configuration
/// failures are not retried.
pub async fn embed_with_retry(
    embedder: &dyn Embedder,
    text: &str,
    max_attempts: u32,
) -> Result<Vec<f32>, EmbedError> {
    let max_attempts = max_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..max_attempts {
        match embedder.embed_one(text).await {
            Ok(vec) => return Ok(vec),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < max_attempts {
                    let delay = Duration::from_secs(1 << attempt);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| EmbedError::Transport("embedding failed".to_string())))
}

/// Extract the ordered `data[].embedding` arrays from a response body.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::Shape("missing data array".to_string()))?;

    let mut vectors = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbedError::Shape("missing embedding".to_string()))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        vectors.push(vec);
    }

    Ok(vectors)
}

async fn upstream_message(resp: reqwest::Response) -> String {
    let text = resp.text().await.unwrap_or_default();
    // Upstream errors usually arrive as {"error": {"message": ...}}.
    serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or(text)
}

/// Cosine similarity between two vectors: `dot(a,b) / (‖a‖·‖b‖)`.
///
/// Returns `0.0` when either norm is zero. Vectors of different lengths
/// are an error, never silently truncated or padded.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    if a.len() != b.len() {
        return Err(DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / denom)
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
