//! Embedding generation and vector utilities.
//!
//! Defines the [`Embedder`] trait and concrete backends:
//! - **[`DisabledEmbedder`]**: always errors; used when no provider is configured.
//! - **[`OpenAIEmbedder`]**: `POST /v1/embeddings`.
//! - **[`OllamaEmbedder`]**: `POST /api/embed` on a local Ollama instance.
//! - **`LocalEmbedder`**: fastembed ONNX models, behind the
//!   `local-embeddings-fastembed` feature.
//!
//! [`EmbeddingGenerator`] wraps any backend with input cleaning and response
//! validation (1:1 count, fixed dimensionality). A failed or malformed
//! response is always an [`Error::Embedding`]: a record without a vector
//! cannot be indexed, so nothing is substituted. There are no retries at
//! this layer.
//!
//! Also provides the vector helpers used by the stores:
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian `f32` BLOB encoding
//! - [`cosine_similarity`], [`euclidean_distance`], [`DistanceMetric`]

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// A vector embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Collapse whitespace runs, trim, and cap to `max_chars` characters.
pub fn clean_text(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => collapsed[..byte_idx].trim_end().to_string(),
        None => collapsed,
    }
}

/// Cleans input and validates the backend's output.
///
/// Constructed once at startup and shared (`Clone` is an `Arc` bump).
#[derive(Clone)]
pub struct EmbeddingGenerator {
    embedder: Arc<dyn Embedder>,
    max_input_chars: usize,
}

impl EmbeddingGenerator {
    pub fn new(embedder: Arc<dyn Embedder>, max_input_chars: usize) -> Self {
        Self {
            embedder,
            max_input_chars,
        }
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn dims(&self) -> usize {
        self.embedder.dims()
    }

    pub fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::embedding("empty embedding response"))
    }

    /// Embed several texts, preserving order and 1:1 correspondence.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let cleaned: Vec<String> = texts
            .iter()
            .map(|t| clean_text(t, self.max_input_chars))
            .collect();
        if cleaned.iter().any(|t| t.is_empty()) {
            return Err(Error::validation("cannot embed empty text"));
        }

        let vectors = self.embedder.embed_batch(&cleaned).await?;

        if vectors.len() != cleaned.len() {
            return Err(Error::embedding(format!(
                "model returned {} vectors for {} inputs",
                vectors.len(),
                cleaned.len()
            )));
        }
        let dims = self.embedder.dims();
        for v in &vectors {
            if v.is_empty() {
                return Err(Error::embedding("model returned an empty vector"));
            }
            if dims > 0 && v.len() != dims {
                return Err(Error::embedding(format!(
                    "expected {} dimensions, model returned {}",
                    dims,
                    v.len()
                )));
            }
            if v.iter().any(|x| !x.is_finite()) {
                return Err(Error::embedding("model returned non-finite values"));
            }
        }
        Ok(vectors)
    }
}

// ============ Disabled ============

/// Used when `embedding.provider = "disabled"`. Every call fails.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::embedding(
            "embedding provider is disabled; set [embedding] provider in config",
        ))
    }
}

// ============ OpenAI ============

/// Embedding backend using the OpenAI API.
///
/// Requires `OPENAI_API_KEY`. `embedding.url` may point at any
/// OpenAI-compatible gateway.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::validation("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::validation("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::validation("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        Ok(Self {
            model,
            dims,
            url,
            api_key,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[derive(Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingItem>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct OpenAIEmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    total_tokens: u64,
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::embedding(format!(
                "OpenAI API error {}: {}",
                status, body_text
            )));
        }

        let text = response.text().await?;
        parse_openai_response(&text)
    }
}

/// Parse an OpenAI embeddings response, ordering vectors by `index`.
fn parse_openai_response(body: &str) -> Result<Vec<Vec<f32>>> {
    let parsed: OpenAIEmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| Error::embedding(format!("invalid OpenAI response: {}", e)))?;

    if let Some(usage) = &parsed.usage {
        tracing::debug!(target: "embedding", "openai usage: {} tokens", usage.total_tokens);
    }

    let mut items = parsed.data;
    items.sort_by_key(|item| item.index);
    Ok(items.into_iter().map(|item| item.embedding).collect())
}

// ============ Ollama ============

/// Embedding backend using a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::validation("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::validation("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::embedding(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::embedding(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        let text = response.text().await?;
        let parsed: OllamaEmbedResponse = serde_json::from_str(&text)
            .map_err(|e| Error::embedding(format!("invalid Ollama response: {}", e)))?;
        Ok(parsed.embeddings)
    }
}

// ============ Local (fastembed) ============

/// Local ONNX inference via fastembed. The model is downloaded on first use
/// and loaded once; inference runs on the blocking pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let (fastembed_model, default_dims) = fastembed_model(&model_name)?;
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| Error::embedding(format!("failed to initialize local model: {}", e)))?;

        Ok(Self {
            model_name,
            dims: config.dims.unwrap_or(default_dims),
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel as M;
    match name {
        "all-minilm-l6-v2" => Ok((M::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((M::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((M::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((M::BGELargeENV15, 1024)),
        "nomic-embed-text-v1.5" => Ok((M::NomicEmbedTextV15, 768)),
        "multilingual-e5-small" => Ok((M::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((M::MultilingualE5Base, 768)),
        other => Err(Error::validation(format!(
            "unknown local embedding model '{}'. Supported: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-base",
            other
        ))),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| Error::embedding("local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| Error::embedding(format!("local embedding failed: {}", e)))
        })
        .await?
    }
}

/// Create the configured [`Embedder`].
///
/// | Config Value | Backend |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(Error::validation(
            "local embedding provider requires --features local-embeddings-fastembed",
        )),
        other => Err(Error::validation(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::embedding(format!("failed to build HTTP client: {}", e)))
}

// ============ Vector utilities ============

/// Vector distance function. Smaller is always more similar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// L2 distance.
    #[default]
    Euclidean,
    /// `1 - cosine_similarity`, in `[0, 2]`.
    Cosine,
}

impl DistanceMetric {
    /// Distance between two vectors, or `None` when their lengths differ.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Option<f64> {
        if a.len() != b.len() || a.is_empty() {
            return None;
        }
        match self {
            DistanceMetric::Euclidean => Some(euclidean_distance(a, b)),
            DistanceMetric::Cosine => Some(1.0 - cosine_similarity(a, b) as f64),
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use context_vault::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Euclidean (L2) distance, accumulated in `f64`.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, mismatched, or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
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
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
