//! Embedding service trait and implementations.
//!
//! - `GeminiEmbedding` calls the Generative Language embedding endpoints
//!   (`batchEmbedContents` for documents, `embedContent` for queries).
//! - `MockEmbedding` provides deterministic hash-based vectors for tests
//!   and for running without credentials.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ihos_core::error::IhosError;

/// Service for generating text embeddings.
///
/// Vectors from one service share a dimension, which becomes the dimension
/// of the collection they are written to.
pub trait EmbeddingService: Send + Sync {
    /// Embed a single text (used for queries).
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, IhosError>> + Send;

    /// Embed many texts in as few requests as possible, preserving order.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, IhosError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// A blanket implementation is provided so that every `EmbeddingService`
/// automatically implements `DynEmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, IhosError>>;

    fn embed_batch_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, IhosError>>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, IhosError>> {
        Box::pin(self.embed(text))
    }

    fn embed_batch_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, IhosError>> {
        Box::pin(self.embed_batch(texts))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// GeminiEmbedding - Generative Language REST API
// ---------------------------------------------------------------------------

/// Requests per `batchEmbedContents` call accepted by the API.
const MAX_BATCH: usize = 100;

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

/// Embedding client for `text-embedding-004` and compatible models.
#[derive(Debug, Clone)]
pub struct GeminiEmbedding {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl GeminiEmbedding {
    /// `dimensions` is the expected output size (768 for `text-embedding-004`).
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, IhosError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IhosError::Embedding(format!("Failed to build HTTP client: {}", e)))?;
        let model = model.into();
        info!(model = %model, dimensions, "Gemini embedding client ready");
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            dimensions,
        })
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<R, IhosError> {
        let url = format!("{}/{}:{}", self.base_url, self.model_path(), method);
        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| IhosError::Embedding(format!("{} request failed: {}", method, e)))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(IhosError::Embedding(format!(
                "{} returned {}: {}",
                method, status, text
            )));
        }
        res.json::<R>()
            .await
            .map_err(|e| IhosError::Embedding(format!("{} response decode: {}", method, e)))
    }
}

impl EmbeddingService for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IhosError> {
        let model = self.model_path();
        let body = EmbedRequest {
            model: &model,
            content: Content {
                parts: [Part { text }],
            },
        };
        let res: EmbedResponse = self.post("embedContent", &body).await?;
        match res.embedding {
            Some(e) if !e.values.is_empty() => Ok(e.values),
            _ => Err(IhosError::Embedding("Empty embedding returned".to_string())),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IhosError> {
        let model = self.model_path();
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            let body = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| EmbedRequest {
                        model: &model,
                        content: Content {
                            parts: [Part { text }],
                        },
                    })
                    .collect(),
            };
            let res: BatchEmbedResponse = self.post("batchEmbedContents", &body).await?;
            debug!(requested = batch.len(), returned = res.embeddings.len(), "embedded batch");
            out.extend(res.embeddings.into_iter().map(|e| e.values));
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic hash-based vectors for testing
// ---------------------------------------------------------------------------

/// Mock embedding service that returns deterministic vectors.
///
/// The output is derived from a hash of the input text, so identical inputs
/// always produce identical outputs.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbedding {
    /// 384-dimensional mock.
    pub fn new() -> Self {
        Self::with_dimensions(384)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }
        result
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IhosError> {
        if text.trim().is_empty() {
            return Err(IhosError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(self.hash_to_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IhosError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
