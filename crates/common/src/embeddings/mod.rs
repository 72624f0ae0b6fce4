//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - OpenAI-compatible `/embeddings` endpoints (OpenAI, Azure, local gateways)
//! - A mock provider for tests and offline runs
//!
//! [`EmbeddingGateway`] sits on top of an [`Embedder`] and turns whole-request
//! failures into per-item absences so one bad batch never sinks a document.

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch), order preserved
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(
        api_key: String,
        model: String,
        dimension: usize,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            model,
            dimension,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        })
    }

    /// Make request with retry
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let max_retries = 3;
        let mut last_error = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * (2_u64.pow(attempt as u32)));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = max_retries,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::EmbeddingFailed {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));

        let request = OpenAIRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::EmbeddingFailed {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingFailed {
                message: format!("API error {}: {}", status, body),
            });
        }

        let mut result: OpenAIResponse =
            response.json().await.map_err(|e| AppError::EmbeddingFailed {
                message: format!("Failed to parse response: {}", e),
            })?;

        if result.data.len() != texts.len() {
            return Err(AppError::EmbeddingFailed {
                message: format!(
                    "Expected {} embeddings, received {}",
                    texts.len(),
                    result.data.len()
                ),
            });
        }

        result.data.sort_by_key(|e| e.index);
        Ok(result.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::EmbeddingFailed {
                message: "Empty response".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_with_retry(texts).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mock embedder for testing
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        Ok((0..self.dimension).map(|_| rng.gen::<f32>()).collect())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" | "azure" => {
            let key = config
                .api_key
                .clone()
                .ok_or_else(|| AppError::Configuration {
                    message: "embedding.api_key is required for the openai provider".to_string(),
                })?;
            Ok(Arc::new(OpenAIEmbedder::new(
                key,
                config.model.clone(),
                config.dimension,
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        other => {
            tracing::warn!(provider = other, "Unknown embedding provider, using mock");
            Ok(Arc::new(MockEmbedder::new(config.dimension)))
        }
    }
}

/// Check a vector before it is allowed anywhere near the index
pub fn validate_vector(vector: &[f32], dimension: usize) -> std::result::Result<(), String> {
    if vector.is_empty() {
        return Err("empty vector".to_string());
    }
    if vector.len() != dimension {
        return Err(format!(
            "dimension mismatch: expected {}, got {}",
            dimension,
            vector.len()
        ));
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(format!("non-finite component at index {}", pos));
    }
    Ok(())
}

/// Batched, validating front end over an [`Embedder`]
#[derive(Clone)]
pub struct EmbeddingGateway {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl EmbeddingGateway {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Embed every text, returning one slot per input in input order.
    ///
    /// A slot is `None` when its batch failed or its vector did not pass
    /// [`validate_vector`]. Failures are logged and never returned.
    pub async fn embed_all(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let dimension = self.embedder.dimension();
        let model = self.embedder.model_name().to_string();
        let mut slots: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            let start = Instant::now();
            match self.embedder.embed_batch(batch).await {
                Ok(vectors) if vectors.len() == batch.len() => {
                    metrics::record_embedding(
                        start.elapsed().as_secs_f64(),
                        &model,
                        batch.len(),
                        true,
                    );
                    for (offset, vector) in vectors.into_iter().enumerate() {
                        match validate_vector(&vector, dimension) {
                            Ok(()) => slots.push(Some(vector)),
                            Err(reason) => {
                                tracing::warn!(
                                    index = batch_index * self.batch_size + offset,
                                    reason = %reason,
                                    "Discarding invalid embedding"
                                );
                                slots.push(None);
                            }
                        }
                    }
                }
                Ok(vectors) => {
                    metrics::record_embedding(
                        start.elapsed().as_secs_f64(),
                        &model,
                        batch.len(),
                        false,
                    );
                    tracing::warn!(
                        batch = batch_index,
                        expected = batch.len(),
                        received = vectors.len(),
                        "Embedding batch returned wrong number of vectors"
                    );
                    slots.extend(std::iter::repeat_with(|| None).take(batch.len()));
                }
                Err(e) => {
                    metrics::record_embedding(
                        start.elapsed().as_secs_f64(),
                        &model,
                        batch.len(),
                        false,
                    );
                    tracing::warn!(
                        batch = batch_index,
                        size = batch.len(),
                        error = %e,
                        "Embedding batch failed"
                    );
                    slots.extend(std::iter::repeat_with(|| None).take(batch.len()));
                }
            }
        }

        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a NaN vector for any text containing "broken" and fails the
    /// batch outright when it contains "offline".
    struct FlakyEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("broken") {
                Ok(vec![f32::NAN, 0.5, 0.5])
            } else {
                Ok(vec![0.1, 0.2, 0.3])
            }
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texts.iter().any(|t| t.contains("offline")) {
                return Err(AppError::EmbeddingFailed {
                    message: "service offline".into(),
                });
            }
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn model_name(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new(768);
        let embedding = embedder.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 768);
    }

    #[tokio::test]
    async fn test_mock_batch() {
        let embedder = MockEmbedder::new(768);
        let texts = vec!["text1".to_string(), "text2".to_string()];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 768);
    }

    #[test]
    fn test_validate_vector() {
        assert!(validate_vector(&[0.1, 0.2], 2).is_ok());
        assert!(validate_vector(&[], 2).is_err());
        assert!(validate_vector(&[0.1], 2).is_err());
        assert!(validate_vector(&[0.1, f32::INFINITY], 2).is_err());
        assert!(validate_vector(&[f32::NAN, 0.1], 2).is_err());
    }

    #[tokio::test]
    async fn test_gateway_marks_nan_vector_absent() {
        let gateway = EmbeddingGateway::new(
            Arc::new(FlakyEmbedder {
                calls: AtomicUsize::new(0),
            }),
            32,
        );
        let texts = vec![
            "제1조 fine".to_string(),
            "제2조 broken".to_string(),
            "제3조 fine".to_string(),
        ];

        let slots = gateway.embed_all(&texts).await;
        assert_eq!(slots.len(), 3);
        assert!(slots[0].is_some());
        assert!(slots[1].is_none());
        assert!(slots[2].is_some());
    }

    #[tokio::test]
    async fn test_gateway_failed_batch_only_blanks_its_own_items() {
        let embedder = Arc::new(FlakyEmbedder {
            calls: AtomicUsize::new(0),
        });
        let gateway = EmbeddingGateway::new(embedder.clone(), 2);
        let texts = vec![
            "a".to_string(),
            "b".to_string(),
            "offline".to_string(),
            "c".to_string(),
            "d".to_string(),
        ];

        let slots = gateway.embed_all(&texts).await;
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            slots.iter().map(Option::is_some).collect::<Vec<_>>(),
            vec![true, true, false, false, true]
        );
    }
}
