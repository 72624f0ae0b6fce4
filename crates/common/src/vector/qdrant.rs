//! Qdrant REST client
//!
//! Connectivity failures and 5xx responses are retried with exponential
//! back-off inside the configured window, then surface as
//! [`AppError::IndexUnavailable`]. Other non-success responses fail at once
//! with [`AppError::IndexRequest`].

use super::{PayloadFilter, PointRecord, ScoredPoint, VectorIndex};
use crate::config::VectorIndexConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<Value>,
}

/// HTTP client for a Qdrant instance
pub struct QdrantClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    vector_size: usize,
    hnsw_ef: u32,
    retry_window: Duration,
}

impl QdrantClient {
    pub fn new(config: &VectorIndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            vector_size: config.vector_size,
            hnsw_ef: config.hnsw_ef,
            retry_window: Duration::from_secs(config.retry_window_secs),
        })
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_elapsed_time(Some(self.retry_window))
            .build()
    }

    /// Send one request, retrying transient failures, and decode the body
    async fn send<T: DeserializeOwned + Send>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let url = &url;
        let body = &body;
        let started = Instant::now();

        let outcome = retry(self.backoff(), move || {
            let method = method.clone();
            async move {
                let mut request = self.client.request(method, url);
                if let Some(key) = &self.api_key {
                    request = request.header("api-key", key);
                }
                if let Some(body) = body {
                    request = request.json(body);
                }

                let response = request.send().await.map_err(|e| {
                    warn!(operation, error = %e, "Vector index unreachable, retrying");
                    backoff::Error::transient(AppError::IndexUnavailable {
                        message: e.to_string(),
                    })
                })?;

                let status = response.status();
                if status.is_server_error() {
                    let text = response.text().await.unwrap_or_default();
                    warn!(operation, status = status.as_u16(), "Vector index server error, retrying");
                    return Err(backoff::Error::transient(AppError::IndexUnavailable {
                        message: format!("{}: {}", status, text),
                    }));
                }
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(backoff::Error::permanent(AppError::IndexRequest {
                        message: format!("{} {}: {}", operation, status, text),
                    }));
                }

                response.json::<Envelope<T>>().await.map_err(|e| {
                    backoff::Error::permanent(AppError::IndexRequest {
                        message: format!("{} returned an unreadable body: {}", operation, e),
                    })
                })
            }
        })
        .await;

        metrics::record_index_request(started.elapsed().as_secs_f64(), operation, outcome.is_ok());
        outcome.map(|envelope| envelope.result)
    }
}

#[async_trait]
impl VectorIndex for QdrantClient {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let result: ExistsResult = self
            .send(
                "collection_exists",
                Method::GET,
                &format!("/collections/{}/exists", collection),
                None,
            )
            .await?;
        Ok(result.exists)
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        let body = json!({
            "vectors": { "size": self.vector_size, "distance": "Cosine" }
        });
        let _: Value = self
            .send(
                "create_collection",
                Method::PUT,
                &format!("/collections/{}", collection),
                Some(body),
            )
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&PayloadFilter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let mut body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
            "params": { "hnsw_ef": self.hnsw_ef, "exact": false }
        });
        if let Some(filter) = filter {
            body["filter"] = serde_json::to_value(filter)?;
        }

        let result: QueryResult = self
            .send(
                "search",
                Method::POST,
                &format!("/collections/{}/points/query", collection),
                Some(body),
            )
            .await?;
        debug!(collection, hits = result.points.len(), "Vector search completed");
        Ok(result.points)
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        if points.is_empty() {
            return Err(AppError::NoPointsGenerated);
        }
        let body = json!({ "points": points });
        let _: Value = self
            .send(
                "upsert",
                Method::PUT,
                &format!("/collections/{}/points?wait=true", collection),
                Some(body),
            )
            .await?;
        Ok(())
    }

    async fn exists(&self, collection: &str, filter: &PayloadFilter) -> Result<bool> {
        let body = json!({
            "filter": filter,
            "limit": 1,
            "with_payload": false,
            "with_vector": false
        });
        let result: ScrollResult = self
            .send(
                "scroll",
                Method::POST,
                &format!("/collections/{}/points/scroll", collection),
                Some(body),
            )
            .await?;
        Ok(!result.points.is_empty())
    }

    async fn delete(&self, collection: &str, filter: &PayloadFilter) -> Result<()> {
        let body = json!({ "filter": filter });
        let _: Value = self
            .send(
                "delete",
                Method::POST,
                &format!("/collections/{}/points/delete?wait=true", collection),
                Some(body),
            )
            .await
            .map_err(|e| match e {
                AppError::IndexRequest { message } => AppError::DeleteFailed { message },
                other => other,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_from_config() {
        let config = VectorIndexConfig {
            url: "http://qdrant:6333/".into(),
            ..Default::default()
        };
        let client = QdrantClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://qdrant:6333");
        assert_eq!(client.vector_size, 1536);
        assert_eq!(client.backoff().max_elapsed_time, Some(Duration::from_secs(15)));
    }

    #[tokio::test]
    async fn test_unreachable_index_is_unavailable() {
        let config = VectorIndexConfig {
            // Reserved port on loopback; connection is refused immediately
            url: "http://127.0.0.1:1".into(),
            retry_window_secs: 1,
            timeout_secs: 1,
            ..Default::default()
        };
        let client = QdrantClient::new(&config).unwrap();
        let err = client.collection_exists("lease").await.unwrap_err();
        assert!(matches!(err, AppError::IndexUnavailable { .. }));
        assert!(err.is_transient());
    }
}
