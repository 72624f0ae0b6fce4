//! Vector index contract
//!
//! One collection per document category. Points carry a JSON payload that
//! can be matched with [`PayloadFilter`]; the same filter drives search,
//! existence checks, and deletion.

mod memory;
mod qdrant;

pub use memory::InMemoryVectorIndex;
pub use qdrant::QdrantClient;

use crate::config::VectorIndexConfig;
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// A point to write
#[derive(Debug, Clone, Serialize)]
pub struct PointRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

/// A search hit
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredPoint {
    pub id: Value,
    pub score: f32,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

/// Exact-match conditions that must all hold
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PayloadFilter {
    must: Vec<FieldCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct FieldCondition {
    key: String,
    #[serde(rename = "match")]
    matches: MatchValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct MatchValue {
    value: Value,
}

impl PayloadFilter {
    pub fn matching(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and(key, value)
    }

    pub fn and(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must.push(FieldCondition {
            key: key.into(),
            matches: MatchValue {
                value: value.into(),
            },
        });
        self
    }

    /// Evaluate the filter against a payload
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        self.must
            .iter()
            .all(|c| payload.get(&c.key) == Some(&c.matches.value))
    }
}

/// Trait for vector stores
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Create a cosine collection sized for the configured embedding model
    async fn create_collection(&self, collection: &str) -> Result<()>;

    /// Nearest neighbours of `vector`, best first
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&PayloadFilter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()>;

    /// True when at least one point matches
    async fn exists(&self, collection: &str, filter: &PayloadFilter) -> Result<bool>;

    async fn delete(&self, collection: &str, filter: &PayloadFilter) -> Result<()>;

    /// Create the collection unless it already exists
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        if !self.collection_exists(collection).await? {
            tracing::info!(collection = collection, "Creating collection");
            self.create_collection(collection).await?;
        }
        Ok(())
    }
}

/// Create the Qdrant-backed index from configuration
pub fn create_vector_index(config: &VectorIndexConfig) -> Result<Arc<dyn VectorIndex>> {
    Ok(Arc::new(QdrantClient::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_wire_format() {
        let filter = PayloadFilter::matching("category", "lease");
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"must": [{"key": "category", "match": {"value": "lease"}}]})
        );
    }

    #[test]
    fn test_filter_matches_all_conditions() {
        let filter = PayloadFilter::matching("category", "lease").and("standard_id", 7);
        let hit = json!({"category": "lease", "standard_id": 7, "extra": true});
        let miss = json!({"category": "lease", "standard_id": 8});
        assert!(filter.matches(hit.as_object().unwrap()));
        assert!(!filter.matches(miss.as_object().unwrap()));
        assert!(PayloadFilter::default().matches(miss.as_object().unwrap()));
    }
}
