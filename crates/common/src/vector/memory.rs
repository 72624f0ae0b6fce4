//! Brute-force in-process index with cosine scoring
//!
//! Used as a test double for the Qdrant client.

use super::{PayloadFilter, PointRecord, ScoredPoint, VectorIndex};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<String, Vec<PointRecord>>>,
    offline: AtomicBool,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`AppError::IndexUnavailable`]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of points stored in `collection`
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::IndexUnavailable {
                message: "in-memory index set offline".to_string(),
            });
        }
        Ok(())
    }

    fn missing(collection: &str) -> AppError {
        AppError::IndexRequest {
            message: format!("collection {} does not exist", collection),
        }
    }

    fn poisoned() -> AppError {
        AppError::Internal {
            message: "in-memory index lock poisoned".to_string(),
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        self.check_online()?;
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        Ok(collections.contains_key(collection))
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        self.check_online()?;
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        collections.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&PayloadFilter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.check_online()?;
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        let points = collections
            .get(collection)
            .ok_or_else(|| Self::missing(collection))?;

        let mut hits: Vec<ScoredPoint> = points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .map(|p| ScoredPoint {
                id: Value::String(p.id.to_string()),
                score: cosine(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        self.check_online()?;
        if points.is_empty() {
            return Err(AppError::NoPointsGenerated);
        }
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| Self::missing(collection))?;
        for point in points {
            stored.retain(|p| p.id != point.id);
            stored.push(point);
        }
        Ok(())
    }

    async fn exists(&self, collection: &str, filter: &PayloadFilter) -> Result<bool> {
        self.check_online()?;
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        let points = collections
            .get(collection)
            .ok_or_else(|| Self::missing(collection))?;
        Ok(points.iter().any(|p| filter.matches(&p.payload)))
    }

    async fn delete(&self, collection: &str, filter: &PayloadFilter) -> Result<()> {
        self.check_online()?;
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| Self::missing(collection))?;
        stored.retain(|p| !filter.matches(&p.payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn point(vector: Vec<f32>, category: &str, standard_id: i64) -> PointRecord {
        let payload = json!({"category": category, "standard_id": standard_id});
        PointRecord {
            id: Uuid::new_v4(),
            vector,
            payload: payload.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn test_search_ranks_by_cosine_and_filters() {
        let index = InMemoryVectorIndex::new();
        index.ensure_collection("lease").await.unwrap();
        index
            .upsert(
                "lease",
                vec![
                    point(vec![1.0, 0.0], "lease", 1),
                    point(vec![0.7, 0.7], "lease", 1),
                    point(vec![1.0, 0.01], "loan", 2),
                ],
            )
            .await
            .unwrap();

        let filter = PayloadFilter::matching("category", "lease");
        let hits = index
            .search("lease", &[1.0, 0.0], Some(&filter), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score > hits[1].score);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_exists_and_delete_by_filter() {
        let index = InMemoryVectorIndex::new();
        index.ensure_collection("lease").await.unwrap();
        index
            .upsert("lease", vec![point(vec![1.0], "lease", 7), point(vec![1.0], "lease", 8)])
            .await
            .unwrap();

        let filter = PayloadFilter::matching("standard_id", 7);
        assert!(index.exists("lease", &filter).await.unwrap());
        index.delete("lease", &filter).await.unwrap();
        assert!(!index.exists("lease", &filter).await.unwrap());
        assert_eq!(index.len("lease"), 1);
    }

    #[tokio::test]
    async fn test_offline_index_is_unavailable() {
        let index = InMemoryVectorIndex::new();
        index.set_offline(true);
        let err = index.ensure_collection("lease").await.unwrap_err();
        assert!(matches!(err, AppError::IndexUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_upsert_requires_points() {
        let index = InMemoryVectorIndex::new();
        index.ensure_collection("lease").await.unwrap();
        let err = index.upsert("lease", Vec::new()).await.unwrap_err();
        assert!(matches!(err, AppError::NoPointsGenerated));
    }
}
