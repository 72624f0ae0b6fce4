//! Reference (standard) document ingestion
//!
//! Each clause of a reference document becomes one point in its category's
//! collection. The LLM synthesizes a violating example and its correction
//! per clause; the clause text itself is embedded and stored as the proof.

use crate::chunker::DocumentKind;
use crate::errors::Result;
use crate::chunk_and_aggregate;
use chrono::Utc;
use clauseforge_common::config::ChunkingSettings;
use clauseforge_common::document::{AggregatedClause, Page};
use clauseforge_common::errors::AppError;
use clauseforge_common::llm::prompts::{build_standard_example_prompt, STANDARD_EXAMPLE_KEYS};
use clauseforge_common::llm::{ChatModel, ChatRequest, RetryOrchestrator};
use clauseforge_common::metrics;
use clauseforge_common::vector::{PayloadFilter, PointRecord, VectorIndex};
use clauseforge_common::EmbeddingGateway;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Identifies a reference document and the category it feeds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StandardRequest {
    #[validate(range(min = 1))]
    pub id: i64,

    #[validate(length(min = 1, max = 255))]
    pub category_name: String,
}

impl StandardRequest {
    fn check(&self) -> std::result::Result<(), AppError> {
        self.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: None,
        })
    }

    fn filter(&self) -> PayloadFilter {
        PayloadFilter::matching("standard_id", self.id)
    }
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NothingToDelete,
}

/// Counts reported after a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub standard_id: i64,
    pub category: String,
    pub clauses: usize,
    pub points: usize,
}

/// Synthesized training pair for one reference clause
#[derive(Debug, Clone, Default)]
struct StandardExample {
    incorrect_text: String,
    corrected_text: String,
    term_explanation: String,
}

impl StandardExample {
    fn from_reply(reply: &Map<String, Value>) -> Self {
        let field = |key: &str| match reply.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Self {
            incorrect_text: field("incorrect_text"),
            corrected_text: field("corrected_text"),
            term_explanation: field("term_explanation"),
        }
    }
}

/// Writes reference documents into the vector index
pub struct StandardIngestor {
    index: Arc<dyn VectorIndex>,
    chat: Arc<dyn ChatModel>,
    gateway: EmbeddingGateway,
    retry: RetryOrchestrator,
    chunking: ChunkingSettings,
    permits: Arc<Semaphore>,
    temperature: f32,
    max_tokens: usize,
}

impl StandardIngestor {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        chat: Arc<dyn ChatModel>,
        gateway: EmbeddingGateway,
        retry: RetryOrchestrator,
        chunking: ChunkingSettings,
        max_concurrency: usize,
    ) -> Self {
        Self {
            index,
            chat,
            gateway,
            retry,
            chunking,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            temperature: 0.3,
            max_tokens: 1024,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Chunk, synthesize, embed and store one reference document.
    ///
    /// Existing points for the same standard id are replaced. A clause whose
    /// example cannot be synthesized fails the whole document; clauses with
    /// invalid vectors are dropped.
    #[instrument(skip(self, pages), fields(standard_id = request.id, category = %request.category_name))]
    pub async fn ingest(&self, request: &StandardRequest, pages: &[Page]) -> Result<IngestSummary> {
        request.check()?;
        let collection = request.category_name.as_str();

        let clauses = chunk_and_aggregate(pages, DocumentKind::Standard, &self.chunking)?;
        info!(clauses = clauses.len(), "Reference document chunked");

        self.index.ensure_collection(collection).await?;

        let examples =
            try_join_all(clauses.iter().map(|clause| self.synthesize_example(clause))).await?;

        let texts: Vec<String> = clauses.iter().map(AggregatedClause::plain_text).collect();
        let vectors = self.gateway.embed_all(&texts).await;

        let created_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let points: Vec<PointRecord> = clauses
            .iter()
            .zip(texts)
            .zip(examples)
            .zip(vectors)
            .filter_map(|(((clause, proof_text), example), vector)| {
                let Some(vector) = vector else {
                    warn!(clause = %clause.clause_number, "Dropping clause without a valid vector");
                    return None;
                };
                Some(PointRecord {
                    id: Uuid::new_v4(),
                    vector,
                    payload: build_payload(request, &proof_text, example, &created_at),
                })
            })
            .collect();

        if points.is_empty() {
            return Err(AppError::NoPointsGenerated.into());
        }

        let filter = request.filter();
        if self.index.exists(collection, &filter).await? {
            info!("Replacing existing points for this standard");
            self.index.delete(collection, &filter).await?;
        }

        let point_count = points.len();
        self.index.upsert(collection, points).await?;
        metrics::record_standard_points(collection, point_count);

        info!(points = point_count, "Reference document stored");

        Ok(IngestSummary {
            standard_id: request.id,
            category: request.category_name.clone(),
            clauses: clauses.len(),
            points: point_count,
        })
    }

    async fn synthesize_example(&self, clause: &AggregatedClause) -> Result<StandardExample> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AppError::Internal {
                message: e.to_string(),
            })?;

        let request = ChatRequest::user(build_standard_example_prompt(&clause.plain_text()))
            .with_sampling(self.temperature, self.max_tokens);
        let reply = self
            .retry
            .run(STANDARD_EXAMPLE_KEYS, || self.chat.complete(&request))
            .await?;

        debug!(clause = %clause.clause_number, "Synthesized reference example");
        Ok(StandardExample::from_reply(&reply))
    }
}

fn build_payload(
    request: &StandardRequest,
    proof_text: &str,
    example: StandardExample,
    created_at: &str,
) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("standard_id".into(), request.id.into());
    payload.insert("category".into(), request.category_name.clone().into());
    payload.insert("proof_text".into(), proof_text.into());
    payload.insert("incorrect_text".into(), example.incorrect_text.into());
    payload.insert("corrected_text".into(), example.corrected_text.into());
    payload.insert("term_explanation".into(), example.term_explanation.into());
    payload.insert("created_at".into(), created_at.into());
    payload
}

/// Remove every point of a reference document from its category collection
#[instrument(skip_all, fields(category = %request.category_name, standard_id = request.id))]
pub async fn delete_standard(
    index: &dyn VectorIndex,
    request: &StandardRequest,
) -> std::result::Result<DeleteOutcome, AppError> {
    request.check()?;
    let collection = request.category_name.as_str();
    let filter = request.filter();

    if !index.exists(collection, &filter).await? {
        info!("No points found for standard");
        return Ok(DeleteOutcome::NothingToDelete);
    }

    index.delete(collection, &filter).await?;
    info!("Standard points deleted");
    Ok(DeleteOutcome::Deleted)
}
