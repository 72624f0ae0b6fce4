//! Per-document review flow
//!
//! Chunk, aggregate and embed the document, then run search, correction
//! and location for every clause concurrently. Results are zipped back
//! onto their clauses by position, so output order is input order.

use crate::corrector::{LlmCorrector, Stage, Verdict};
use crate::locate::{locate_in_ocr, locate_in_pdf};
use clauseforge_common::config::{ChunkingSettings, ReviewConfig};
use clauseforge_common::document::{AggregatedClause, ClauseReport, Page, PagePositions};
use clauseforge_common::errors::{AppError, Result};
use clauseforge_common::{metrics, EmbeddingGateway};
use clauseforge_ingestion::{chunk_and_aggregate, DocumentKind, OcrDocument, PdfDocument};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// A contract to review
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Reference category, also the collection name
    #[validate(length(min = 1, max = 255))]
    pub category_name: String,
}

/// The document being reviewed, with the geometry its resolver needs
pub enum ReviewSource {
    Pdf(PdfDocument),
    Ocr(OcrDocument),
}

impl ReviewSource {
    pub fn pages(&self) -> Vec<Page> {
        match self {
            ReviewSource::Pdf(document) => document.pages(),
            ReviewSource::Ocr(document) => document.pages(),
        }
    }

    fn locate(
        &self,
        clause: &AggregatedClause,
        incorrect_part: &str,
        max_pages: usize,
    ) -> Vec<PagePositions> {
        match self {
            ReviewSource::Pdf(document) => locate_in_pdf(document, clause, incorrect_part, max_pages),
            ReviewSource::Ocr(document) => locate_in_ocr(document, clause, incorrect_part),
        }
    }
}

/// Review output returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReport {
    pub clauses: Vec<ClauseReport>,
    pub total_clauses: usize,
    pub total_pages: usize,
}

/// How one clause ended
#[derive(Debug)]
pub enum ClauseOutcome {
    /// Flagged, corrected, and located as far as possible
    Reported(AggregatedClause),
    /// Scored below the violation threshold
    Suppressed,
    /// Failed at `stage` for reasons local to the clause
    Failed { stage: Stage, error: AppError },
}

/// Drives review of one document at a time
pub struct ReviewPipeline {
    gateway: EmbeddingGateway,
    corrector: LlmCorrector,
    chunking: ChunkingSettings,
    permits: Arc<Semaphore>,
    max_tracked_pages: usize,
}

impl ReviewPipeline {
    pub fn new(
        gateway: EmbeddingGateway,
        corrector: LlmCorrector,
        chunking: ChunkingSettings,
        config: &ReviewConfig,
    ) -> Self {
        Self {
            gateway,
            corrector,
            chunking,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            max_tracked_pages: config.max_tracked_pages,
        }
    }

    /// Review `source` against the references of the requested category.
    ///
    /// Fails when chunking yields nothing, when no clause survives
    /// embedding, when the index fails during any clause's search, or when
    /// every clause fails. Otherwise returns the flagged clauses in
    /// document order.
    #[instrument(skip(self, source), fields(category = %request.category_name))]
    pub async fn review(&self, request: &AnalysisRequest, source: &ReviewSource) -> Result<ReviewReport> {
        let started = Instant::now();
        request.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: Some("categoryName".to_string()),
        })?;
        let category = request.category_name.as_str();

        let pages = source.pages();
        let clauses = chunk_and_aggregate(&pages, DocumentKind::Agreement, &self.chunking)
            .map_err(AppError::from)?;
        info!(pages = pages.len(), clauses = clauses.len(), "Document chunked");

        self.corrector.ensure_collection(category).await?;

        let texts: Vec<String> = clauses.iter().map(AggregatedClause::plain_text).collect();
        let vectors = self.gateway.embed_all(&texts).await;

        let candidates: Vec<(&AggregatedClause, Vec<f32>)> = clauses
            .iter()
            .zip(vectors)
            .filter_map(|(clause, vector)| match vector {
                Some(vector) => Some((clause, vector)),
                None => {
                    warn!(clause = %clause.clause_number, "Dropping clause without a valid vector");
                    None
                }
            })
            .collect();

        if candidates.is_empty() {
            return Err(AppError::AnalysisFailed {
                clauses: clauses.len(),
            });
        }

        let outcomes = join_all(
            candidates
                .iter()
                .map(|(clause, vector)| self.process_clause(clause, vector, category, source)),
        )
        .await;

        let (mut reported, mut suppressed, mut failed) = (Vec::new(), 0, 0);
        for ((clause, _), outcome) in candidates.iter().zip(outcomes) {
            let outcome = outcome.inspect_err(|e| {
                warn!(clause = %clause.clause_number, error = %e, "Index failed during review");
            })?;
            match outcome {
                ClauseOutcome::Reported(located) => reported.push(located.to_report()),
                ClauseOutcome::Suppressed => suppressed += 1,
                ClauseOutcome::Failed { stage, error } => {
                    warn!(
                        clause = %clause.clause_number,
                        stage = stage.as_str(),
                        error = %error,
                        "Clause review failed"
                    );
                    failed += 1;
                }
            }
        }

        metrics::record_review(started.elapsed().as_secs_f64(), reported.len(), suppressed, failed);

        if failed == candidates.len() {
            return Err(AppError::AnalysisFailed { clauses: failed });
        }

        info!(
            reported = reported.len(),
            suppressed,
            failed,
            "Document review complete"
        );

        Ok(ReviewReport {
            clauses: reported,
            total_clauses: clauses.len(),
            total_pages: pages.len(),
        })
    }

    async fn process_clause(
        &self,
        clause: &AggregatedClause,
        vector: &[f32],
        category: &str,
        source: &ReviewSource,
    ) -> Result<ClauseOutcome> {
        let verdict = {
            let _permit = match self.permits.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    return Ok(ClauseOutcome::Failed {
                        stage: Stage::Pending,
                        error: AppError::Internal {
                            message: e.to_string(),
                        },
                    })
                }
            };

            let references = match self.corrector.search(category, vector).await {
                Ok(references) => references,
                Err(error) if error.is_index_failure() => return Err(error),
                Err(error) => {
                    return Ok(ClauseOutcome::Failed {
                        stage: Stage::Pending,
                        error,
                    })
                }
            };

            let clause_text = clause.plain_text();
            match self.corrector.correct(&clause_text, &references).await {
                Ok(verdict) => verdict,
                Err(error) => {
                    return Ok(ClauseOutcome::Failed {
                        stage: Stage::Searched,
                        error,
                    })
                }
            }
        };

        debug!(clause = %clause.clause_number, stage = Stage::Corrected.as_str(), "Verdict received");
        let correction = match verdict {
            Verdict::Suppressed { score } => {
                debug!(clause = %clause.clause_number, score, stage = Stage::Suppressed.as_str(), "No issue found");
                return Ok(ClauseOutcome::Suppressed);
            }
            Verdict::Accepted(correction) => correction,
        };

        let mut located = clause.clone();
        located.positions = source.locate(clause, &correction.incorrect_part, self.max_tracked_pages);
        located.correction = Some(correction);

        if located.is_located() {
            debug!(clause = %clause.clause_number, stage = Stage::Located.as_str(), "Clause located");
        } else {
            warn!(
                clause = %clause.clause_number,
                stage = Stage::Accepted.as_str(),
                "No coordinates recovered, returning clause without location"
            );
        }
        Ok(ClauseOutcome::Reported(located))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::{layout_page, scanned_lease};
    use async_trait::async_trait;
    use clauseforge_common::embeddings::{Embedder, MockEmbedder};
    use clauseforge_common::llm::{ChatRequest, ScriptStep, ScriptedChatModel};
    use clauseforge_common::vector::{
        InMemoryVectorIndex, PayloadFilter, PointRecord, ScoredPoint, VectorIndex,
    };
    use clauseforge_common::RetryOrchestrator;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio_test::assert_err;

    const DIM: usize = 8;

    fn verdict(score: &str, part: &str) -> String {
        json!({
            "correctedText": "교정된 조항",
            "proofText": "참고 자료 근거",
            "violation_score": score,
            "incorrectPart": part
        })
        .to_string()
    }

    /// Flags the repair clause, clears everything else
    fn judge(request: &ChatRequest, _call: usize) -> ScriptStep {
        if request.user.contains("모든 수선비를") {
            ScriptStep::Reply(verdict("0.912", "모든 수선비를"))
        } else {
            ScriptStep::Reply(verdict("0.412", ""))
        }
    }

    fn lease() -> ReviewSource {
        ReviewSource::Pdf(PdfDocument::from_pages(vec![
            layout_page(1, "제1조(목적) 이 계약은 주택 임대차에 관한 사항을 정한다.\n제2조(수선) ① 임차인은 모든 수선비를\n부담한다."),
            layout_page(2, "② 임대인은 보증금을 반환한다.\n제3조(기간) 계약기간은 2년으로 한다."),
        ]))
    }

    async fn seeded_index() -> Arc<InMemoryVectorIndex> {
        let index = Arc::new(InMemoryVectorIndex::new());
        index.create_collection("lease").await.unwrap();
        let payload = json!({
            "category": "lease",
            "proof_text": "민법 제623조",
            "incorrect_text": "임차인은 수리 비용 전부를 부담한다.",
            "corrected_text": "임대인은 수선 의무를 부담한다."
        });
        index
            .upsert(
                "lease",
                vec![PointRecord {
                    id: uuid::Uuid::new_v4(),
                    vector: vec![0.5; DIM],
                    payload: payload.as_object().unwrap().clone(),
                }],
            )
            .await
            .unwrap();
        index
    }

    fn pipeline(
        index: Arc<dyn VectorIndex>,
        chat: ScriptedChatModel,
        embedder: Arc<dyn Embedder>,
    ) -> ReviewPipeline {
        let config = ReviewConfig::default();
        let corrector = LlmCorrector::new(
            index,
            Arc::new(chat),
            RetryOrchestrator::new(2, Duration::from_secs(5), Duration::from_millis(10)),
            &config,
        );
        ReviewPipeline::new(
            EmbeddingGateway::new(embedder, 32),
            corrector,
            ChunkingSettings::default(),
            &config,
        )
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            category_name: "lease".to_string(),
        }
    }

    /// Returns NaN vectors for texts containing "보증금"
    struct PoisonedEmbedder;

    #[async_trait]
    impl Embedder for PoisonedEmbedder {
        async fn embed(&self, text: &str) -> clauseforge_common::Result<Vec<f32>> {
            Ok(self.embed_batch(&[text.to_string()]).await?.remove(0))
        }

        async fn embed_batch(&self, texts: &[String]) -> clauseforge_common::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("보증금") {
                        vec![f32::NAN; DIM]
                    } else {
                        vec![0.5; DIM]
                    }
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "poisoned"
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    #[tokio::test]
    async fn test_only_flagged_clause_is_reported() {
        let pipeline = pipeline(
            seeded_index().await,
            ScriptedChatModel::from_fn(judge),
            Arc::new(MockEmbedder::new(DIM)),
        );

        let report = pipeline.review(&request(), &lease()).await.unwrap();
        assert_eq!(report.total_clauses, 4);
        assert_eq!(report.total_pages, 2);
        assert_eq!(report.clauses.len(), 1);

        let flagged = &report.clauses[0];
        assert_eq!(flagged.clause_number, "제2조 1항");
        assert_eq!(flagged.violation_score, 0.912);
        assert_eq!(flagged.clause_data.len(), 1);

        let data = &flagged.clause_data[0];
        assert_eq!(data.page, 1);
        assert_eq!(data.position.len(), 2);
        assert_eq!(data.position_part.len(), 1);
        for rect in data.position.iter().chain(&data.position_part) {
            assert!(rect.iter().all(|v| (0.0..=100.0).contains(v)));
        }
    }

    #[tokio::test]
    async fn test_nan_vector_skips_clause_entirely() {
        let chat = ScriptedChatModel::from_fn(judge);
        let calls = chat.call_counter();
        let pipeline = pipeline(seeded_index().await, chat, Arc::new(PoisonedEmbedder));

        let report = pipeline.review(&request(), &lease()).await.unwrap();
        assert_eq!(report.clauses.len(), 1);
        assert_eq!(report.total_clauses, 4);
        // the 보증금 clause never reaches the model
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_follows_document_order() {
        // earlier clauses answer last
        let chat = ScriptedChatModel::from_fn(|request, _| {
            let delay = if request.user.contains("주택") {
                300
            } else if request.user.contains("수선비") {
                200
            } else {
                100
            };
            ScriptStep::Hang(Duration::from_millis(delay), verdict("0.950", ""))
        });
        let pipeline = pipeline(seeded_index().await, chat, Arc::new(MockEmbedder::new(DIM)));

        let report = pipeline.review(&request(), &lease()).await.unwrap();
        let numbers: Vec<&str> = report.clauses.iter().map(|c| c.clause_number.as_str()).collect();
        assert_eq!(numbers, vec!["제1조", "제2조 1항", "제2조 2항", "제3조"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_clause_failing_fails_the_document() {
        let pipeline = pipeline(
            seeded_index().await,
            ScriptedChatModel::sequence(vec![ScriptStep::Reply("```json\n{\"correctedText\": 1}\n```".into())]),
            Arc::new(MockEmbedder::new(DIM)),
        );

        let err = assert_err!(pipeline.review(&request(), &lease()).await);
        assert!(matches!(err, AppError::AnalysisFailed { clauses: 4 }));
    }

    #[tokio::test]
    async fn test_empty_reference_corpus_fails_the_document() {
        let pipeline = pipeline(
            Arc::new(InMemoryVectorIndex::new()),
            ScriptedChatModel::from_fn(judge),
            Arc::new(MockEmbedder::new(DIM)),
        );

        let err = assert_err!(pipeline.review(&request(), &lease()).await);
        assert!(matches!(err, AppError::AnalysisFailed { .. }));
    }

    #[tokio::test]
    async fn test_index_outage_propagates() {
        let index = seeded_index().await;
        index.set_offline(true);
        let pipeline = pipeline(index, ScriptedChatModel::from_fn(judge), Arc::new(MockEmbedder::new(DIM)));

        let err = assert_err!(pipeline.review(&request(), &lease()).await);
        assert!(matches!(err, AppError::IndexUnavailable { .. }));
    }

    /// Collections work, every search hits a dead connection
    struct SearchOutage(Arc<InMemoryVectorIndex>);

    #[async_trait]
    impl VectorIndex for SearchOutage {
        async fn collection_exists(&self, collection: &str) -> Result<bool> {
            self.0.collection_exists(collection).await
        }

        async fn create_collection(&self, collection: &str) -> Result<()> {
            self.0.create_collection(collection).await
        }

        async fn search(
            &self,
            _collection: &str,
            _vector: &[f32],
            _filter: Option<&PayloadFilter>,
            _limit: usize,
        ) -> Result<Vec<ScoredPoint>> {
            Err(AppError::IndexUnavailable {
                message: "connection reset".to_string(),
            })
        }

        async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
            self.0.upsert(collection, points).await
        }

        async fn exists(&self, collection: &str, filter: &PayloadFilter) -> Result<bool> {
            self.0.exists(collection, filter).await
        }

        async fn delete(&self, collection: &str, filter: &PayloadFilter) -> Result<()> {
            self.0.delete(collection, filter).await
        }
    }

    #[tokio::test]
    async fn test_search_outage_is_not_an_analysis_failure() {
        let chat = ScriptedChatModel::from_fn(judge);
        let calls = chat.call_counter();
        let index = Arc::new(SearchOutage(seeded_index().await));
        let pipeline = pipeline(index, chat, Arc::new(MockEmbedder::new(DIM)));

        let err = assert_err!(pipeline.review(&request(), &lease()).await);
        assert!(matches!(err, AppError::IndexUnavailable { .. }));
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_category_is_rejected() {
        let pipeline = pipeline(
            seeded_index().await,
            ScriptedChatModel::from_fn(judge),
            Arc::new(MockEmbedder::new(DIM)),
        );
        let request = AnalysisRequest {
            category_name: String::new(),
        };
        let err = assert_err!(pipeline.review(&request, &lease()).await);
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_scanned_document_is_located_by_offsets() {
        let source = ReviewSource::Ocr(scanned_lease());
        let pipeline = pipeline(
            seeded_index().await,
            ScriptedChatModel::from_fn(judge),
            Arc::new(MockEmbedder::new(DIM)),
        );

        let report = pipeline.review(&request(), &source).await.unwrap();
        assert_eq!(report.clauses.len(), 1);
        let data = &report.clauses[0].clause_data[0];
        assert_eq!(data.page, 1);
        assert!(!data.position.is_empty());
        assert_eq!(data.position_part.len(), 1);
    }
}
