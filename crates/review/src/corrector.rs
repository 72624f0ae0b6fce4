//! Retrieval-augmented clause correction
//!
//! A clause moves through [`Stage`]s: its vector is searched against the
//! category's reference points, the LLM judges it against those
//! references, and the violation score decides whether it is reported.

use clauseforge_common::config::ReviewConfig;
use clauseforge_common::document::Correction;
use clauseforge_common::errors::{AppError, Result};
use clauseforge_common::llm::prompts::{
    build_correction_prompt, correction_system_prompt, ReferenceExample, CORRECTION_REPLY_KEYS,
};
use clauseforge_common::llm::{ChatModel, ChatRequest, RetryOrchestrator};
use clauseforge_common::vector::{PayloadFilter, VectorIndex};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Where a clause is in the review flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Searched,
    Corrected,
    Accepted,
    Suppressed,
    Located,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::Searched => "searched",
            Stage::Corrected => "corrected",
            Stage::Accepted => "accepted",
            Stage::Suppressed => "suppressed",
            Stage::Located => "located",
        }
    }
}

/// Decision on one clause after correction
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(Correction),
    Suppressed { score: f64 },
}

/// Searches references and asks the LLM for a verdict
pub struct LlmCorrector {
    index: Arc<dyn VectorIndex>,
    chat: Arc<dyn ChatModel>,
    retry: RetryOrchestrator,
    threshold: f64,
    top_k: usize,
    temperature: f32,
    max_tokens: usize,
}

impl LlmCorrector {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        chat: Arc<dyn ChatModel>,
        retry: RetryOrchestrator,
        config: &ReviewConfig,
    ) -> Self {
        Self {
            index,
            chat,
            retry,
            threshold: config.violation_threshold,
            top_k: config.top_k.max(1),
            temperature: 0.2,
            max_tokens: 1024,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Create the category collection on first use
    pub async fn ensure_collection(&self, category: &str) -> Result<()> {
        self.index.ensure_collection(category).await
    }

    /// Nearest reference examples in `category`, best first
    #[instrument(skip(self, vector))]
    pub async fn search(&self, category: &str, vector: &[f32]) -> Result<Vec<ReferenceExample>> {
        let filter = PayloadFilter::matching("category", category);
        let hits = self
            .index
            .search(category, vector, Some(&filter), self.top_k)
            .await?;

        if hits.is_empty() {
            return Err(AppError::NoSearchResult {
                collection: category.to_string(),
            });
        }

        debug!(hits = hits.len(), top_score = hits[0].score, "Reference search complete");
        Ok(hits
            .iter()
            .map(|hit| ReferenceExample::from_payload(&hit.payload, hit.score))
            .collect())
    }

    /// Judge `clause_text` against `references`
    pub async fn correct(&self, clause_text: &str, references: &[ReferenceExample]) -> Result<Verdict> {
        let request = ChatRequest::user(build_correction_prompt(clause_text, references))
            .with_system(correction_system_prompt())
            .with_sampling(self.temperature, self.max_tokens);

        let reply = self
            .retry
            .run(CORRECTION_REPLY_KEYS, || self.chat.complete(&request))
            .await?;

        let raw_score = reply.get("violation_score").cloned().unwrap_or_default();
        let score = parse_violation_score(&raw_score).ok_or_else(|| AppError::LlmMalformedReply {
            reason: format!("violation_score is not a score in [0, 1]: {}", raw_score),
        })?;

        if score < self.threshold {
            debug!(score, threshold = self.threshold, "Clause below violation threshold");
            return Ok(Verdict::Suppressed { score });
        }

        Ok(Verdict::Accepted(Correction {
            corrected_text: text_field(&reply, "correctedText"),
            proof_text: text_field(&reply, "proofText"),
            violation_score: score,
            incorrect_part: text_field(&reply, "incorrectPart"),
        }))
    }
}

/// Accept a score given as a number or numeric string, within [0, 1]
pub fn parse_violation_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (score.is_finite() && (0.0..=1.0).contains(&score)).then_some(score)
}

fn text_field(reply: &Map<String, Value>, key: &str) -> String {
    match reply.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clauseforge_common::llm::{ScriptStep, ScriptedChatModel};
    use clauseforge_common::vector::{InMemoryVectorIndex, PointRecord};
    use serde_json::json;
    use std::time::Duration;
    use tokio_test::assert_err;

    fn reply(score: &str) -> String {
        json!({
            "correctedText": "임대인은 주요 설비의 수선비를 부담한다.",
            "proofText": "민법 제623조에 따라 임대인은 수선 의무를 진다.",
            "violation_score": score,
            "incorrectPart": "모든 수선비를"
        })
        .to_string()
    }

    async fn seeded_index() -> Arc<InMemoryVectorIndex> {
        let index = Arc::new(InMemoryVectorIndex::new());
        index.create_collection("lease").await.unwrap();
        let payload = json!({
            "category": "lease",
            "proof_text": "민법 제623조",
            "incorrect_text": "임차인은 모든 수선비를 부담한다.",
            "corrected_text": "임대인은 수선 의무를 부담한다."
        });
        index
            .upsert(
                "lease",
                vec![PointRecord {
                    id: uuid::Uuid::new_v4(),
                    vector: vec![1.0, 0.0, 0.0],
                    payload: payload.as_object().unwrap().clone(),
                }],
            )
            .await
            .unwrap();
        index
    }

    fn corrector(index: Arc<InMemoryVectorIndex>, steps: Vec<ScriptStep>) -> LlmCorrector {
        LlmCorrector::new(
            index,
            Arc::new(ScriptedChatModel::sequence(steps)),
            RetryOrchestrator::new(3, Duration::from_secs(5), Duration::from_millis(10)),
            &ReviewConfig::default(),
        )
    }

    #[test]
    fn test_parse_violation_score() {
        assert_eq!(parse_violation_score(&json!("0.412")), Some(0.412));
        assert_eq!(parse_violation_score(&json!(0.9)), Some(0.9));
        assert_eq!(parse_violation_score(&json!(" 1.000 ")), Some(1.0));
        assert_eq!(parse_violation_score(&json!("1.7")), None);
        assert_eq!(parse_violation_score(&json!("-0.1")), None);
        assert_eq!(parse_violation_score(&json!("NaN")), None);
        assert_eq!(parse_violation_score(&json!("high")), None);
        assert_eq!(parse_violation_score(&Value::Null), None);
    }

    #[tokio::test]
    async fn test_low_score_is_suppressed() {
        let corrector = corrector(seeded_index().await, vec![ScriptStep::Reply(reply("0.412"))]);
        assert_eq!(corrector.threshold(), 0.75);

        let verdict = corrector.correct("임차인은 모든 수선비를 부담한다.", &[]).await.unwrap();
        assert_eq!(verdict, Verdict::Suppressed { score: 0.412 });
    }

    #[tokio::test]
    async fn test_high_score_is_accepted() {
        let corrector = corrector(seeded_index().await, vec![ScriptStep::Reply(reply("0.912"))]);
        let Verdict::Accepted(correction) =
            corrector.correct("임차인은 모든 수선비를 부담한다.", &[]).await.unwrap()
        else {
            panic!("expected an accepted verdict");
        };
        assert_eq!(correction.violation_score, 0.912);
        assert_eq!(correction.incorrect_part, "모든 수선비를");
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_score_is_malformed() {
        let corrector = corrector(seeded_index().await, vec![ScriptStep::Reply(reply("7"))]);
        let err = assert_err!(corrector.correct("조항", &[]).await);
        assert!(matches!(err, AppError::LlmMalformedReply { .. }));
    }

    #[tokio::test]
    async fn test_search_returns_references() {
        let corrector = corrector(seeded_index().await, vec![]);
        let references = corrector.search("lease", &[0.9, 0.1, 0.0]).await.unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].proof_text, "민법 제623조");
    }

    #[tokio::test]
    async fn test_search_other_category_finds_nothing() {
        let index = seeded_index().await;
        index.create_collection("labor").await.unwrap();
        let corrector = corrector(index, vec![]);

        let err = assert_err!(corrector.search("labor", &[1.0, 0.0, 0.0]).await);
        assert!(matches!(err, AppError::NoSearchResult { .. }));
    }
}
