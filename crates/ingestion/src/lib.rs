//! ClauseForge Ingestion Library
//!
//! Turns source documents into addressable clauses and maintains the
//! reference corpus:
//! - PDF and OCR document handles with geometry
//! - Clause chunking and aggregation
//! - Standard (reference) document ingestion and deletion

pub mod aggregator;
pub mod chunker;
pub mod errors;
mod font;
pub mod ocr;
pub mod pdf;
pub mod standard;

pub use aggregator::ChunkAggregator;
pub use chunker::{ChunkerConfig, ClauseChunker, DocumentKind};
pub use errors::{IngestionError, Result};
pub use ocr::{OcrDocument, OcrToken};
pub use pdf::{Glyph, PdfDocument, PdfPage};
pub use standard::{delete_standard, DeleteOutcome, StandardIngestor, StandardRequest};

use clauseforge_common::config::ChunkingSettings;
use clauseforge_common::document::{AggregatedClause, Page};
use clauseforge_common::metrics;

/// Chunk `pages` as `kind` and merge the fragments into clauses
pub fn chunk_and_aggregate(
    pages: &[Page],
    kind: DocumentKind,
    settings: &ChunkingSettings,
) -> Result<Vec<AggregatedClause>> {
    let chunker = ClauseChunker::new(ChunkerConfig::for_kind(kind, settings));
    let fragments = chunker.chunk(pages)?;
    let clauses = ChunkAggregator::new(settings.max_merge_chars).aggregate(&fragments);

    metrics::record_chunking(kind.as_str(), fragments.len(), clauses.len());

    if clauses.is_empty() {
        return Err(IngestionError::NoClauses);
    }
    Ok(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_and_aggregate_merges_page_spanning_clause() {
        let pages = vec![
            Page::new(
                1,
                "제5조(수선) ① 임대인은 목적물을 유지한다.\n② 임대인이 수선 의무를 이행하지 아니한 경우",
            ),
            Page::new(2, "임차인은 계약을 해지할 수 있다.\n제6조(기타) 나머지는 민법에 따른다."),
        ];
        let clauses =
            chunk_and_aggregate(&pages, DocumentKind::Agreement, &ChunkingSettings::default())
                .unwrap();

        let spanning = clauses
            .iter()
            .find(|c| c.clause_number == "제5조 2항")
            .unwrap();
        assert_eq!(spanning.tracked_pages(2), vec![1, 2]);
        assert_eq!(spanning.segments().count(), 2);
        assert_eq!(clauses.last().unwrap().clause_number, "제6조");
    }

    #[test]
    fn test_empty_document_fails() {
        let pages = vec![Page::new(1, "   ")];
        assert!(matches!(
            chunk_and_aggregate(&pages, DocumentKind::Agreement, &ChunkingSettings::default()),
            Err(IngestionError::NoClauses)
        ));
    }
}
