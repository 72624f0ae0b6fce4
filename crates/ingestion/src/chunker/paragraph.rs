//! Fixed-size fallback for documents without structural numbering

use crate::errors::{IngestionError, Result};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Rough characters-per-token ratio for Korean legal prose
pub const CHARS_PER_TOKEN: usize = 2;

/// Split one page into overlapping chunks of roughly `tokens` tokens,
/// each paired with its byte offset in `text`
pub(crate) fn split_paragraphs(
    text: &str,
    tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<(usize, String)>> {
    let capacity = tokens.max(1) * CHARS_PER_TOKEN;
    let overlap = (overlap_tokens * CHARS_PER_TOKEN).min(capacity.saturating_sub(1));

    let config = ChunkConfig::new(capacity)
        .with_overlap(overlap)
        .map_err(|e| IngestionError::ChunkConfig(e.to_string()))?;
    let splitter = TextSplitter::new(config);

    let chunks: Vec<(usize, String)> = splitter
        .chunk_indices(text)
        .map(|(start, chunk)| {
            let lead = chunk.len() - chunk.trim_start().len();
            (start + lead, chunk.trim().to_string())
        })
        .filter(|(_, c)| !c.is_empty())
        .collect();

    debug!(
        input_len = text.len(),
        chunk_count = chunks.len(),
        capacity = capacity,
        "Text chunked"
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = split_paragraphs("임대인과 임차인은 다음과 같이 합의한다.", 300, 50).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_long_text_respects_capacity() {
        let sentence = "임차인은 목적물을 선량한 관리자의 주의로 보존하여야 한다. ";
        let text = sentence.repeat(40);
        let chunks = split_paragraphs(&text, 50, 10).unwrap();
        assert!(chunks.len() > 1);
        for (start, chunk) in &chunks {
            assert!(text[*start..].starts_with(chunk.as_str()));
            assert!(chunk.chars().count() <= 50 * CHARS_PER_TOKEN);
        }
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(split_paragraphs("   \n ", 300, 50).unwrap().is_empty());
    }
}
