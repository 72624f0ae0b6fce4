//! Clause chunking
//!
//! Splits page text into clause fragments using the first structural
//! strategy that matches the document, falling back to fixed-size
//! paragraphs when no strategy matches anywhere.
//!
//! Pages after the first that do not open with a header continue the
//! previous page's last clause. That leading text is split with the
//! previous clause's own numbering style.

mod paragraph;
mod patterns;
mod structured;

pub use paragraph::CHARS_PER_TOKEN;

use crate::errors::{IngestionError, Result};
use clauseforge_common::config::ChunkingSettings;
use clauseforge_common::document::{ClauseFragment, Page};
use patterns::Header;
use std::ops::Range;
use structured::{Strategy, STRATEGIES};
use tracing::{debug, info, instrument};

/// Signature and seal blocks start after a wide horizontal gap
const SIGNATURE_GAP: &str = "     ";

/// Which kind of document is being chunked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// A contract under review
    Agreement,
    /// A reference document feeding the vector index
    Standard,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Agreement => "agreement",
            DocumentKind::Standard => "standard",
        }
    }
}

/// Configuration for clause chunking
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Fragments with fewer characters are discarded
    pub min_chars: usize,
    /// Paragraph fallback chunk size, in tokens
    pub paragraph_tokens: usize,
    /// Paragraph fallback overlap, in tokens
    pub paragraph_overlap: usize,
}

impl ChunkerConfig {
    pub fn for_kind(kind: DocumentKind, settings: &ChunkingSettings) -> Self {
        let min_chars = match kind {
            DocumentKind::Agreement => settings.agreement_min_chars,
            DocumentKind::Standard => settings.standard_min_chars,
        };
        Self {
            min_chars,
            paragraph_tokens: settings.paragraph_tokens,
            paragraph_overlap: settings.paragraph_overlap,
        }
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::for_kind(DocumentKind::Agreement, &ChunkingSettings::default())
    }
}

/// Splits pages into clause fragments
#[derive(Debug, Clone, Default)]
pub struct ClauseChunker {
    config: ChunkerConfig,
}

impl ClauseChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Chunk every page into fragments, in page order
    #[instrument(skip_all, fields(pages = pages.len()))]
    pub fn chunk(&self, pages: &[Page]) -> Result<Vec<ClauseFragment>> {
        let fragments = match select_strategy(pages) {
            Some(strategy) => {
                info!(strategy = strategy.name, "Chunking with structural strategy");
                self.chunk_structured(strategy, pages)
            }
            None => {
                info!(strategy = "paragraph", "No structural pattern found, chunking by paragraph");
                self.chunk_paragraphs(pages)?
            }
        };

        if fragments.is_empty() {
            return Err(IngestionError::NoClauses);
        }

        debug!(fragments = fragments.len(), "Chunking complete");
        Ok(fragments)
    }

    fn chunk_structured(&self, strategy: &Strategy, pages: &[Page]) -> Vec<ClauseFragment> {
        let mut fragments: Vec<ClauseFragment> = Vec::new();

        for (position, page) in pages.iter().enumerate() {
            let text = page.text.as_str();
            let headers = (strategy.find_headers)(text);
            let mut order_index = 1;
            let mut cursor = 0;

            if position > 0 && !opens_with_header(text, &headers) {
                let preamble_end = headers.first().map_or(text.len(), |h| h.start);
                let continuation =
                    self.continuation(&text[..preamble_end], fragments.last(), page.number);
                for mut fragment in continuation {
                    let line = first_line_span(text, &fragment.content, cursor);
                    fragment.offset = line.start;
                    cursor = line.end;
                    fragment.order_index = order_index;
                    order_index += 1;
                    fragments.push(fragment);
                }
            }

            for (i, header) in headers.iter().enumerate() {
                let body_end = headers.get(i + 1).map_or(text.len(), |next| next.start);
                cursor = cursor.max(header.end);
                for raw in (strategy.split_body)(header, &text[header.end..body_end]) {
                    let content = strip_boilerplate(&raw.content);
                    if !self.long_enough(&content) {
                        continue;
                    }
                    let line = first_line_span(text, &content, cursor);
                    cursor = line.end;
                    fragments.push(ClauseFragment {
                        clause_number: raw.clause_number,
                        title: raw.title,
                        content,
                        page: page.number,
                        order_index,
                        enumeration: raw.enumeration,
                        offset: line.start,
                    });
                    order_index += 1;
                }
            }
        }

        trim_signature_block(&mut fragments);
        fragments
    }

    /// Fragments continuing `previous` from the top of a new page
    fn continuation(
        &self,
        preamble: &str,
        previous: Option<&ClauseFragment>,
        page: u32,
    ) -> Vec<ClauseFragment> {
        let Some(previous) = previous else {
            debug!(page, "Leading text with no open clause, skipping");
            return Vec::new();
        };

        let fragment = |clause_number: String, content: String| ClauseFragment {
            clause_number,
            title: previous.title.clone(),
            content,
            page,
            order_index: 0,
            enumeration: previous.enumeration,
            offset: 0,
        };

        let Some(style) = previous.enumeration else {
            let content = strip_boilerplate(preamble);
            return if !self.long_enough(&content) {
                Vec::new()
            } else {
                vec![fragment(previous.clause_number.clone(), content)]
            };
        };

        let (head, parts) = structured::split_by_markers(style, preamble);
        let mut out = Vec::with_capacity(parts.len() + 1);

        let head = strip_boilerplate(&head);
        if self.long_enough(&head) {
            out.push(fragment(previous.clause_number.clone(), head));
        }

        let article = structured::article_prefix(&previous.clause_number);
        for (number, content) in parts {
            let content = strip_boilerplate(&content);
            if self.long_enough(&content) {
                out.push(fragment(structured::sub_clause_identifier(article, number), content));
            }
        }
        out
    }

    fn chunk_paragraphs(&self, pages: &[Page]) -> Result<Vec<ClauseFragment>> {
        let mut fragments = Vec::new();

        for page in pages {
            let chunks = paragraph::split_paragraphs(
                &page.text,
                self.config.paragraph_tokens,
                self.config.paragraph_overlap,
            )?;
            let kept = chunks.into_iter().filter(|(_, content)| self.long_enough(content));
            for (i, (offset, content)) in kept.enumerate() {
                let clause_number = (fragments.len() + 1).to_string();
                fragments.push(ClauseFragment {
                    clause_number,
                    title: None,
                    content,
                    page: page.number,
                    order_index: i as u32 + 1,
                    enumeration: None,
                    offset,
                });
            }
        }

        Ok(fragments)
    }

    fn long_enough(&self, content: &str) -> bool {
        content.trim().chars().count() >= self.config.min_chars
    }
}

/// First strategy matching the first page, else the first matching any page
fn select_strategy(pages: &[Page]) -> Option<&'static Strategy> {
    let first = pages.first()?;
    STRATEGIES
        .iter()
        .find(|s| !(s.find_headers)(&first.text).is_empty())
        .or_else(|| {
            STRATEGIES
                .iter()
                .find(|s| pages.iter().any(|p| !(s.find_headers)(&p.text).is_empty()))
        })
}

/// True when the first non-boilerplate line of `text` holds the first header
fn opens_with_header(text: &str, headers: &[Header]) -> bool {
    let Some(first) = headers.first() else {
        return false;
    };

    let mut line_start = 0;
    for line in text.split_inclusive('\n') {
        let line_end = line_start + line.len();
        if !patterns::is_boilerplate_line(line) {
            return first.start >= line_start && first.start < line_end;
        }
        line_start = line_end;
    }
    false
}

/// Drop page furniture lines such as "- 3 -" or "페이지 2"
fn strip_boilerplate(text: &str) -> String {
    text.lines()
        .filter(|line| !patterns::is_boilerplate_line(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Byte span of `content`'s first line in `text`, searched from `from`.
/// An empty span at `from` when the line is not found.
fn first_line_span(text: &str, content: &str, from: usize) -> Range<usize> {
    let line = content.lines().next().unwrap_or_default().trim();
    text.get(from..)
        .filter(|_| !line.is_empty())
        .and_then(|rest| rest.find(line))
        .map_or(from..from, |found| from + found..from + found + line.len())
}

/// Cut the document's last fragment at the signature gap
fn trim_signature_block(fragments: &mut Vec<ClauseFragment>) {
    let Some(last) = fragments.last_mut() else {
        return;
    };
    if let Some(cut) = last.content.find(SIGNATURE_GAP) {
        last.content.truncate(cut);
        last.content = last.content.trim_end().to_string();
    }
    if last.content.trim().is_empty() {
        fragments.pop();
    }
}
