//! Position resolution
//!
//! Maps flagged clause text back to page-relative boxes. PDF documents are
//! searched through their glyph layer; OCR documents through byte ranges
//! of the reconstructed token text. Both compare text with whitespace
//! removed, since extraction rarely preserves spacing exactly.

mod grouping;
mod ocr;
mod pdf;

pub use grouping::group_into_lines;
pub use ocr::locate_in_ocr;
pub use pdf::locate_in_pdf;

#[cfg(test)]
pub(crate) use ocr::tests::scanned_lease;
#[cfg(test)]
pub(crate) use pdf::tests::layout_page;

use std::ops::Range;

/// Whitespace-free view of a text, remembering where each char came from
#[derive(Debug, Clone, Default)]
pub(crate) struct CompactText {
    chars: Vec<char>,
    /// Source position of each char (byte offset or glyph index)
    origins: Vec<usize>,
}

impl CompactText {
    pub fn from_chars(source: impl IntoIterator<Item = (usize, char)>) -> Self {
        let (origins, chars) = source
            .into_iter()
            .filter(|(_, ch)| !ch.is_whitespace())
            .unzip();
        Self { chars, origins }
    }

    pub fn origin(&self, index: usize) -> usize {
        self.origins[index]
    }

    /// First match of `needle` at or after char index `from`
    pub fn find_from(&self, needle: &[char], from: usize) -> Option<Range<usize>> {
        if needle.is_empty() || needle.len() > self.chars.len() {
            return None;
        }
        (from..=self.chars.len() - needle.len())
            .find(|&start| self.chars[start..start + needle.len()] == *needle)
            .map(|start| start..start + needle.len())
    }

    /// Segments matched in order, each after the previous match, starting
    /// at char index `start`. Retried from the top when nothing matches.
    pub fn find_sequence(&self, segments: &[Vec<char>], start: usize) -> Vec<Range<usize>> {
        let sequential = |from: usize| {
            let mut cursor = from;
            segments
                .iter()
                .filter_map(|segment| {
                    let range = self.find_from(segment, cursor)?;
                    cursor = range.end;
                    Some(range)
                })
                .collect::<Vec<_>>()
        };

        let found = sequential(start);
        if found.is_empty() && start > 0 {
            sequential(0)
        } else {
            found
        }
    }

    /// Match of `needle` lying entirely inside `within`
    pub fn find_inside(&self, needle: &[char], within: &Range<usize>) -> Option<Range<usize>> {
        self.find_from(needle, within.start)
            .filter(|range| range.end <= within.end)
    }
}

/// Needle chars with whitespace removed
pub(crate) fn compact(text: &str) -> Vec<char> {
    text.chars().filter(|ch| !ch.is_whitespace()).collect()
}

/// Compact char index corresponding to byte `offset` of `text`
pub(crate) fn compact_index(text: &str, offset: usize) -> usize {
    text.get(..offset)
        .map_or(0, |head| head.chars().filter(|ch| !ch.is_whitespace()).count())
}
