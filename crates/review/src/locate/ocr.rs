//! Offset-range lookup over an OCR token stream

use super::{compact, compact_index, group_into_lines, CompactText};
use clauseforge_common::document::{AggregatedClause, BoundingBox, PagePositions};
use clauseforge_ingestion::{OcrDocument, OcrToken};
use std::ops::Range;

/// Boxes for `clause` on the single OCR page.
///
/// Segments are located in order from the clause's recorded offset, each
/// one searched after the end of the previous, so wording repeated by an
/// earlier clause is not boxed again. The matched byte ranges select
/// tokens by their start offset.
pub fn locate_in_ocr(
    document: &OcrDocument,
    clause: &AggregatedClause,
    incorrect_part: &str,
) -> Vec<PagePositions> {
    let full_text = document.full_text();
    let text = CompactText::from_chars(full_text.char_indices());

    let segments: Vec<Vec<char>> = clause.segments().map(compact).collect();
    let start = compact_index(full_text, clause.anchor(1));
    let matches = text.find_sequence(&segments, start);

    let part = compact(incorrect_part);
    let part_match = matches
        .iter()
        .find_map(|within| text.find_inside(&part, within));

    let clause_boxes: Vec<BoundingBox> = matches
        .iter()
        .flat_map(|range| token_boxes(document, &text, range))
        .collect();
    let part_boxes: Vec<BoundingBox> = part_match
        .iter()
        .flat_map(|range| token_boxes(document, &text, range))
        .collect();

    vec![PagePositions {
        page: 1,
        positions: group_into_lines(&clause_boxes),
        part_positions: group_into_lines(&part_boxes),
    }]
}

/// Boxes of tokens starting inside the byte span of `range`
fn token_boxes(document: &OcrDocument, text: &CompactText, range: &Range<usize>) -> Vec<BoundingBox> {
    let start = text.origin(range.start);
    let end = text.origin(range.end - 1) + 1;
    let (width, height) = document.image_size();

    document
        .tokens_in_range(start, end)
        .filter_map(|token| token_box(token, width, height))
        .collect()
}

fn token_box(token: &OcrToken, width: f64, height: f64) -> Option<BoundingBox> {
    let (x0, y0, x1, y1) = token.bounds()?;
    Some(BoundingBox::from_corners(
        x0 / width * 100.0,
        y0 / height * 100.0,
        x1 / width * 100.0,
        y1 / height * 100.0,
    ))
}
