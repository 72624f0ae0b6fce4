//! Glyph-layer search over native PDF pages

use super::{compact, compact_index, group_into_lines, CompactText};
use clauseforge_common::document::{AggregatedClause, BoundingBox, PagePositions};
use clauseforge_ingestion::{Glyph, PdfDocument, PdfPage};
use std::ops::Range;
use tracing::debug;

/// Boxes for `clause` on each of its first `max_pages` contributing pages.
///
/// Separator-delimited segments are searched in order on every tracked
/// page, starting where the clause was taken from on that page.
/// `incorrect_part` is only matched inside the clause's own matches on that
/// page.
pub fn locate_in_pdf(
    document: &PdfDocument,
    clause: &AggregatedClause,
    incorrect_part: &str,
    max_pages: usize,
) -> Vec<PagePositions> {
    let segments: Vec<Vec<char>> = clause.segments().map(compact).collect();
    let part = compact(incorrect_part);

    clause
        .tracked_pages(max_pages)
        .into_iter()
        .map(|number| {
            let Some(page) = document.page(number) else {
                debug!(page = number, "Page not present in document");
                return PagePositions {
                    page: number,
                    ..Default::default()
                };
            };
            let start = compact_index(&page.page.text, clause.anchor(number));
            locate_on_page(page, &segments, &part, start)
        })
        .collect()
}

/// Page text and the glyph layer share their non-whitespace chars, so a
/// compact index into one is an index into the other
fn locate_on_page(page: &PdfPage, segments: &[Vec<char>], part: &[char], start: usize) -> PagePositions {
    let text = CompactText::from_chars(page.glyphs.iter().map(|g| g.ch).enumerate());

    let matches = text.find_sequence(segments, start);
    let part_match = matches
        .iter()
        .find_map(|within| text.find_inside(part, within));

    let boxes_for = |range: &Range<usize>| -> Vec<BoundingBox> {
        range
            .clone()
            .map(|i| glyph_box(&page.glyphs[text.origin(i)], page.page.width, page.page.height))
            .collect()
    };

    let clause_boxes: Vec<BoundingBox> = matches.iter().flat_map(boxes_for).collect();
    let part_boxes: Vec<BoundingBox> = part_match.iter().flat_map(boxes_for).collect();

    PagePositions {
        page: page.page.number,
        positions: group_into_lines(&clause_boxes),
        part_positions: group_into_lines(&part_boxes),
    }
}

fn glyph_box(glyph: &Glyph, width: f32, height: f32) -> BoundingBox {
    let (width, height) = (width.max(1.0) as f64, height.max(1.0) as f64);
    let x0 = glyph.x as f64 / width * 100.0;
    let y0 = glyph.y as f64 / height * 100.0;
    let x1 = (glyph.x + glyph.width) as f64 / width * 100.0;
    let y1 = (glyph.y + glyph.height) as f64 / height * 100.0;
    BoundingBox::from_corners(x0, y0, x1, y1)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use clauseforge_common::document::{Page, Provenance};

    /// Lay `text` out in 10pt monospace cells on a 500x1000 page, one
    /// line per `\n`, starting at (50, 100)
    pub(crate) fn layout_page(number: u32, text: &str) -> PdfPage {
        let mut glyphs = Vec::new();
        for (row, line) in text.lines().enumerate() {
            for (col, ch) in line.chars().enumerate() {
                glyphs.push(Glyph {
                    ch,
                    x: 50.0 + col as f32 * 10.0,
                    y: 100.0 + row as f32 * 20.0,
                    width: 10.0,
                    height: 10.0,
                });
            }
        }
        PdfPage {
            page: Page {
                number,
                text: text.to_string(),
                width: 500.0,
                height: 1000.0,
            },
            glyphs,
        }
    }

    fn clause(content: &str, pages: &[u32]) -> AggregatedClause {
        AggregatedClause {
            clause_number: "제5조 2항".to_string(),
            content: content.to_string(),
            provenance: pages
                .iter()
                .enumerate()
                .map(|(i, &page)| Provenance {
                    order_index: i as u32 + 1,
                    page,
                    offset: 0,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_clause_spanning_two_pages() {
        let document = PdfDocument::from_pages(vec![
            layout_page(3, "제5조(수선)\n② 임대인이 수선 의무를\n이행하지 아니한 경우"),
            layout_page(4, "임차인은 계약을 해지할 수 있다.\n제6조(기타)"),
        ]);
        let clause = clause(
            "임대인이 수선 의무를 이행하지 아니한 경우!!!임차인은 계약을 해지할 수 있다.",
            &[3, 4],
        );

        let positions = locate_in_pdf(&document, &clause, "수선 의무를 이행하지", 2);
        assert_eq!(positions.len(), 2);

        let first = &positions[0];
        assert_eq!(first.page, 3);
        assert_eq!(first.positions.len(), 2);
        assert_eq!(first.part_positions.len(), 2);
        // "임대인이" starts in the third cell of the second line
        assert!((first.positions[0].x - 14.0).abs() < 1e-6);
        assert!((first.positions[0].y - 12.0).abs() < 1e-6);

        let second = &positions[1];
        assert_eq!(second.page, 4);
        assert_eq!(second.positions.len(), 1);
        assert!(second.part_positions.is_empty());

        for rect in positions.iter().flat_map(|p| p.positions.iter().chain(&p.part_positions)) {
            assert!(rect.is_within_bounds());
        }
    }

    #[test]
    fn test_only_first_two_pages_are_tracked() {
        let document = PdfDocument::from_pages(vec![
            layout_page(1, "가나다라마"),
            layout_page(2, "바사아자차"),
            layout_page(3, "카타파하"),
        ]);
        let clause = clause("가나다라마!!!바사아자차!!!카타파하", &[1, 2, 3]);
        let positions = locate_in_pdf(&document, &clause, "", 2);
        assert_eq!(positions.iter().map(|p| p.page).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_repeated_wording_boxes_only_the_clause_occurrence() {
        let text = "제1조(수선)\n임차인은 수선비를 부담한다.\n제2조(특약)\n임차인은 수선비를 부담한다.";
        let document = PdfDocument::from_pages(vec![layout_page(1, text)]);
        let mut clause = clause("임차인은 수선비를 부담한다.", &[1]);
        clause.provenance[0].offset = text.rfind("임차인은").unwrap();

        let positions = locate_in_pdf(&document, &clause, "수선비를", 2);
        let page = &positions[0];
        assert_eq!(page.positions.len(), 1);
        // fourth line
        assert!((page.positions[0].y - 16.0).abs() < 1e-6);
        assert_eq!(page.part_positions.len(), 1);
        assert!((page.part_positions[0].y - 16.0).abs() < 1e-6);
    }

    #[test]
    fn test_text_not_on_page_yields_no_boxes() {
        let document = PdfDocument::from_pages(vec![layout_page(1, "전혀 다른 문장")]);
        let positions = locate_in_pdf(&document, &clause("없는 조항", &[1]), "없는", 2);
        assert!(positions[0].is_empty());
    }
}
