//! Merge fragments that share a clause number into logical clauses

use clauseforge_common::document::{clause_key, AggregatedClause, ClauseFragment, Provenance};
use clauseforge_common::CLAUSE_TEXT_SEPARATOR;
use std::collections::HashMap;
use tracing::debug;

/// Groups fragments by normalized clause number
#[derive(Debug, Clone)]
pub struct ChunkAggregator {
    /// Fragments longer than this are not appended to an already seeded clause
    max_merge_chars: usize,
}

impl ChunkAggregator {
    pub fn new(max_merge_chars: usize) -> Self {
        Self { max_merge_chars }
    }

    /// Merge `fragments` into clauses ordered by first appearance.
    ///
    /// Every non-empty fragment adds one provenance entry to its clause, even
    /// when its text is too long to be appended.
    pub fn aggregate(&self, fragments: &[ClauseFragment]) -> Vec<AggregatedClause> {
        let mut clauses: Vec<AggregatedClause> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for fragment in fragments {
            let content = fragment.content.trim();
            if content.is_empty() {
                continue;
            }

            let key = clause_key(&fragment.clause_number);
            let provenance = Provenance {
                order_index: fragment.order_index,
                page: fragment.page,
                offset: fragment.offset,
            };

            match positions.get(&key) {
                Some(&slot) => {
                    let clause = &mut clauses[slot];
                    if content.chars().count() > self.max_merge_chars {
                        debug!(
                            clause = %clause.clause_number,
                            page = fragment.page,
                            "Fragment too long to merge, recording location only"
                        );
                    } else {
                        clause.content.push_str(CLAUSE_TEXT_SEPARATOR);
                        clause.content.push_str(content);
                    }
                    clause.provenance.push(provenance);
                }
                None => {
                    positions.insert(key, clauses.len());
                    clauses.push(AggregatedClause {
                        clause_number: fragment.clause_number.trim().to_string(),
                        title: fragment.title.clone(),
                        content: content.to_string(),
                        provenance: vec![provenance],
                        correction: None,
                        positions: Vec::new(),
                    });
                }
            }
        }

        clauses
    }
}

impl Default for ChunkAggregator {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clauseforge_common::document::normalize_spacing;

    fn fragment(number: &str, content: &str, page: u32, order_index: u32) -> ClauseFragment {
        ClauseFragment {
            clause_number: number.to_string(),
            title: None,
            content: content.to_string(),
            page,
            order_index,
            enumeration: None,
            offset: 0,
        }
    }

    #[test]
    fn test_page_spanning_clause_merges() {
        let clauses = ChunkAggregator::default().aggregate(&[
            fragment("제5조 1항", "첫째 항", 3, 3),
            fragment("제5조 2항", "수선 의무를 이행하지 아니한 경우", 3, 4),
            fragment("제5조  2항", "계약을 해지할 수 있다", 4, 1),
            fragment("제6조", "기타 사항", 4, 2),
        ]);

        assert_eq!(clauses.len(), 3);
        let spanning = &clauses[1];
        assert_eq!(spanning.clause_number, "제5조 2항");
        assert_eq!(
            spanning.provenance,
            vec![
                Provenance { order_index: 4, page: 3, offset: 0 },
                Provenance { order_index: 1, page: 4, offset: 0 },
            ]
        );
        assert_eq!(
            spanning.content,
            "수선 의무를 이행하지 아니한 경우!!!계약을 해지할 수 있다"
        );
        assert_eq!(spanning.tracked_pages(2).len(), 2);
    }

    #[test]
    fn test_first_seen_order_is_kept() {
        let clauses = ChunkAggregator::default().aggregate(&[
            fragment("B", "b1", 1, 1),
            fragment("A", "a1", 1, 2),
            fragment("b", "b2", 2, 1),
        ]);
        assert_eq!(
            clauses.iter().map(|c| c.clause_number.as_str()).collect::<Vec<_>>(),
            vec!["B", "A"]
        );
        assert_eq!(clauses[0].content, "b1!!!b2");
    }

    #[test]
    fn test_long_fragment_records_provenance_only() {
        let long = "가".repeat(501);
        let clauses = ChunkAggregator::default().aggregate(&[
            fragment("제1조", "짧은 본문", 1, 1),
            fragment("제1조", &long, 2, 1),
        ]);
        assert_eq!(clauses[0].content, "짧은 본문");
        assert_eq!(clauses[0].provenance.len(), 2);
    }

    #[test]
    fn test_empty_fragments_are_skipped() {
        let clauses = ChunkAggregator::default().aggregate(&[
            fragment("제1조", "  ", 1, 1),
            fragment("제2조", "본문", 1, 2),
        ]);
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].clause_number, "제2조");
    }

    #[test]
    fn test_every_fragment_lands_in_exactly_one_clause() {
        let fragments = vec![
            fragment("제1조 1항", "가 나", 1, 1),
            fragment("제1조 2항", "다", 1, 2),
            fragment("제1조 2항", "라 마", 2, 1),
            fragment("제2조", "바", 2, 2),
        ];
        let clauses = ChunkAggregator::default().aggregate(&fragments);

        let provenance_total: usize = clauses.iter().map(|c| c.provenance.len()).sum();
        assert_eq!(provenance_total, fragments.len());

        let rebuilt = clauses
            .iter()
            .flat_map(|c| c.segments().map(str::to_string).collect::<Vec<_>>())
            .collect::<Vec<_>>()
            .join(" ");
        let original = fragments
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(normalize_spacing(&rebuilt), normalize_spacing(&original));
    }
}
