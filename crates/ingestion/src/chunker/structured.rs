//! Header-driven splitting: articles with sub-enumeration, and numbered lists
//!
//! Both strategies locate headers by match position and slice the text
//! between consecutive headers, so bodies never depend on look-ahead.

use super::patterns::{self, Header};
use clauseforge_common::document::Enumeration;

/// A clause cut from one page before length filtering
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawClause {
    pub clause_number: String,
    pub title: Option<String>,
    pub content: String,
    pub enumeration: Option<Enumeration>,
}

/// One structural splitting strategy
pub(crate) struct Strategy {
    pub name: &'static str,
    pub find_headers: fn(&str) -> Vec<Header>,
    pub split_body: fn(&Header, &str) -> Vec<RawClause>,
}

/// Structural strategies in priority order
pub(crate) const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "article",
        find_headers: patterns::find_article_headers,
        split_body: split_article_body,
    },
    Strategy {
        name: "numbered_list",
        find_headers: patterns::find_numbered_items,
        split_body: split_numbered_item,
    },
];

pub(crate) fn article_identifier(number: u32) -> String {
    format!("제{}조", number)
}

pub(crate) fn sub_clause_identifier(article: &str, number: u32) -> String {
    format!("{} {}항", article, number)
}

/// Article part of an identifier: "제5조 2항" -> "제5조"
pub(crate) fn article_prefix(clause_number: &str) -> &str {
    clause_number
        .split_whitespace()
        .next()
        .unwrap_or(clause_number)
}

/// Split `text` at every marker of `style`.
///
/// Returns the text before the first marker and one `(number, body)` pair
/// per marker. Bodies are trimmed.
pub(crate) fn split_by_markers(style: Enumeration, text: &str) -> (String, Vec<(u32, String)>) {
    let markers = patterns::find_markers(style, text);
    let head_end = markers.first().map_or(text.len(), |m| m.start);
    let head = text[..head_end].trim().to_string();

    let parts = markers
        .iter()
        .enumerate()
        .map(|(i, marker)| {
            let end = markers.get(i + 1).map_or(text.len(), |next| next.start);
            (marker.number, text[marker.end..end].trim().to_string())
        })
        .collect();

    (head, parts)
}

fn split_article_body(header: &Header, body: &str) -> Vec<RawClause> {
    let article = article_identifier(header.number);
    let body = body.trim();

    let Some(style) = patterns::detect_enumeration(body) else {
        return vec![RawClause {
            clause_number: article,
            title: header.title.clone(),
            content: body.to_string(),
            enumeration: None,
        }];
    };

    let (_, parts) = split_by_markers(style, body);
    parts
        .into_iter()
        .map(|(number, content)| RawClause {
            clause_number: sub_clause_identifier(&article, number),
            title: header.title.clone(),
            content,
            enumeration: Some(style),
        })
        .collect()
}

fn split_numbered_item(header: &Header, body: &str) -> Vec<RawClause> {
    vec![RawClause {
        clause_number: format!("{}.", header.number),
        title: None,
        content: body.trim().to_string(),
        enumeration: None,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u32, title: Option<&str>) -> Header {
        Header {
            start: 0,
            end: 0,
            number,
            title: title.map(str::to_string),
        }
    }

    #[test]
    fn test_article_with_circled_sub_clauses() {
        let clauses = split_article_body(
            &header(1, Some("목적")),
            " ① 이 계약은 임대차에 관한 사항을 정한다. ② 이 계약에 없는 사항은 민법에 따른다.",
        );
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].clause_number, "제1조 1항");
        assert_eq!(clauses[0].content, "이 계약은 임대차에 관한 사항을 정한다.");
        assert_eq!(clauses[1].clause_number, "제1조 2항");
        assert_eq!(clauses[1].enumeration, Some(Enumeration::Circled));
    }

    #[test]
    fn test_article_with_dotted_sub_clauses() {
        let clauses = split_article_body(
            &header(7, None),
            "1. 임차인은 차임을 매월 말일에 지급한다.\n2. 연체 시 연 5%의 지연손해금을 지급한다.",
        );
        assert_eq!(
            clauses.iter().map(|c| c.clause_number.as_str()).collect::<Vec<_>>(),
            vec!["제7조 1항", "제7조 2항"]
        );
    }

    #[test]
    fn test_article_without_leading_marker_is_one_clause() {
        let body = "임대인은 목적물을 인도한다. 다만 ① 의 경우는 예외로 한다.";
        let clauses = split_article_body(&header(3, Some("인도")), body);
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].clause_number, "제3조");
        assert_eq!(clauses[0].content, body);
        assert_eq!(clauses[0].title.as_deref(), Some("인도"));
    }

    #[test]
    fn test_split_by_markers_keeps_head() {
        let (head, parts) = split_by_markers(
            Enumeration::Parenthesized,
            "앞 페이지에서 이어진 문장\n(3) 세 번째 항목\n(4) 네 번째 항목",
        );
        assert_eq!(head, "앞 페이지에서 이어진 문장");
        assert_eq!(parts, vec![(3, "세 번째 항목".to_string()), (4, "네 번째 항목".to_string())]);
    }

    #[test]
    fn test_article_prefix() {
        assert_eq!(article_prefix("제5조 2항"), "제5조");
        assert_eq!(article_prefix("제5조"), "제5조");
    }
}
