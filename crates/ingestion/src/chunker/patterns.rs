//! Structural patterns for Korean legal numbering
//!
//! All patterns are line-anchored where the numbering convention requires it
//! so that inline references ("제3조에 따라") are not read as headers.

use clauseforge_common::document::Enumeration;
use regex_lite::Regex;
use std::sync::OnceLock;

static ARTICLE_HEADER: OnceLock<Regex> = OnceLock::new();
static DOTTED_MARKER: OnceLock<Regex> = OnceLock::new();
static PARENTHESIZED_MARKER: OnceLock<Regex> = OnceLock::new();
static PAGE_NUMBER_LINE: OnceLock<Regex> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

/// "제N조" with an optional 【title】, (title) or [title]
pub(crate) fn article_header() -> &'static Regex {
    compiled(
        &ARTICLE_HEADER,
        r"(?m)^[ \t]*제[ \t]*(\d+)[ \t]*조(?:[ \t]*(?:【([^】\n]*)】|\(([^)\n]*)\)|\[([^\]\n]*)\]))?",
    )
}

/// "N." at line start followed by whitespace
pub(crate) fn dotted_marker() -> &'static Regex {
    compiled(&DOTTED_MARKER, r"(?m)^[ \t]*(\d+)\.(?:[ \t]+|$)")
}

/// "(N)" at line start
pub(crate) fn parenthesized_marker() -> &'static Regex {
    compiled(&PARENTHESIZED_MARKER, r"(?m)^[ \t]*\((\d+)\)[ \t]*")
}

fn page_number_line() -> &'static Regex {
    compiled(
        &PAGE_NUMBER_LINE,
        r"^(?:-[ \t]*\d+[ \t]*-|\d+[ \t]*/[ \t]*\d+|\d+)$",
    )
}

/// Value of a circled-number glyph, ① = 1 through ⑳ = 20
pub(crate) fn circled_value(c: char) -> Option<u32> {
    let code = c as u32;
    (0x2460..=0x2473).contains(&code).then(|| code - 0x2460 + 1)
}

fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Page furniture that should not decide whether a page opens with a header
pub(crate) fn is_boilerplate_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with("페이지") || page_number_line().is_match(trimmed)
}

/// A numbering marker located in some text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Marker {
    /// Byte offset where the marker (including leading indentation) begins
    pub start: usize,
    /// Byte offset just past the marker and its trailing spacing
    pub end: usize,
    pub number: u32,
}

/// An article header located in page text
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Header {
    pub start: usize,
    pub end: usize,
    pub number: u32,
    pub title: Option<String>,
}

/// Every article header in `text`, in order
pub(crate) fn find_article_headers(text: &str) -> Vec<Header> {
    article_header()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?.as_str().parse().ok()?;
            let title = (2..=4)
                .find_map(|i| caps.get(i))
                .map(|m| m.as_str().trim().to_string());

            // "제3조에 따라" is a reference, not a header
            if title.is_none() {
                if let Some(next) = text[whole.end()..].chars().next() {
                    if is_hangul_syllable(next) {
                        return None;
                    }
                }
            }

            Some(Header {
                start: whole.start(),
                end: whole.end(),
                number,
                title,
            })
        })
        .collect()
}

/// Every dotted "N." item header at line start, in order
pub(crate) fn find_numbered_items(text: &str) -> Vec<Header> {
    find_markers(Enumeration::Dotted, text)
        .into_iter()
        .map(|m| Header {
            start: m.start,
            end: m.end,
            number: m.number,
            title: None,
        })
        .collect()
}

/// Markers of one enumeration style, in order
pub(crate) fn find_markers(style: Enumeration, text: &str) -> Vec<Marker> {
    match style {
        Enumeration::Circled => text
            .char_indices()
            .filter_map(|(i, c)| {
                circled_value(c).map(|number| {
                    let after = i + c.len_utf8();
                    let spacing = text[after..].len() - text[after..].trim_start().len();
                    Marker {
                        start: i,
                        end: after + spacing,
                        number,
                    }
                })
            })
            .collect(),
        Enumeration::Dotted => regex_markers(dotted_marker(), text),
        Enumeration::Parenthesized => regex_markers(parenthesized_marker(), text),
    }
}

fn regex_markers(pattern: &Regex, text: &str) -> Vec<Marker> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?.as_str().parse().ok()?;
            Some(Marker {
                start: whole.start(),
                end: whole.end(),
                number,
            })
        })
        .collect()
}

/// Numbering style an article body opens with, if any
pub(crate) fn detect_enumeration(body: &str) -> Option<Enumeration> {
    let body = body.trim_start();
    let first = body.chars().next()?;
    if circled_value(first).is_some() {
        return Some(Enumeration::Circled);
    }
    if parenthesized_marker().find(body).is_some_and(|m| m.start() == 0) {
        return Some(Enumeration::Parenthesized);
    }
    if dotted_marker().find(body).is_some_and(|m| m.start() == 0) {
        return Some(Enumeration::Dotted);
    }
    None
}
