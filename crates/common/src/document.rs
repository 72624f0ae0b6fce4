//! Document model shared by chunking, review and position resolution
//!
//! Fragments are produced once per request and never mutated. An
//! [`AggregatedClause`] is assembled from fragments sharing a clause number
//! and is later filled in place by the correction and location steps.

use crate::CLAUSE_TEXT_SEPARATOR;
use serde::{Deserialize, Serialize};

/// One ordered unit of source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number
    pub number: u32,

    /// Raw page text
    pub text: String,

    /// Page width in glyph space (points for PDF, pixels for images)
    pub width: f32,

    /// Page height in glyph space
    pub height: f32,
}

impl Page {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
            width: 0.0,
            height: 0.0,
        }
    }
}

/// Sub-clause numbering style found inside an article body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enumeration {
    /// ①, ②, ③ ...
    Circled,
    /// 1. 2. 3. at line start
    Dotted,
    /// (1) (2) (3) at line start
    Parenthesized,
}

/// A contiguous span produced by chunking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseFragment {
    /// Clause identifier, e.g. "제3조 2항"
    pub clause_number: String,

    /// Article title, when the header carried one
    pub title: Option<String>,

    /// Fragment body text
    pub content: String,

    /// Source page (1-based)
    pub page: u32,

    /// 1-based position of the fragment within its page
    pub order_index: u32,

    /// Numbering style of the article this fragment belongs to
    pub enumeration: Option<Enumeration>,

    /// Byte offset of the content's first line in the page text
    #[serde(default)]
    pub offset: usize,
}

/// Where a piece of merged clause content physically came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub order_index: u32,
    pub page: u32,
    /// Byte offset of the fragment in its page text
    #[serde(default)]
    pub offset: usize,
}

/// LLM verdict written back onto an accepted clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub corrected_text: String,
    /// Explanation grounded in the reference material
    pub proof_text: String,
    pub violation_score: f64,
    /// Short verbatim excerpt of the original clause
    pub incorrect_part: String,
}

/// Rectangle in page-relative percentage units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Build from corner coordinates, clamped to [0, 100]
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        let left = clamp_percent(x0.min(x1));
        let top = clamp_percent(y0.min(y1));
        let right = clamp_percent(x0.max(x1));
        let bottom = clamp_percent(y0.max(y1));
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    /// Vertical center, used as the line grouping key
    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn is_within_bounds(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite() && (0.0..=100.0).contains(v))
            && self.x + self.width <= 100.0 + f64::EPSILON
            && self.y + self.height <= 100.0 + f64::EPSILON
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

fn clamp_percent(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 100.0)
    }
}

/// Bounding boxes recovered on one physical page
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PagePositions {
    pub page: u32,
    /// One box per text line of the whole clause
    pub positions: Vec<BoundingBox>,
    /// One box per text line of the flagged excerpt
    pub part_positions: Vec<BoundingBox>,
}

impl PagePositions {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.part_positions.is_empty()
    }
}

/// One logical clause assembled from fragments sharing a clause number
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedClause {
    pub clause_number: String,
    pub title: Option<String>,
    /// Fragment contents joined with [`CLAUSE_TEXT_SEPARATOR`]
    pub content: String,
    /// One entry per contributing fragment, in insertion order
    pub provenance: Vec<Provenance>,
    pub correction: Option<Correction>,
    /// One list per tracked page
    pub positions: Vec<PagePositions>,
}

impl AggregatedClause {
    /// Content split at fragment-merge boundaries
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.content
            .split(CLAUSE_TEXT_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Content with merge separators replaced, as sent to the embedder and LLM
    pub fn plain_text(&self) -> String {
        normalize_spacing(&self.content.replace(CLAUSE_TEXT_SEPARATOR, " "))
    }

    /// Distinct contributing pages in first-seen order, capped at `max_pages`
    pub fn tracked_pages(&self, max_pages: usize) -> Vec<u32> {
        let mut pages: Vec<u32> = Vec::new();
        for entry in &self.provenance {
            if !pages.contains(&entry.page) {
                pages.push(entry.page);
            }
        }
        pages.truncate(max_pages);
        pages
    }

    /// Earliest byte offset this clause was taken from on `page`
    pub fn anchor(&self, page: u32) -> usize {
        self.provenance
            .iter()
            .filter(|entry| entry.page == page)
            .map(|entry| entry.offset)
            .min()
            .unwrap_or(0)
    }

    /// True when at least one tracked page produced a box
    pub fn is_located(&self) -> bool {
        self.positions.iter().any(|p| !p.positions.is_empty())
    }

    /// Serializable view returned to callers
    pub fn to_report(&self) -> ClauseReport {
        let correction = self.correction.clone().unwrap_or(Correction {
            corrected_text: String::new(),
            proof_text: String::new(),
            violation_score: 0.0,
            incorrect_part: String::new(),
        });

        let mut seen_pages: Vec<u32> = Vec::new();
        let clause_data = self
            .provenance
            .iter()
            .map(|entry| {
                let first_on_page = !seen_pages.contains(&entry.page);
                seen_pages.push(entry.page);
                let located = self
                    .positions
                    .iter()
                    .find(|p| p.page == entry.page)
                    .filter(|_| first_on_page);

                ClauseData {
                    order_index: entry.order_index,
                    page: entry.page,
                    position: located
                        .map(|p| p.positions.iter().map(BoundingBox::as_array).collect())
                        .unwrap_or_default(),
                    position_part: located
                        .map(|p| p.part_positions.iter().map(BoundingBox::as_array).collect())
                        .unwrap_or_default(),
                }
            })
            .collect();

        ClauseReport {
            clause_number: self.clause_number.clone(),
            incorrect_text: self.content.clone(),
            corrected_text: correction.corrected_text,
            proof_text: correction.proof_text,
            violation_score: correction.violation_score,
            incorrect_part: correction.incorrect_part,
            clause_data,
        }
    }
}

/// Output shape of one reviewed clause
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClauseReport {
    pub clause_number: String,
    pub incorrect_text: String,
    pub corrected_text: String,
    pub proof_text: String,
    pub violation_score: f64,
    pub incorrect_part: String,
    pub clause_data: Vec<ClauseData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClauseData {
    pub order_index: u32,
    pub page: u32,
    pub position: Vec<[f64; 4]>,
    pub position_part: Vec<[f64; 4]>,
}

/// Collapse every whitespace run to a single space and trim the ends
pub fn normalize_spacing(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Grouping key for clause numbers: whitespace-collapsed and lowercased
pub fn clause_key(clause_number: &str) -> String {
    normalize_spacing(clause_number).to_lowercase()
}
