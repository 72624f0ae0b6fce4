//! OCR token stream built from a CLOVA OCR (V2 general) response
//!
//! Tokens keep their absolute pixel polygon and their byte range inside the
//! reconstructed full text. Tokens are joined with a space, or a newline
//! after tokens the provider marks as ending a line.

use crate::errors::{IngestionError, Result};
use clauseforge_common::document::Page;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ClovaResponse {
    images: Vec<ClovaImage>,
}

#[derive(Debug, Deserialize)]
struct ClovaImage {
    #[serde(default)]
    fields: Vec<ClovaField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClovaField {
    infer_text: String,
    bounding_poly: BoundingPoly,
    #[serde(default)]
    line_break: bool,
}

#[derive(Debug, Deserialize)]
struct BoundingPoly {
    vertices: Vec<Vertex>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct Vertex {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// One recognized word with its pixel polygon and text offsets
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub vertices: Vec<Vertex>,
    /// Byte offset of the token in the full text
    pub start: usize,
    /// Byte offset one past the token's last byte
    pub end: usize,
}

impl OcrToken {
    /// Axis-aligned bounds as (min_x, min_y, max_x, max_y) in pixels
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let first = self.vertices.first()?;
        Some(self.vertices.iter().fold(
            (first.x, first.y, first.x, first.y),
            |(x0, y0, x1, y1), v| (x0.min(v.x), y0.min(v.y), x1.max(v.x), y1.max(v.y)),
        ))
    }
}

/// Explicit handle over one OCR'd image
#[derive(Debug, Clone)]
pub struct OcrDocument {
    full_text: String,
    tokens: Vec<OcrToken>,
    image_width: f64,
    image_height: f64,
}

impl OcrDocument {
    /// Build from a decoded CLOVA response and the submitted image size
    pub fn from_clova_response(response: &Value, image_width: u32, image_height: u32) -> Result<Self> {
        if image_width == 0 || image_height == 0 {
            return Err(IngestionError::OcrParse(format!(
                "Invalid image size {}x{}",
                image_width, image_height
            )));
        }

        let parsed: ClovaResponse = serde_json::from_value(response.clone())
            .map_err(|e| IngestionError::OcrParse(e.to_string()))?;

        let mut full_text = String::new();
        let mut tokens = Vec::new();

        for field in parsed.images.into_iter().flat_map(|image| image.fields) {
            let text = field.infer_text.trim();
            if text.is_empty() {
                continue;
            }
            if field.bounding_poly.vertices.is_empty() {
                return Err(IngestionError::OcrParse(format!(
                    "Token '{}' has no bounding polygon",
                    text
                )));
            }

            let start = full_text.len();
            full_text.push_str(text);
            let end = full_text.len();
            full_text.push(if field.line_break { '\n' } else { ' ' });

            tokens.push(OcrToken {
                text: text.to_string(),
                vertices: field.bounding_poly.vertices.clone(),
                start,
                end,
            });
        }

        if tokens.is_empty() {
            return Err(IngestionError::NoText);
        }

        debug!(tokens = tokens.len(), text_len = full_text.len(), "OCR token stream built");

        Ok(Self {
            full_text,
            tokens,
            image_width: image_width as f64,
            image_height: image_height as f64,
        })
    }

    pub fn from_clova_json(raw: &str, image_width: u32, image_height: u32) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| IngestionError::OcrParse(e.to_string()))?;
        Self::from_clova_response(&value, image_width, image_height)
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn tokens(&self) -> &[OcrToken] {
        &self.tokens
    }

    /// Image size in pixels as (width, height)
    pub fn image_size(&self) -> (f64, f64) {
        (self.image_width, self.image_height)
    }

    /// Tokens whose start offset falls in `start..end`
    pub fn tokens_in_range(&self, start: usize, end: usize) -> impl Iterator<Item = &OcrToken> {
        self.tokens
            .iter()
            .filter(move |token| start <= token.start && token.start < end)
    }

    /// The whole image as a single page for chunking
    pub fn pages(&self) -> Vec<Page> {
        vec![Page {
            number: 1,
            text: self.full_text.clone(),
            width: self.image_width as f32,
            height: self.image_height as f32,
        }]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    fn field(text: &str, x: f64, y: f64, width: f64, line_break: bool) -> Value {
        json!({
            "inferText": text,
            "lineBreak": line_break,
            "boundingPoly": { "vertices": [
                { "x": x, "y": y },
                { "x": x + width, "y": y },
                { "x": x + width, "y": y + 20.0 },
                { "x": x, "y": y + 20.0 }
            ]}
        })
    }

    /// Two lines on a 1000x2000 image
    pub(crate) fn sample_response() -> Value {
        json!({
            "version": "V2",
            "images": [{
                "inferResult": "SUCCESS",
                "fields": [
                    field("제1조(목적)", 100.0, 100.0, 120.0, true),
                    field("임차인은", 100.0, 140.0, 80.0, false),
                    field("차임을", 190.0, 140.0, 60.0, false),
                    field("지급한다.", 260.0, 140.0, 90.0, true)
                ]
            }]
        })
    }

    #[test]
    fn test_builds_full_text_and_offsets() {
        let doc = OcrDocument::from_clova_response(&sample_response(), 1000, 2000).unwrap();
        assert_eq!(doc.full_text(), "제1조(목적)\n임차인은 차임을 지급한다.\n");

        for token in doc.tokens() {
            assert_eq!(&doc.full_text()[token.start..token.end], token.text);
        }
        assert_eq!(doc.pages()[0].width, 1000.0);
    }

    #[test]
    fn test_range_lookup_uses_token_start() {
        let doc = OcrDocument::from_clova_response(&sample_response(), 1000, 2000).unwrap();
        let second = &doc.tokens()[1];
        let third = &doc.tokens()[2];

        let hits: Vec<&str> = doc
            .tokens_in_range(second.start, third.end)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(hits, vec!["임차인은", "차임을"]);
    }

    #[test]
    fn test_token_bounds() {
        let doc = OcrDocument::from_clova_response(&sample_response(), 1000, 2000).unwrap();
        assert_eq!(doc.tokens()[0].bounds(), Some((100.0, 100.0, 220.0, 120.0)));
    }

    #[test]
    fn test_malformed_responses_are_rejected() {
        assert!(matches!(
            OcrDocument::from_clova_response(&json!({ "images": "nope" }), 10, 10),
            Err(IngestionError::OcrParse(_))
        ));
        assert!(matches!(
            OcrDocument::from_clova_response(&sample_response(), 0, 10),
            Err(IngestionError::OcrParse(_))
        ));
        assert!(matches!(
            OcrDocument::from_clova_response(&json!({ "images": [{ "fields": [] }] }), 10, 10),
            Err(IngestionError::NoText)
        ));
    }
}
