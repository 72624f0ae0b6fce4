//! PDF text extraction module
//!
//! Extracts page text and an approximate glyph layer from PDF content
//! streams using lopdf. Strings are decoded through the active font's
//! ToUnicode map or encoding. Glyph boxes are derived from the text matrix,
//! the current transformation matrix and the font size with fixed advance
//! widths (half an em for Latin, a full em for CJK), which is enough to
//! place line-level boxes.

use crate::errors::{IngestionError, Result};
use crate::font::{page_decoders, FontDecoder};
use clauseforge_common::document::Page;
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use std::path::Path;
use tracing::{debug, instrument, warn};

/// A4 portrait in points, used when a page carries no MediaBox
const DEFAULT_PAGE_SIZE: (f32, f32) = (595.0, 842.0);

/// Ascent share of the em box above the baseline
const ASCENT: f32 = 0.8;

/// One shown character with its box in top-left-origin points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub ch: char,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A page's text plus the glyphs it was built from
#[derive(Debug, Clone)]
pub struct PdfPage {
    pub page: Page,
    pub glyphs: Vec<Glyph>,
}

/// Explicit handle over one parsed PDF
#[derive(Debug, Clone, Default)]
pub struct PdfDocument {
    pages: Vec<PdfPage>,
}

impl PdfDocument {
    /// Parse a PDF held in memory
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| IngestionError::PdfParse(format!("Failed to load PDF: {}", e)))?;

        let page_ids = doc.get_pages();
        debug!(page_count = page_ids.len(), "Extracting text from PDF");

        let mut pages = Vec::with_capacity(page_ids.len());
        for (number, page_id) in page_ids {
            match extract_page(&doc, number, page_id) {
                Ok(page) if !page.page.text.trim().is_empty() => pages.push(page),
                Ok(_) => debug!(page = number, "Page has no text, skipping"),
                Err(e) => {
                    warn!(page = number, error = %e, "Failed to extract text from page, skipping")
                }
            }
        }

        if pages.is_empty() {
            return Err(IngestionError::NoText);
        }
        Ok(Self { pages })
    }

    /// Read and parse a PDF file off the async runtime
    pub async fn open(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        tokio::task::spawn_blocking(move || Self::from_bytes(&bytes))
            .await
            .map_err(|e| IngestionError::PdfParse(format!("Extraction task failed: {}", e)))?
    }

    /// Build a document from pre-extracted pages
    pub fn from_pages(pages: Vec<PdfPage>) -> Self {
        Self { pages }
    }

    /// Page text for chunking
    pub fn pages(&self) -> Vec<Page> {
        self.pages.iter().map(|p| p.page.clone()).collect()
    }

    /// Look up a page by its 1-based number
    pub fn page(&self, number: u32) -> Option<&PdfPage> {
        self.pages.iter().find(|p| p.page.number == number)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Text state tracked while walking a content stream
struct TextState {
    /// Text matrix [a b c d e f]
    matrix: [f32; 6],
    line_matrix: [f32; 6],
    /// Current transformation matrix
    ctm: [f32; 6],
    saved_ctm: Vec<[f32; 6]>,
    font_size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: IDENTITY,
            line_matrix: IDENTITY,
            ctm: IDENTITY,
            saved_ctm: Vec::new(),
            font_size: 12.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
        }
    }
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Matrix product `a × b` in PDF row-vector convention
fn multiply(a: [f32; 6], b: [f32; 6]) -> [f32; 6] {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

impl TextState {
    fn begin_text(&mut self) {
        self.matrix = IDENTITY;
        self.line_matrix = IDENTITY;
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        let m = self.line_matrix;
        self.line_matrix = [
            m[0],
            m[1],
            m[2],
            m[3],
            tx * m[0] + ty * m[2] + m[4],
            tx * m[1] + ty * m[3] + m[5],
        ];
        self.matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn concat(&mut self, m: [f32; 6]) {
        self.ctm = multiply(m, self.ctm);
    }

    fn save(&mut self) {
        self.saved_ctm.push(self.ctm);
    }

    fn restore(&mut self) {
        if let Some(ctm) = self.saved_ctm.pop() {
            self.ctm = ctm;
        }
    }

    /// Move along the text baseline by `tx` text-space units
    fn advance(&mut self, tx: f32) {
        self.matrix[4] += tx * self.matrix[0];
        self.matrix[5] += tx * self.matrix[1];
    }

    /// Emit glyphs for `text` and advance the text matrix
    fn show(&mut self, text: &str, page_height: f32, out: &mut Vec<Glyph>) {
        for ch in text.chars() {
            let rendering = multiply(self.matrix, self.ctm);
            let horizontal = (rendering[0].powi(2) + rendering[1].powi(2)).sqrt();
            let vertical = (rendering[2].powi(2) + rendering[3].powi(2)).sqrt();
            let size = self.font_size * if vertical > 0.0 { vertical } else { 1.0 };

            let advance = if is_wide(ch) { 1.0 } else { 0.5 } * self.font_size;
            let mut step = advance + self.char_spacing;
            if ch == ' ' {
                step += self.word_spacing;
            }

            out.push(Glyph {
                ch,
                x: rendering[4],
                y: page_height - (rendering[5] + ASCENT * size),
                width: advance * horizontal,
                height: size,
            });
            self.advance(step);
        }
    }

    fn adjust(&mut self, thousandths: f32) {
        self.advance(-thousandths / 1000.0 * self.font_size);
    }
}

fn is_wide(ch: char) -> bool {
    matches!(ch as u32,
        0x1100..=0x11FF | 0x2E80..=0x9FFF | 0xAC00..=0xD7A3 | 0xF900..=0xFAFF | 0xFF00..=0xFFEF)
        || ('\u{2460}'..='\u{24FF}').contains(&ch)
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    let mut out = [0.0; N];
    for (slot, obj) in out.iter_mut().zip(operands.iter()) {
        *slot = number(obj)?;
    }
    (operands.len() >= N).then_some(out)
}

fn media_box(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let mut current = Some(page_id);
    // MediaBox is inheritable from the page tree
    for _ in 0..8 {
        let Some(id) = current else { break };
        let Ok(dict) = doc.get_dictionary(id) else { break };
        if let Ok(values) = dict.get(b"MediaBox").and_then(Object::as_array) {
            let coords: Vec<f32> = values.iter().filter_map(number).collect();
            if coords.len() == 4 {
                return ((coords[2] - coords[0]).abs(), (coords[3] - coords[1]).abs());
            }
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    DEFAULT_PAGE_SIZE
}

/// Extract glyphs and text from a single page
fn extract_page(doc: &Document, page_number: u32, page_id: ObjectId) -> Result<PdfPage> {
    let (width, height) = media_box(doc, page_id);
    let raw = doc
        .get_page_content(page_id)
        .map_err(|e| IngestionError::PdfParse(e.to_string()))?;
    let content = Content::decode(&raw).map_err(|e| IngestionError::PdfParse(e.to_string()))?;

    let decoders = page_decoders(doc, page_id);
    let mut font: Option<&FontDecoder> = None;
    let mut state = TextState::default();
    let mut glyphs = Vec::new();

    let decode = |font: Option<&FontDecoder>, object: Option<&Object>| -> Option<String> {
        let Some(Object::String(bytes, format)) = object else {
            return None;
        };
        Some(match font {
            Some(decoder) => decoder.decode(bytes, format),
            None => FontDecoder::Unknown.decode(bytes, format),
        })
    };

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => state.save(),
            "Q" => state.restore(),
            "cm" => {
                if let Some(m) = numbers::<6>(operands) {
                    state.concat(m);
                }
            }
            "BT" => state.begin_text(),
            "Tf" => {
                font = operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| decoders.get(name));
                if let Some(size) = operands.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "TL" => {
                if let Some([leading]) = numbers::<1>(operands) {
                    state.leading = leading;
                }
            }
            "Tc" => {
                if let Some([spacing]) = numbers::<1>(operands) {
                    state.char_spacing = spacing;
                }
            }
            "Tw" => {
                if let Some([spacing]) = numbers::<1>(operands) {
                    state.word_spacing = spacing;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    state.move_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    state.leading = -ty;
                    state.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = numbers::<6>(operands) {
                    state.matrix = m;
                    state.line_matrix = m;
                }
            }
            "T*" => state.next_line(),
            "Tj" => {
                if let Some(text) = decode(font, operands.first()) {
                    state.show(&text, height, &mut glyphs);
                }
            }
            "'" => {
                state.next_line();
                if let Some(text) = decode(font, operands.first()) {
                    state.show(&text, height, &mut glyphs);
                }
            }
            "\"" => {
                if let Some([aw, ac]) = numbers::<2>(operands) {
                    state.word_spacing = aw;
                    state.char_spacing = ac;
                }
                state.next_line();
                if let Some(text) = decode(font, operands.get(2)) {
                    state.show(&text, height, &mut glyphs);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    for item in items {
                        match decode(font, Some(item)) {
                            Some(text) => state.show(&text, height, &mut glyphs),
                            None => {
                                if let Some(adjust) = number(item) {
                                    state.adjust(adjust);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    let text = layout_text(&glyphs);
    Ok(PdfPage {
        page: Page {
            number: page_number,
            text,
            width,
            height,
        },
        glyphs,
    })
}

/// Join glyphs into text, breaking lines where the baseline moves and
/// inserting a space across wide horizontal gaps
fn layout_text(glyphs: &[Glyph]) -> String {
    let mut text = String::with_capacity(glyphs.len() * 2);
    let mut previous: Option<&Glyph> = None;

    for glyph in glyphs {
        if let Some(prev) = previous {
            let line_shift = (glyph.y - prev.y).abs();
            let gap = glyph.x - (prev.x + prev.width);
            if line_shift > prev.height.max(glyph.height) * 0.5 {
                text.push('\n');
            } else if gap > glyph.height * 0.25 && glyph.ch != ' ' && prev.ch != ' ' {
                text.push(' ');
            }
        }
        text.push(glyph.ch);
        previous = Some(glyph);
    }

    text
}
