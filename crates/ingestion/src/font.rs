//! Font-aware decoding of shown strings
//!
//! Composite (Type0) fonts in Korean contracts are almost always
//! Identity-H with a ToUnicode CMap, which lopdf does not decode. The CMap
//! is parsed here; simple fonts go through lopdf's named encodings.

use lopdf::{Dictionary, Document, Object, StringFormat};
use std::collections::HashMap;
use tracing::debug;

/// How to turn a font's string bytes into text
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FontDecoder {
    /// Codes of `code_len` bytes looked up in a ToUnicode map
    ToUnicode {
        code_len: usize,
        map: HashMap<u32, String>,
    },
    /// Two-byte UCS-2 CMaps such as UniKS-UCS2-H
    Ucs2,
    /// Single-byte simple font with a named encoding
    Simple(String),
    /// No usable font information
    Unknown,
}

impl FontDecoder {
    /// Pick the decoder for one font resource
    pub fn for_font(doc: &Document, font: &Dictionary) -> Self {
        let composite = font.get(b"Subtype").and_then(Object::as_name_str).ok() == Some("Type0");

        if let Some(cmap) = to_unicode_source(doc, font) {
            let (code_len, map) = parse_to_unicode(&cmap);
            if !map.is_empty() {
                let code_len = if composite { code_len.max(2) } else { code_len };
                return FontDecoder::ToUnicode { code_len, map };
            }
        }

        let encoding = font.get_font_encoding();
        if composite {
            return if encoding.contains("UCS2") || encoding.contains("UTF16") {
                FontDecoder::Ucs2
            } else {
                debug!(encoding, "Composite font without ToUnicode, guessing text");
                FontDecoder::Unknown
            };
        }
        FontDecoder::Simple(encoding.to_string())
    }

    pub fn decode(&self, bytes: &[u8], format: &StringFormat) -> String {
        match self {
            FontDecoder::ToUnicode { code_len, map } => bytes
                .chunks(*code_len)
                .map(|code| {
                    let key = code.iter().fold(0u32, |acc, &b| acc << 8 | b as u32);
                    map.get(&key).map_or("\u{FFFD}", String::as_str)
                })
                .collect(),
            FontDecoder::Ucs2 => utf16_be(bytes),
            FontDecoder::Simple(encoding) => {
                // producers still emit BOM-marked strings through simple fonts
                match bytes.strip_prefix(&[0xFE, 0xFF]) {
                    Some(rest) => utf16_be(rest),
                    None => Document::decode_text(Some(encoding.as_str()), bytes),
                }
            }
            FontDecoder::Unknown => decode_pdf_string(bytes, format),
        }
    }
}

/// Decoders for every font resource visible from a page, keyed by name
pub(crate) fn page_decoders(doc: &Document, page_id: lopdf::ObjectId) -> HashMap<Vec<u8>, FontDecoder> {
    doc.get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, FontDecoder::for_font(doc, font)))
        .collect()
}

/// Decode without font information; UTF-16BE when marked or hex-encoded
fn decode_pdf_string(bytes: &[u8], format: &StringFormat) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return utf16_be(rest);
    }
    if matches!(format, StringFormat::Hexadecimal) && bytes.len() >= 2 && bytes.len() % 2 == 0 {
        return utf16_be(bytes);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn utf16_be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn to_unicode_source(doc: &Document, font: &Dictionary) -> Option<Vec<u8>> {
    let (_, object) = doc.dereference(font.get(b"ToUnicode").ok()?).ok()?;
    let stream = object.as_stream().ok()?;
    // unfiltered streams have nothing to decompress
    Some(
        stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone()),
    )
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Open,
    Close,
    Word(String),
}

fn tokenize(source: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < source.len() {
        match source[i] {
            b'<' => {
                let end = source[i..].iter().position(|&b| b == b'>').map_or(source.len(), |p| i + p);
                let digits: Vec<u8> = source[i + 1..end]
                    .iter()
                    .filter(|b| b.is_ascii_hexdigit())
                    .copied()
                    .collect();
                let bytes = digits
                    .chunks(2)
                    .filter_map(|pair| {
                        let text = std::str::from_utf8(pair).ok()?;
                        u8::from_str_radix(&format!("{:0<2}", text), 16).ok()
                    })
                    .collect();
                tokens.push(Token::Hex(bytes));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b']' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b'%' => {
                while i < source.len() && source[i] != b'\n' {
                    i += 1;
                }
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < source.len() && !b"<[]% \t\r\n".contains(&source[i]) {
                    i += 1;
                }
                tokens.push(Token::Word(String::from_utf8_lossy(&source[start..i]).into_owned()));
            }
        }
    }
    tokens
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| acc << 8 | b as u32)
}

/// Parse a ToUnicode CMap into its code width and code-to-text map
pub(crate) fn parse_to_unicode(source: &[u8]) -> (usize, HashMap<u32, String>) {
    let tokens = tokenize(source);
    let mut map = HashMap::new();
    let mut code_len = None;
    let mut section = "";
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(word) if word.starts_with("begin") || word.starts_with("end") => {
                section = match word.as_str() {
                    "begincodespacerange" => "codespace",
                    "beginbfchar" => "bfchar",
                    "beginbfrange" => "bfrange",
                    _ => "",
                };
                i += 1;
            }
            Token::Hex(low) if section == "codespace" => {
                code_len.get_or_insert(low.len().max(1));
                i += 2;
            }
            Token::Hex(source) if section == "bfchar" => {
                if let Some(Token::Hex(target)) = tokens.get(i + 1) {
                    map.insert(code_value(source), utf16_be(target));
                }
                i += 2;
            }
            Token::Hex(low) if section == "bfrange" => {
                let (Some(Token::Hex(high)), Some(target)) = (tokens.get(i + 1), tokens.get(i + 2)) else {
                    break;
                };
                let (low, high) = (code_value(low), code_value(high));
                match target {
                    Token::Hex(start) => {
                        let mut units: Vec<u16> = start
                            .chunks_exact(2)
                            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                            .collect();
                        for code in low..=high.min(low.saturating_add(0xFFFF)) {
                            map.insert(code, String::from_utf16_lossy(&units));
                            if let Some(last) = units.last_mut() {
                                *last = last.wrapping_add(1);
                            }
                        }
                        i += 3;
                    }
                    Token::Open => {
                        let mut j = i + 3;
                        let mut code = low;
                        while let Some(Token::Hex(target)) = tokens.get(j) {
                            if code <= high {
                                map.insert(code, utf16_be(target));
                            }
                            code += 1;
                            j += 1;
                        }
                        i = j + 1;
                    }
                    _ => i += 3,
                }
            }
            _ => i += 1,
        }
    }

    (code_len.unwrap_or(2), map)
}
