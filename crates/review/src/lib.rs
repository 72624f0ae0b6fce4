//! ClauseForge Review Library
//!
//! Retrieval-augmented review of contracts:
//! - Reference search and LLM correction per clause
//! - Position resolution for PDF glyphs and OCR tokens
//! - The per-document pipeline tying them together

pub mod corrector;
pub mod locate;
pub mod pipeline;

pub use corrector::{LlmCorrector, Stage, Verdict};
pub use pipeline::{AnalysisRequest, ClauseOutcome, ReviewPipeline, ReviewReport, ReviewSource};
