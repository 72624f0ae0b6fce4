//! Ingestion error types

use clauseforge_common::errors::AppError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestionError>;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("PDF parse error: {0}")]
    PdfParse(String),

    #[error("OCR response parse error: {0}")]
    OcrParse(String),

    #[error("No text content extracted from document")]
    NoText,

    #[error("Chunking produced no clauses")]
    NoClauses,

    #[error("Chunker configuration error: {0}")]
    ChunkConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::PdfParse(message) => AppError::PdfParse { message },
            IngestionError::OcrParse(message) => AppError::OcrParse { message },
            IngestionError::NoText => AppError::NoTextExtracted,
            IngestionError::NoClauses => AppError::ChunkingFailed,
            IngestionError::ChunkConfig(message) => AppError::Configuration { message },
            IngestionError::Io(e) => AppError::from(e),
            IngestionError::App(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clauseforge_common::errors::ErrorCode;

    #[test]
    fn test_no_clauses_maps_to_chunking_failed() {
        let err: AppError = IngestionError::NoClauses.into();
        assert_eq!(err.code(), ErrorCode::ChunkingFailed);
    }

    #[test]
    fn test_app_error_round_trips() {
        let err: AppError = IngestionError::from(AppError::NoPointsGenerated).into();
        assert!(matches!(err, AppError::NoPointsGenerated));
    }
}
