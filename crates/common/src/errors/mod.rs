//! Error types for ClauseForge
//!
//! Provides a single typed error for every failure the pipeline can surface:
//! - Input/validation errors (never retried)
//! - Chunking and document extraction errors (document-fatal)
//! - Embedding, vector index and LLM errors
//! - Machine-readable error codes and an HTTP status hint for transports

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Global (Gxxx)
    ValidationError,
    MissingField,
    UnsupportedFileType,

    // Common (Cxxx)
    PdfParseError,
    OcrParseError,
    NoTextExtracted,
    EmbeddingFailed,
    NoPointsGenerated,
    IndexUnavailable,
    IndexRequestFailed,
    LlmTimeout,
    LlmMalformedReply,
    ConfigurationError,
    SerializationError,
    InternalError,

    // Standard documents (Sxxx)
    ChunkingFailed,
    MaxTrialExceeded,
    DeleteFailed,

    // Agreement review (Axxx)
    NoSearchResult,
    AnalysisFailed,
}

impl ErrorCode {
    /// Get the string code for this error
    pub fn as_code(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "G001",
            ErrorCode::MissingField => "G002",
            ErrorCode::UnsupportedFileType => "G003",

            ErrorCode::PdfParseError => "C001",
            ErrorCode::OcrParseError => "C002",
            ErrorCode::NoTextExtracted => "C003",
            ErrorCode::EmbeddingFailed => "C012",
            ErrorCode::NoPointsGenerated => "C013",
            ErrorCode::IndexUnavailable => "C014",
            ErrorCode::IndexRequestFailed => "C015",
            ErrorCode::LlmTimeout => "C016",
            ErrorCode::LlmMalformedReply => "C017",
            ErrorCode::ConfigurationError => "C090",
            ErrorCode::SerializationError => "C091",
            ErrorCode::InternalError => "C099",

            ErrorCode::ChunkingFailed => "S003",
            ErrorCode::MaxTrialExceeded => "S004",
            ErrorCode::DeleteFailed => "S005",

            ErrorCode::NoSearchResult => "A005",
            ErrorCode::AnalysisFailed => "A006",
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },

    // Document errors
    #[error("PDF parse error: {message}")]
    PdfParse { message: String },

    #[error("OCR response parse error: {message}")]
    OcrParse { message: String },

    #[error("No text extracted from document")]
    NoTextExtracted,

    #[error("Chunking produced no clauses")]
    ChunkingFailed,

    // Embedding errors
    #[error("Embedding service error: {message}")]
    EmbeddingFailed { message: String },

    // Vector index errors
    #[error("Vector index unavailable: {message}")]
    IndexUnavailable { message: String },

    #[error("Vector index request failed: {message}")]
    IndexRequest { message: String },

    #[error("No reference points found in collection {collection}")]
    NoSearchResult { collection: String },

    #[error("No points generated for upload")]
    NoPointsGenerated,

    #[error("Delete failed: {message}")]
    DeleteFailed { message: String },

    // LLM errors
    #[error("LLM call timed out after {attempts} attempts ({timeout_ms}ms each)")]
    LlmTimeout { attempts: u32, timeout_ms: u64 },

    #[error("LLM reply rejected: {reason}")]
    LlmMalformedReply { reason: String },

    #[error("LLM reply still invalid after {attempts} attempts: {reason}")]
    MaxTrialExceeded { attempts: u32, reason: String },

    // Review errors
    #[error("Analysis failed: none of {clauses} clauses could be reviewed")]
    AnalysisFailed { clauses: usize },

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::UnsupportedFileType { .. } => ErrorCode::UnsupportedFileType,
            AppError::PdfParse { .. } => ErrorCode::PdfParseError,
            AppError::OcrParse { .. } => ErrorCode::OcrParseError,
            AppError::NoTextExtracted => ErrorCode::NoTextExtracted,
            AppError::ChunkingFailed => ErrorCode::ChunkingFailed,
            AppError::EmbeddingFailed { .. } => ErrorCode::EmbeddingFailed,
            AppError::IndexUnavailable { .. } => ErrorCode::IndexUnavailable,
            AppError::IndexRequest { .. } => ErrorCode::IndexRequestFailed,
            AppError::NoSearchResult { .. } => ErrorCode::NoSearchResult,
            AppError::NoPointsGenerated => ErrorCode::NoPointsGenerated,
            AppError::DeleteFailed { .. } => ErrorCode::DeleteFailed,
            AppError::LlmTimeout { .. } => ErrorCode::LlmTimeout,
            AppError::LlmMalformedReply { .. } => ErrorCode::LlmMalformedReply,
            AppError::MaxTrialExceeded { .. } => ErrorCode::MaxTrialExceeded,
            AppError::AnalysisFailed { .. } => ErrorCode::AnalysisFailed,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::HttpClient(_) => ErrorCode::IndexRequestFailed,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// HTTP status hint for a transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::UnsupportedFileType { .. } => 400,

            // 502 Bad Gateway
            AppError::EmbeddingFailed { .. }
            | AppError::IndexRequest { .. }
            | AppError::LlmMalformedReply { .. }
            | AppError::MaxTrialExceeded { .. }
            | AppError::HttpClient(_) => 502,

            // 503 Service Unavailable
            AppError::IndexUnavailable { .. } => 503,

            // 504 Gateway Timeout
            AppError::LlmTimeout { .. } => 504,

            // 500 Internal Server Error
            AppError::PdfParse { .. }
            | AppError::OcrParse { .. }
            | AppError::NoTextExtracted
            | AppError::ChunkingFailed
            | AppError::NoSearchResult { .. }
            | AppError::NoPointsGenerated
            | AppError::DeleteFailed { .. }
            | AppError::AnalysisFailed { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Internal { .. } => 500,
        }
    }

    /// Validation errors are surfaced immediately and never retried
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Transient infrastructure failures, distinct from validation errors
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::IndexUnavailable { .. } | AppError::LlmTimeout { .. } | AppError::HttpClient(_)
        )
    }

    /// Vector index connectivity or request failures
    pub fn is_index_failure(&self) -> bool {
        matches!(
            self,
            AppError::IndexUnavailable { .. } | AppError::IndexRequest { .. } | AppError::HttpClient(_)
        )
    }

    /// Build the structured error body for this error
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetails {
                code: self.code(),
                code_str: self.code().as_code().to_string(),
                message: self.to_string(),
                status: self.status_code(),
            },
        }
    }
}

/// Structured error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    #[serde(rename = "codeStr")]
    pub code_str: String,
    pub message: String,
    pub status: u16,
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::NoSearchResult {
            collection: "lease".into(),
        };
        assert_eq!(err.code(), ErrorCode::NoSearchResult);
        assert_eq!(err.code().as_code(), "A005");
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "category must not be empty".into(),
            field: Some("category_name".into()),
        };
        assert_eq!(err.status_code(), 400);
        assert!(err.is_client_error());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_timeout_is_distinct_from_malformed() {
        let timeout = AppError::LlmTimeout {
            attempts: 5,
            timeout_ms: 30_000,
        };
        let malformed = AppError::MaxTrialExceeded {
            attempts: 5,
            reason: "missing key violation_score".into(),
        };
        assert_ne!(timeout.code(), malformed.code());
        assert!(timeout.is_transient());
        assert!(!malformed.is_transient());
    }

    #[test]
    fn test_index_failures() {
        let outage = AppError::IndexUnavailable {
            message: "connection refused".into(),
        };
        assert!(outage.is_index_failure());
        assert!(AppError::IndexRequest { message: "bad filter".into() }.is_index_failure());
        assert!(!AppError::NoSearchResult { collection: "lease".into() }.is_index_failure());
        assert!(!AppError::LlmTimeout { attempts: 5, timeout_ms: 30_000 }.is_index_failure());
    }

    #[test]
    fn test_error_response_body() {
        let body = AppError::ChunkingFailed.to_response();
        assert_eq!(body.error.code_str, "S003");
        assert_eq!(body.error.status, 500);
    }
}
