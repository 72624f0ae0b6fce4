//! ClauseForge Common Library
//!
//! Shared code for the ClauseForge crates including:
//! - Document model (pages, clause fragments, aggregated clauses, bounding boxes)
//! - Embedding gateway and client abstraction
//! - Vector index contract and Qdrant client
//! - LLM chat client, reply decoding, and retry orchestration
//! - Error types, configuration, and metrics

pub mod config;
pub mod document;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod vector;

// Re-export commonly used types
pub use config::AppConfig;
pub use document::{AggregatedClause, BoundingBox, ClauseFragment, Page};
pub use embeddings::{Embedder, EmbeddingGateway};
pub use errors::{AppError, Result};
pub use llm::{ChatModel, RetryOrchestrator};
pub use vector::VectorIndex;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension (also the collection vector size)
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Separator placed between merged fragment contents of one clause
pub const CLAUSE_TEXT_SEPARATOR: &str = "!!!";
