//! Configuration management for ClauseForge
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Vector index (Qdrant) configuration
    #[serde(default)]
    pub vector_index: VectorIndexConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat-completion (LLM) configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Clause review configuration
    #[serde(default)]
    pub review: ReviewConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorIndexConfig {
    /// Qdrant REST URL
    #[serde(default = "default_index_url")]
    pub url: String,

    /// Optional API key
    pub api_key: Option<String>,

    /// Vector size used when a collection is created
    #[serde(default = "default_embedding_dimension")]
    pub vector_size: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,

    /// Total window for retrying transient connectivity failures
    #[serde(default = "default_index_retry_window")]
    pub retry_window_secs: u64,

    /// HNSW search breadth
    #[serde(default = "default_hnsw_ef")]
    pub hnsw_ef: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom or Azure endpoints)
    pub api_base: Option<String>,

    /// Model (or deployment) to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Expected embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Chat provider: openai, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Chat-completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key
    pub api_key: Option<String>,

    /// Model (or deployment) name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per call
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,

    /// Linear back-off step between attempts, in milliseconds
    #[serde(default = "default_backoff_step")]
    pub backoff_step_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewConfig {
    /// Scores below this are suppressed from the output
    #[serde(default = "default_violation_threshold")]
    pub violation_threshold: f64,

    /// Reference neighbours passed to the LLM
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Concurrent index queries / LLM calls
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Pages that get their own bounding-box list per clause
    #[serde(default = "default_max_tracked_pages")]
    pub max_tracked_pages: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingSettings {
    /// Minimum fragment length (chars) for contracts under review
    #[serde(default = "default_agreement_min_chars")]
    pub agreement_min_chars: usize,

    /// Minimum fragment length (chars) for reference documents
    #[serde(default = "default_standard_min_chars")]
    pub standard_min_chars: usize,

    /// Paragraph fallback chunk size, in tokens
    #[serde(default = "default_paragraph_tokens")]
    pub paragraph_tokens: usize,

    /// Paragraph fallback overlap, in tokens
    #[serde(default = "default_paragraph_overlap")]
    pub paragraph_overlap: usize,

    /// Fragments longer than this are not merged into an existing clause
    #[serde(default = "default_max_merge_chars")]
    pub max_merge_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_index_url() -> String { "http://localhost:6333".to_string() }
fn default_index_timeout() -> u64 { 10 }
fn default_index_retry_window() -> u64 { 15 }
fn default_hnsw_ef() -> u32 { 128 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_batch_size() -> usize { 32 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_temperature() -> f32 { 0.2 }
fn default_max_tokens() -> usize { 1024 }
fn default_llm_timeout() -> u64 { 30 }
fn default_llm_retries() -> u32 { 5 }
fn default_backoff_step() -> u64 { 500 }
fn default_violation_threshold() -> f64 { 0.75 }
fn default_top_k() -> usize { 5 }
fn default_max_concurrency() -> usize { 5 }
fn default_max_tracked_pages() -> usize { 2 }
fn default_agreement_min_chars() -> usize { 5 }
fn default_standard_min_chars() -> usize { 20 }
fn default_paragraph_tokens() -> usize { 300 }
fn default_paragraph_overlap() -> usize { 50 }
fn default_max_merge_chars() -> usize { 500 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "clauseforge".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__REVIEW__VIOLATION_THRESHOLD=0.6
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: AppConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: AppConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values that would make the pipeline misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.review.violation_threshold) {
            return Err(ConfigError::Message(format!(
                "review.violation_threshold must be within [0, 1], got {}",
                self.review.violation_threshold
            )));
        }
        if self.review.max_concurrency == 0 {
            return Err(ConfigError::Message(
                "review.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.llm.max_retries == 0 {
            return Err(ConfigError::Message(
                "llm.max_retries must be at least 1".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Message(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-attempt LLM timeout as Duration
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            url: default_index_url(),
            api_key: None,
            vector_size: default_embedding_dimension(),
            timeout_secs: default_index_timeout(),
            retry_window_secs: default_index_retry_window(),
            hnsw_ef: default_hnsw_ef(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
            backoff_step_ms: default_backoff_step(),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            violation_threshold: default_violation_threshold(),
            top_k: default_top_k(),
            max_concurrency: default_max_concurrency(),
            max_tracked_pages: default_max_tracked_pages(),
        }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            agreement_min_chars: default_agreement_min_chars(),
            standard_min_chars: default_standard_min_chars(),
            paragraph_tokens: default_paragraph_tokens(),
            paragraph_overlap: default_paragraph_overlap(),
            max_merge_chars: default_max_merge_chars(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: 0,
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            vector_index: VectorIndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            review: ReviewConfig::default(),
            chunking: ChunkingSettings::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.llm.max_retries, 5);
        assert_eq!(config.review.max_concurrency, 5);
        assert_eq!(config.llm_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut config = AppConfig::default();
        config.review.violation_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_source_uses_defaults() {
        let loaded: AppConfig = Config::builder()
            .set_override("review.violation_threshold", 0.6)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert!((loaded.review.violation_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(loaded.review.top_k, 5);
        assert_eq!(loaded.vector_index.url, "http://localhost:6333");
    }
}
