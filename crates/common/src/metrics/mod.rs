//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions.
//! Recording is a no-op until a recorder (e.g. the Prometheus exporter)
//! is installed by a binary.

use metrics::{counter, describe_counter, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all ClauseForge metrics
pub const METRICS_PREFIX: &str = "clauseforge";

/// Buckets for external calls (embedding, LLM, vector index) in seconds
pub const EXTERNAL_CALL_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Chunking metrics
    describe_counter!(
        format!("{}_fragments_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total clause fragments produced by chunking"
    );

    describe_counter!(
        format!("{}_clauses_aggregated_total", METRICS_PREFIX),
        Unit::Count,
        "Total aggregated clauses"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding batch requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding batch latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total failed embedding batches"
    );

    // Vector index metrics
    describe_counter!(
        format!("{}_index_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total vector index requests"
    );

    describe_histogram!(
        format!("{}_index_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Vector index request latency in seconds"
    );

    // LLM metrics
    describe_counter!(
        format!("{}_llm_attempts_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM attempts by outcome"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "LLM call latency in seconds"
    );

    // Review metrics
    describe_counter!(
        format!("{}_clauses_reviewed_total", METRICS_PREFIX),
        Unit::Count,
        "Total clauses reviewed by outcome"
    );

    describe_histogram!(
        format!("{}_review_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end document review latency in seconds"
    );

    // Standard ingestion metrics
    describe_counter!(
        format!("{}_standard_points_total", METRICS_PREFIX),
        Unit::Count,
        "Total reference points written to the index"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record chunking metrics
pub fn record_chunking(kind: &str, fragments: usize, clauses: usize) {
    counter!(
        format!("{}_fragments_created_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(fragments as u64);

    counter!(
        format!("{}_clauses_aggregated_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(clauses as u64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(batch_size as u64);
    }
}

/// Helper to record vector index metrics
pub fn record_index_request(duration_secs: f64, operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_index_requests_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_index_duration_seconds", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// Helper to record one LLM attempt
pub fn record_llm_attempt(duration_secs: f64, outcome: &str) {
    counter!(
        format!("{}_llm_attempts_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(format!("{}_llm_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record review outcomes for one document
pub fn record_review(duration_secs: f64, accepted: usize, suppressed: usize, failed: usize) {
    for (outcome, count) in [
        ("accepted", accepted),
        ("suppressed", suppressed),
        ("failed", failed),
    ] {
        counter!(
            format!("{}_clauses_reviewed_total", METRICS_PREFIX),
            "outcome" => outcome
        )
        .increment(count as u64);
    }

    histogram!(format!("{}_review_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    gauge!(format!("{}_last_review_accepted", METRICS_PREFIX)).set(accepted as f64);
}

/// Helper to record standard ingestion metrics
pub fn record_standard_points(category: &str, points: usize) {
    counter!(
        format!("{}_standard_points_total", METRICS_PREFIX),
        "category" => category.to_string()
    )
    .increment(points as u64);
}
