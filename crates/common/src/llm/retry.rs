//! Bounded retry around LLM calls that must return a structured reply
//!
//! Each attempt runs under its own timeout. A reply that is not a JSON
//! object carrying every required key counts as a failed attempt. Between
//! attempts the orchestrator sleeps `backoff_step * attempt`.

use super::decode_json_reply;
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use serde_json::{Map, Value};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

/// Why the most recent attempt did not produce a usable reply
#[derive(Debug)]
enum AttemptFailure {
    Timeout,
    Malformed(String),
    Call(String),
}

/// Runs an LLM call until it yields a valid structured reply
#[derive(Debug, Clone)]
pub struct RetryOrchestrator {
    max_attempts: u32,
    attempt_timeout: Duration,
    backoff_step: Duration,
}

impl RetryOrchestrator {
    pub fn new(max_attempts: u32, attempt_timeout: Duration, backoff_step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            backoff_step,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_secs(config.timeout_secs),
            Duration::from_millis(config.backoff_step_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Call `call` up to `max_attempts` times.
    ///
    /// Returns the first decoded reply containing all `required_keys`.
    /// Exhaustion yields [`AppError::LlmTimeout`] when the last attempt
    /// timed out and [`AppError::MaxTrialExceeded`] otherwise. Client errors
    /// returned by `call` are surfaced immediately.
    pub async fn run<F, Fut>(&self, required_keys: &[&str], mut call: F) -> Result<Map<String, Value>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let mut last_failure = AttemptFailure::Call("no attempt made".to_string());

        for attempt in 1..=self.max_attempts {
            let started = Instant::now();
            let outcome = tokio::time::timeout(self.attempt_timeout, call()).await;
            let elapsed = started.elapsed().as_secs_f64();

            last_failure = match outcome {
                Err(_) => {
                    metrics::record_llm_attempt(elapsed, "timeout");
                    AttemptFailure::Timeout
                }
                Ok(Err(e)) if e.is_client_error() => return Err(e),
                Ok(Err(e)) => {
                    metrics::record_llm_attempt(elapsed, "error");
                    AttemptFailure::Call(e.to_string())
                }
                Ok(Ok(raw)) => match decode_json_reply(&raw, required_keys) {
                    Ok(map) => {
                        metrics::record_llm_attempt(elapsed, "success");
                        return Ok(map);
                    }
                    Err(e) => {
                        metrics::record_llm_attempt(elapsed, "malformed");
                        AttemptFailure::Malformed(e.to_string())
                    }
                },
            };

            warn!(
                attempt = attempt,
                max_attempts = self.max_attempts,
                failure = ?last_failure,
                "LLM attempt failed"
            );

            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff_step * attempt).await;
            }
        }

        Err(match last_failure {
            AttemptFailure::Timeout => AppError::LlmTimeout {
                attempts: self.max_attempts,
                timeout_ms: self.attempt_timeout.as_millis() as u64,
            },
            AttemptFailure::Malformed(reason) | AttemptFailure::Call(reason) => {
                AppError::MaxTrialExceeded {
                    attempts: self.max_attempts,
                    reason,
                }
            }
        })
    }
}
