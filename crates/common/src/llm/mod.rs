//! Chat-completion client abstraction
//!
//! - [`ChatModel`]: provider-agnostic trait returning the raw reply text
//! - [`OpenAIChatModel`]: OpenAI-compatible `chat/completions` client
//! - [`ScriptedChatModel`]: deterministic stand-in for tests and offline runs
//! - [`decode_json_reply`]: strict decoding of a reply into a JSON object

pub mod prompts;
pub mod retry;

pub use retry::RetryOrchestrator;

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One chat-completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl ChatRequest {
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            user: prompt.into(),
            temperature: 0.2,
            max_tokens: 1024,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

/// Trait for chat-completion providers
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send one request and return the raw reply text
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat client
pub struct OpenAIChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAIChatModel {
    pub fn new(endpoint: String, api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.user.clone(),
        });

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Internal {
                message: format!("LLM API request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatCompletionResponse =
            response.json().await.map_err(|e| AppError::Internal {
                message: format!("Failed to parse LLM response: {}", e),
            })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::LlmMalformedReply {
                reason: "empty response from LLM".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// What a [`ScriptedChatModel`] does on one call
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Return this text as the reply
    Reply(String),
    /// Fail the call with an internal error
    Fail(String),
    /// Sleep this long, then reply with the text
    Hang(Duration, String),
}

type Responder = dyn Fn(&ChatRequest, usize) -> ScriptStep + Send + Sync;

/// Chat model driven by a script, for tests and the `mock` provider
pub struct ScriptedChatModel {
    responder: Box<Responder>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedChatModel {
    /// Play `steps` in order; the last step repeats once the script runs out
    pub fn sequence(steps: Vec<ScriptStep>) -> Self {
        Self::from_fn(move |_, call| {
            steps
                .get(call)
                .or_else(|| steps.last())
                .cloned()
                .unwrap_or_else(|| ScriptStep::Fail("empty script".to_string()))
        })
    }

    /// Decide each step from the request and the zero-based call number
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest, usize) -> ScriptStep + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter, readable after the model is moved
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match (self.responder)(request, call) {
            ScriptStep::Reply(text) => Ok(text),
            ScriptStep::Fail(message) => Err(AppError::Internal { message }),
            ScriptStep::Hang(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Reply used by the `mock` provider: valid for both prompt kinds, never flags
const MOCK_REPLY: &str = r#"{"correctedText":"","proofText":"mock provider","violation_score":0.0,"incorrectPart":"","incorrect_text":"mock incorrect example","corrected_text":"mock corrected example"}"#;

/// Create a chat model based on configuration
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" | "azure" => {
            let key = config
                .api_key
                .clone()
                .ok_or_else(|| AppError::Configuration {
                    message: "llm.api_key is required for the openai provider".to_string(),
                })?;
            Ok(Arc::new(OpenAIChatModel::new(
                config.endpoint.clone(),
                key,
                config.model.clone(),
                Duration::from_secs(config.timeout_secs.saturating_add(5)),
            )?))
        }
        "mock" => Ok(Arc::new(ScriptedChatModel::sequence(vec![ScriptStep::Reply(
            MOCK_REPLY.to_string(),
        )]))),
        other => Err(AppError::Configuration {
            message: format!("unknown llm provider: {}", other),
        }),
    }
}

/// Decode a raw reply into a JSON object holding every required key.
///
/// Accepts the object alone or wrapped in a fenced code block. Raw line
/// breaks are flattened first since models sometimes emit them inside
/// string values.
pub fn decode_json_reply(raw: &str, required_keys: &[&str]) -> Result<Map<String, Value>> {
    let body = strip_code_fence(raw.trim()).replace(['\r', '\n'], " ");
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::LlmMalformedReply {
            reason: "empty reply".to_string(),
        });
    }

    let value: Value = serde_json::from_str(body).map_err(|e| AppError::LlmMalformedReply {
        reason: format!("invalid JSON: {}", e),
    })?;

    let Value::Object(map) = value else {
        return Err(AppError::LlmMalformedReply {
            reason: "reply is not a JSON object".to_string(),
        });
    };

    if let Some(missing) = required_keys.iter().find(|k| !map.contains_key(**k)) {
        return Err(AppError::LlmMalformedReply {
            reason: format!("missing key {}", missing),
        });
    }

    Ok(map)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
