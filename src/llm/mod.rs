//! LLM collaborator
//!
//! A single `complete` call is the only thing the pipeline needs from a
//! language model. `LLMClient` speaks the HTTP APIs of the supported
//! providers; `MockLlm` is an in-process stand-in for tests and demos.

pub mod client;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::LLMClient;
pub use mock::MockLlm;

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("LLM API error: {0}")]
    ApiError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

pub type LlmResult<T> = Result<T, LlmError>;

/// One prompt sent to a model
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub user_message: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            user_message: user_message.into(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Model output plus whatever usage the provider reported
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), usage: None }
    }
}

/// Anything that can turn a prompt into text.
///
/// Failures are errors, never empty strings.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Name used in logs and cost estimates
    fn model_name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<Completion>;
}

/// Approximate USD per 1K tokens (input, output)
const PRICING_PER_1K: &[(&str, f64, f64)] = &[
    // Longer names first so "gpt-4o-mini" is not priced as "gpt-4o"
    ("gpt-4o-mini", 0.150, 0.600),
    ("gpt-4o", 5.00, 15.00),
    ("gpt-4-turbo", 10.00, 30.00),
    ("gpt-4", 30.00, 60.00),
    ("gpt-35-turbo", 0.50, 1.50),
];

/// Best-effort cost estimate; `None` for unknown models or missing usage
pub fn estimate_cost_usd(model: &str, usage: &TokenUsage) -> Option<f64> {
    if usage.prompt_tokens.is_none() && usage.completion_tokens.is_none() {
        return None;
    }
    let lower = model.to_lowercase();
    let (_, input, output) = PRICING_PER_1K.iter().find(|(name, _, _)| lower.contains(name))?;
    let prompt = usage.prompt_tokens.unwrap_or(0) as f64 / 1000.0 * input;
    let completion = usage.completion_tokens.unwrap_or(0) as f64 / 1000.0 * output;
    Some(prompt + completion)
}
