//! HTTP client for LLM providers

use crate::config::{LLMConfig, LLMProvider};
use crate::llm::{
    estimate_cost_usd, Completion, CompletionRequest, LanguageModel, LlmError, LlmResult, TokenUsage,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Response returned by the `Mock` provider for every prompt
pub const MOCK_COMPLETION: &str = "MATCH (n) RETURN n LIMIT 10";

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

pub struct LLMClient {
    client: Client,
    config: LLMConfig,
    api_base_url: String,
}

impl LLMClient {
    pub fn new(config: &LLMConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

        let api_base_url = config
            .api_base_url
            .clone()
            .unwrap_or_else(|| config.provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        if config.provider == LLMProvider::AzureOpenAI && api_base_url.is_empty() {
            return Err(LlmError::ConfigError("AzureOpenAI requires api_base_url".to_string()));
        }

        let mut config = config.clone();
        config.model = config.resolved_model().to_string();

        info!(
            provider = ?config.provider,
            model = %config.model,
            api_key = if config.api_key.is_some() { "set" } else { "not set" },
            "LLM client initialized"
        );

        Ok(Self {
            client,
            config,
            api_base_url,
        })
    }

    fn api_key(&self) -> LlmResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::ConfigError(format!("{:?} requires API key", self.config.provider)))
    }

    async fn dispatch(&self, request: &CompletionRequest) -> LlmResult<Completion> {
        match self.config.provider {
            LLMProvider::OpenAI => {
                let url = format!("{}/chat/completions", self.api_base_url);
                let auth = format!("Bearer {}", self.api_key()?);
                self.openai_chat(&url, ("Authorization", auth), true, request).await
            }
            LLMProvider::AzureOpenAI => {
                let url = format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    self.api_base_url, self.config.model, self.config.api_version
                );
                let key = self.api_key()?.to_string();
                self.openai_chat(&url, ("api-key", key), false, request).await
            }
            LLMProvider::Ollama => self.ollama_chat(request).await,
            LLMProvider::Gemini => self.gemini_chat(request).await,
            LLMProvider::Anthropic => self.anthropic_chat(request).await,
            LLMProvider::Mock => Ok(Completion::text(MOCK_COMPLETION)),
        }
    }

    /// OpenAI-compatible chat completions (also used for Azure deployments)
    async fn openai_chat(
        &self,
        url: &str,
        auth_header: (&str, String),
        send_model: bool,
        request: &CompletionRequest,
    ) -> LlmResult<Completion> {
        #[derive(Serialize)]
        struct Request<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            model: Option<&'a str>,
            messages: Vec<Message<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
            usage: Option<OpenAIUsage>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MessageContent,
        }

        #[derive(Deserialize)]
        struct MessageContent {
            content: Option<String>,
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(Message { role: "system", content: system });
        }
        messages.push(Message { role: "user", content: &request.user_message });

        let resp = self
            .client
            .post(url)
            .header(auth_header.0, auth_header.1)
            .json(&Request {
                model: send_model.then_some(self.config.model.as_str()),
                messages,
                temperature: request.temperature,
                max_tokens: request.max_tokens,
            })
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("{:?} error {}: {}", self.config.provider, status, body)));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| LlmError::SerializationError(e.to_string()))?;

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let usage = result.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        Ok(Completion { text, usage })
    }

    async fn ollama_chat(&self, request: &CompletionRequest) -> LlmResult<Completion> {
        #[derive(Serialize)]
        struct Options {
            temperature: f32,
            num_predict: u32,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            system: Option<&'a str>,
            stream: bool,
            options: Options,
        }

        #[derive(Deserialize)]
        struct Response {
            response: String,
            prompt_eval_count: Option<u32>,
            eval_count: Option<u32>,
        }

        let url = format!("{}/api/generate", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Request {
                model: &self.config.model,
                prompt: &request.user_message,
                system: request.system_prompt.as_deref(),
                stream: false,
                options: Options {
                    temperature: request.temperature,
                    num_predict: request.max_tokens,
                },
            })
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LlmError::ApiError(format!("Ollama error: {}", resp.status())));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| LlmError::SerializationError(e.to_string()))?;

        let usage = TokenUsage {
            prompt_tokens: result.prompt_eval_count,
            completion_tokens: result.eval_count,
            total_tokens: match (result.prompt_eval_count, result.eval_count) {
                (Some(p), Some(c)) => Some(p + c),
                _ => None,
            },
        };
        Ok(Completion { text: result.response, usage: Some(usage) })
    }

    async fn gemini_chat(&self, request: &CompletionRequest) -> LlmResult<Completion> {
        #[derive(Serialize)]
        struct Request {
            contents: Vec<Content>,
            #[serde(rename = "generationConfig")]
            generation_config: GenerationConfig,
        }

        #[derive(Serialize, Deserialize)]
        struct Content {
            role: Option<String>,
            parts: Vec<Part>,
        }

        #[derive(Serialize, Deserialize)]
        struct Part {
            text: String,
        }

        #[derive(Serialize)]
        struct GenerationConfig {
            temperature: f32,
            #[serde(rename = "maxOutputTokens")]
            max_output_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Response {
            candidates: Option<Vec<Candidate>>,
            #[serde(rename = "usageMetadata")]
            usage_metadata: Option<UsageMetadata>,
        }

        #[derive(Deserialize)]
        struct Candidate {
            content: Content,
        }

        #[derive(Deserialize)]
        struct UsageMetadata {
            #[serde(rename = "promptTokenCount")]
            prompt_token_count: Option<u32>,
            #[serde(rename = "candidatesTokenCount")]
            candidates_token_count: Option<u32>,
            #[serde(rename = "totalTokenCount")]
            total_token_count: Option<u32>,
        }

        let api_key = self.api_key()?;

        // v1beta has no dedicated system role on every endpoint, so prepend it
        let full_prompt = match request.system_prompt.as_deref() {
            Some(system) => format!("{}\n\n{}", system, request.user_message),
            None => request.user_message.clone(),
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base_url, self.config.model, api_key
        );

        let resp = self
            .client
            .post(&url)
            .json(&Request {
                contents: vec![Content {
                    role: Some("user".to_string()),
                    parts: vec![Part { text: full_prompt }],
                }],
                generation_config: GenerationConfig {
                    temperature: request.temperature,
                    max_output_tokens: request.max_tokens,
                },
            })
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("Gemini error: {}", text)));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| LlmError::SerializationError(e.to_string()))?;

        let text = result
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();
        let usage = result.usage_metadata.map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });
        Ok(Completion { text, usage })
    }

    async fn anthropic_chat(&self, request: &CompletionRequest) -> LlmResult<Completion> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            #[serde(skip_serializing_if = "Option::is_none")]
            system: Option<&'a str>,
            messages: Vec<Message<'a>>,
        }

        #[derive(Deserialize)]
        struct Response {
            content: Vec<Block>,
            usage: Option<Usage>,
        }

        #[derive(Deserialize)]
        struct Block {
            text: Option<String>,
        }

        #[derive(Deserialize)]
        struct Usage {
            input_tokens: Option<u32>,
            output_tokens: Option<u32>,
        }

        let api_key = self.api_key()?;
        let url = format!("{}/messages", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&Request {
                model: &self.config.model,
                max_tokens: request.max_tokens,
                temperature: request.temperature,
                system: request.system_prompt.as_deref(),
                messages: vec![Message { role: "user", content: &request.user_message }],
            })
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("Anthropic error: {}", text)));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| LlmError::SerializationError(e.to_string()))?;

        let text = result
            .content
            .into_iter()
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");
        let usage = result.usage.map(|u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: match (u.input_tokens, u.output_tokens) {
                (Some(i), Some(o)) => Some(i + o),
                _ => None,
            },
        });
        Ok(Completion { text, usage })
    }
}

#[async_trait]
impl LanguageModel for LLMClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<Completion> {
        let start = Instant::now();
        let completion = self.dispatch(request).await.map_err(|e| {
            error!(model = %self.config.model, "Error generating response: {}", e);
            e
        })?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let usage = completion.usage.unwrap_or_default();
        let cost = estimate_cost_usd(&self.config.model, &usage);
        info!(
            model = %self.config.model,
            latency_ms,
            prompt_tokens = ?usage.prompt_tokens,
            completion_tokens = ?usage.completion_tokens,
            total_tokens = ?usage.total_tokens,
            estimated_cost_usd = ?cost,
            "LLM metrics"
        );

        if completion.text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(Completion {
            text: completion.text.trim().to_string(),
            usage: completion.usage,
        })
    }
}
