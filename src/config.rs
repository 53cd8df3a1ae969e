//! Configuration for the question-answering service
//!
//! Settings are plain serde records. They are loaded from an optional YAML
//! file and then overridden from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML for `AppConfig`
    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// An environment variable or field holds an unusable value
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    /// A required setting is absent
    #[error("Missing setting: {0}")]
    Missing(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Supported LLM providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LLMProvider {
    OpenAI,
    Ollama,
    Gemini,
    AzureOpenAI,
    Anthropic,
    /// Offline provider that answers every prompt with a fixed read-only query
    Mock,
}

impl LLMProvider {
    /// Default API base URL for this provider (empty where one must be supplied)
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "https://api.openai.com/v1",
            LLMProvider::Ollama => "http://localhost:11434",
            LLMProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            LLMProvider::AzureOpenAI => "",
            LLMProvider::Anthropic => "https://api.anthropic.com/v1",
            LLMProvider::Mock => "",
        }
    }

    /// Model used when none is configured; Azure has none because the
    /// deployment name must be given explicitly
    pub fn default_model(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "gpt-4o",
            LLMProvider::Ollama => "llama3",
            LLMProvider::Gemini => "gemini-1.5-flash",
            LLMProvider::AzureOpenAI => "",
            LLMProvider::Anthropic => "claude-3-5-sonnet-latest",
            LLMProvider::Mock => "mock",
        }
    }

    /// Whether calls to this provider need an API key
    pub fn requires_api_key(&self) -> bool {
        matches!(
            self,
            LLMProvider::OpenAI | LLMProvider::AzureOpenAI | LLMProvider::Gemini | LLMProvider::Anthropic
        )
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "ollama" => Ok(LLMProvider::Ollama),
            "gemini" => Ok(LLMProvider::Gemini),
            "azure" | "azureopenai" | "azure_openai" => Ok(LLMProvider::AzureOpenAI),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "mock" => Ok(LLMProvider::Mock),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration for the LLM collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    /// The LLM provider to use
    pub provider: LLMProvider,
    /// Model name (e.g., "gpt-4o", "llama3"); the deployment name on Azure.
    /// Empty means the provider default.
    pub model: String,
    /// API Key (optional, can be loaded from env if None)
    pub api_key: Option<String>,
    /// API Base URL (required for Azure, optional for others)
    pub api_base_url: Option<String>,
    /// Azure OpenAI API version
    pub api_version: String,
    /// HTTP timeout for a single completion
    pub timeout_seconds: u64,
}

impl LLMConfig {
    /// Configured model, or the provider default when unset
    pub fn resolved_model(&self) -> &str {
        match self.model.trim() {
            "" => self.provider.default_model(),
            model => model,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::AzureOpenAI,
            model: String::new(),
            api_key: None,
            api_base_url: None,
            api_version: "2024-12-01-preview".to_string(),
            timeout_seconds: 60,
        }
    }
}

/// Connection settings for the Neo4j HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub timeout_seconds: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:7474".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            database: "neo4j".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Schema cache timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaCacheConfig {
    /// How long a fetched schema stays fresh
    pub ttl_seconds: u64,
    /// Minimum spacing between reload attempts while a snapshot exists
    pub load_attempt_interval_seconds: u64,
}

impl Default for SchemaCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            load_attempt_interval_seconds: 60,
        }
    }
}

impl SchemaCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn load_attempt_interval(&self) -> Duration {
        Duration::from_secs(self.load_attempt_interval_seconds)
    }
}

/// Orchestrator policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Correct/validate cycles allowed before giving up on a question
    pub max_correction_attempts: usize,
    /// Stop off-topic questions before generation
    pub enforce_guardrails: bool,
    /// Rows handed to the answer synthesizer
    pub max_result_rows_in_prompt: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_correction_attempts: 2,
            enforce_guardrails: false,
            max_result_rows_in_prompt: 50,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub graph: GraphConfig,
    pub llm: LLMConfig,
    pub schema_cache: SchemaCacheConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Defaults overridden from the process environment
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load a YAML file; absent sections fall back to defaults
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: AppConfig = serde_yaml::from_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally `std::env::var`)
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NEO4J_URI") {
            self.graph.uri = v;
        }
        if let Some(v) = lookup("NEO4J_USER") {
            self.graph.user = v;
        }
        if let Some(v) = lookup("NEO4J_PASSWORD") {
            self.graph.password = v;
        }
        if let Some(v) = lookup("NEO4J_DATABASE") {
            self.graph.database = v;
        }

        if let Some(v) = lookup("LLM_PROVIDER") {
            self.llm.provider = v.parse()?;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("LLM_API_BASE_URL") {
            self.llm.api_base_url = Some(v);
        }

        // Azure variables win when the provider is Azure
        if self.llm.provider == LLMProvider::AzureOpenAI {
            if let Some(v) = lookup("AZURE_OPENAI_API_KEY") {
                self.llm.api_key = Some(v);
            }
            if let Some(v) = lookup("AZURE_OPENAI_ENDPOINT") {
                self.llm.api_base_url = Some(v);
            }
            if let Some(v) = lookup("AZURE_OPENAI_API_VERSION") {
                self.llm.api_version = v;
            }
            if let Some(v) = lookup("AZURE_OPENAI_DEPLOYMENT_NAME") {
                self.llm.model = v;
            }
        }

        if let Some(v) = lookup("SCHEMA_CACHE_TTL_SECONDS") {
            self.schema_cache.ttl_seconds = parse_value("SCHEMA_CACHE_TTL_SECONDS", &v)?;
        }
        if let Some(v) = lookup("MAX_CORRECTION_ATTEMPTS") {
            self.pipeline.max_correction_attempts = parse_value("MAX_CORRECTION_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("ENFORCE_GUARDRAILS") {
            self.pipeline.enforce_guardrails = parse_value("ENFORCE_GUARDRAILS", &v)?;
        }

        debug!(
            provider = ?self.llm.provider,
            api_key = if self.llm.api_key.is_some() { "set" } else { "not set" },
            endpoint = if self.llm.api_base_url.is_some() { "set" } else { "not set" },
            "LLM configuration resolved"
        );
        Ok(())
    }

    /// Reject settings that would only fail later at call time
    pub fn validate(&self) -> ConfigResult<()> {
        if self.schema_cache.ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "schema_cache.ttl_seconds".to_string(),
                value: "0".to_string(),
            });
        }
        if self.llm.provider.requires_api_key() && self.llm.api_key.is_none() {
            return Err(ConfigError::Missing(format!("API key for {:?}", self.llm.provider)));
        }
        if self.llm.provider == LLMProvider::AzureOpenAI {
            if self.llm.api_base_url.is_none() {
                return Err(ConfigError::Missing("AZURE_OPENAI_ENDPOINT".to_string()));
            }
            if self.llm.resolved_model().is_empty() {
                return Err(ConfigError::Missing("AZURE_OPENAI_DEPLOYMENT_NAME".to_string()));
            }
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
