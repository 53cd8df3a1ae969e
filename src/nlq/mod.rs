//! Natural Language Querying (NLQ)
//!
//! Text-to-Cypher question answering: a guarded, self-correcting pipeline
//! that turns a question into a validated read-only query, runs it, and
//! phrases the rows as an answer.

pub mod corrector;
pub mod executor;
pub mod generator;
pub mod guardrails;
pub mod pipeline;
pub mod prompts;
pub mod state;
pub mod synthesizer;
pub mod validator;

use crate::config::ConfigError;
use crate::graph::DbError;
use crate::llm::LlmError;
use crate::schema::SchemaError;
use serde::Serialize;
use thiserror::Error;

pub use corrector::QueryCorrector;
pub use executor::{ExecutionMetrics, QueryExecutor};
pub use generator::{extract_cypher, QueryGenerator};
pub use guardrails::{Guardrail, GuardrailVerdict};
pub use pipeline::NLQPipeline;
pub use state::{NextAction, PipelineState, Records, Step, ValidationOutcome};
pub use synthesizer::AnswerSynthesizer;
pub use validator::QueryValidator;

#[derive(Error, Debug)]
pub enum NLQError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Question is outside the code analysis domain")]
    OffTopic,
    #[error("No valid query after {attempts} correction attempt(s): {}", errors.join("; "))]
    CorrectionExhausted { attempts: usize, errors: Vec<String> },
}

pub type NLQResult<T> = Result<T, NLQError>;

/// What a caller of the pipeline receives; always well formed
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResponse {
    pub run_id: String,
    pub answer: String,
    pub cypher_statement: String,
    pub generated_query: String,
    pub explanation: String,
    /// Stages visited, in order
    pub steps: Vec<String>,
    pub warnings: Vec<String>,
    pub records_summary: Option<String>,
    pub execution: Option<ExecutionMetrics>,
}
