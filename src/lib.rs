//! Codegraph QA
//!
//! Natural-language question answering over a code-analysis graph stored in
//! Neo4j. A question goes through a guarded, self-correcting Text-to-Cypher
//! pipeline: an LLM drafts a read-only Cypher query from the cached schema,
//! the database dry-runs it, failing drafts are corrected within a bounded
//! budget, and the rows are phrased back as an answer.
//!
//! # Layout
//!
//! - [`config`]: YAML + environment configuration
//! - [`llm`]: `LanguageModel` trait, HTTP providers and a scripted mock
//! - [`graph`]: `GraphDatabase` trait, Neo4j HTTP client and a scripted mock
//! - [`schema`]: schema rendering and the TTL / single-flight schema cache
//! - [`nlq`]: the pipeline stages and their orchestrator
//!
//! ## Example Usage
//!
//! ```rust
//! use codegraph_qa::graph::{mock::row, MockGraph};
//! use codegraph_qa::llm::MockLlm;
//! use codegraph_qa::schema::{GraphSchemaProvider, SchemaCacheManager};
//! use codegraph_qa::{NLQPipeline, PipelineConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let db = Arc::new(MockGraph::new().with_rows("AUTHORED", vec![row([("developer", json!("ada"))])]));
//! let llm = Arc::new(
//!     MockLlm::new()
//!         .on("guardrail system", "code")
//!         .on("Generate a Cypher query", "MATCH (d:Developer)-[:AUTHORED]->(:Commit) RETURN DISTINCT d.name AS developer ORDER BY developer LIMIT 10")
//!         .on("Helpful answer", "ada worked on it."),
//! );
//! let cache = SchemaCacheManager::new(
//!     Arc::new(GraphSchemaProvider::new(db.clone())),
//!     Duration::from_secs(300),
//!     Duration::from_secs(60),
//! );
//! let pipeline = NLQPipeline::new(llm, db, cache, PipelineConfig::default());
//!
//! let response = pipeline.run_pipeline("Who worked on Louvain?").await;
//! assert_eq!(response.answer, "ada worked on it.");
//! # }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod graph;
pub mod llm;
pub mod nlq;
pub mod schema;

// Re-export main types for convenience
pub use config::{
    AppConfig, ConfigError, ConfigResult, GraphConfig, LLMConfig, LLMProvider, PipelineConfig,
    SchemaCacheConfig,
};

pub use graph::{DbError, DbResult, GraphDatabase, Neo4jHttpClient, QueryOutcome, Row};

pub use llm::{CompletionRequest, LLMClient, LanguageModel, LlmError, LlmResult};

pub use schema::{
    GraphSchemaProvider, SchemaCacheManager, SchemaError, SchemaInfo, SchemaProvider,
    SchemaResult,
};

pub use nlq::{NLQError, NLQPipeline, NLQResult, PipelineResponse};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
