//! Pipeline orchestrator
//!
//! Drives one question through
//! `guardrails → generate_cypher → validate_cypher ⇄ correct_cypher →
//! execute_cypher → generate_final_answer`. Every stage failure is turned
//! into a degraded answer here; nothing escapes `run_pipeline`.

use crate::config::{AppConfig, PipelineConfig};
use crate::graph::{GraphDatabase, Neo4jHttpClient};
use crate::llm::{LLMClient, LanguageModel};
use crate::nlq::executor::ExecutionMetrics;
use crate::nlq::state::{NextAction, PipelineState, Step};
use crate::nlq::{
    AnswerSynthesizer, Guardrail, GuardrailVerdict, NLQError, NLQResult, PipelineResponse,
    QueryCorrector, QueryExecutor, QueryGenerator, QueryValidator,
};
use crate::schema::{GraphSchemaProvider, SchemaCacheManager};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

const ISSUES_ANSWER: &str =
    "I processed your query but encountered some issues. Please try rephrasing your question.";

/// Question-answering pipeline.
///
/// Collaborators are injected; one instance serves any number of
/// concurrent questions, each with its own `PipelineState`.
pub struct NLQPipeline {
    schema_cache: SchemaCacheManager,
    config: PipelineConfig,
    guardrail: Guardrail,
    generator: QueryGenerator,
    validator: QueryValidator,
    corrector: QueryCorrector,
    executor: QueryExecutor,
    synthesizer: AnswerSynthesizer,
}

impl NLQPipeline {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        db: Arc<dyn GraphDatabase>,
        schema_cache: SchemaCacheManager,
        config: PipelineConfig,
    ) -> Self {
        Self {
            guardrail: Guardrail::new(llm.clone()),
            generator: QueryGenerator::new(llm.clone()),
            validator: QueryValidator::new(db.clone()),
            corrector: QueryCorrector::new(llm.clone()),
            executor: QueryExecutor::new(db),
            synthesizer: AnswerSynthesizer::new(llm, config.max_result_rows_in_prompt),
            schema_cache,
            config,
        }
    }

    /// Wire the HTTP-backed LLM and Neo4j clients from configuration
    pub fn from_config(config: &AppConfig) -> NLQResult<Self> {
        config.validate()?;
        let llm: Arc<dyn LanguageModel> = Arc::new(LLMClient::new(&config.llm)?);
        let db: Arc<dyn GraphDatabase> = Arc::new(Neo4jHttpClient::new(&config.graph)?);
        let provider = Arc::new(GraphSchemaProvider::new(db.clone()));
        let schema_cache = SchemaCacheManager::from_config(provider, &config.schema_cache);
        Ok(Self::new(llm, db, schema_cache, config.pipeline.clone()))
    }

    pub fn schema_cache(&self) -> &SchemaCacheManager {
        &self.schema_cache
    }

    /// Answer a question. Never fails; degraded runs carry an explanatory
    /// answer and a truthful step trace.
    pub async fn run_pipeline(&self, question: &str) -> PipelineResponse {
        let run_id = Uuid::new_v4();
        let span = info_span!("nlq_pipeline", %run_id, question = %question);
        self.run(run_id, question).instrument(span).await
    }

    /// Generate a validated query without running it
    pub async fn text_to_cypher(&self, question: &str) -> NLQResult<String> {
        let mut state = PipelineState::new(question);
        check_question(&state)?;
        self.resolve_query(&mut state)
            .instrument(info_span!("text_to_cypher", question = %question))
            .await?;
        Ok(state.cypher_statement)
    }

    async fn run(&self, run_id: Uuid, question: &str) -> PipelineResponse {
        let started = Instant::now();
        let mut state = PipelineState::new(question);
        let mut execution = None;

        let response = match self.drive(&mut state, &mut execution).await {
            Ok(answer) => completed(run_id, &state, answer, execution),
            Err(e) => {
                warn!(error = %e, "Pipeline aborted");
                aborted(run_id, &state, &e)
            }
        };
        info!(
            steps = ?response.steps,
            corrections = state.correction_attempts,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Pipeline finished"
        );
        response
    }

    async fn drive(
        &self,
        state: &mut PipelineState,
        execution: &mut Option<ExecutionMetrics>,
    ) -> NLQResult<String> {
        check_question(state)?;

        state.enter(Step::Guardrails);
        if self.guardrail.check(state.question()).await == GuardrailVerdict::OffTopic {
            if self.config.enforce_guardrails {
                return Err(NLQError::OffTopic);
            }
            info!("Question looks off-topic; continuing");
        }

        self.resolve_query(state).await?;

        state.enter(Step::ExecuteCypher);
        let (records, metrics) = self.executor.execute(&state.cypher_statement).await;
        *execution = metrics;

        state.enter(Step::GenerateFinalAnswer);
        let answer = self.synthesizer.synthesize(state.question(), &records).await;
        state.records = Some(records);
        state.next_action = NextAction::End;
        Ok(answer)
    }

    /// Generate, then validate and correct until the candidate passes or
    /// the correction budget is spent. Leaves `next_action` at `Execute`.
    async fn resolve_query(&self, state: &mut PipelineState) -> NLQResult<()> {
        loop {
            match state.next_action {
                NextAction::Generate => {
                    state.enter(Step::GenerateCypher);
                    let schema = self.schema_cache.get_schema().await?;
                    let cypher = self.generator.generate(state.question(), &schema).await?;
                    state.set_candidate(cypher);
                }
                NextAction::Validate => {
                    state.enter(Step::ValidateCypher);
                    let outcome = self.validator.validate(&state.cypher_statement).await?;
                    state.apply_validation(outcome);
                    if state.next_action == NextAction::Correct
                        && state.correction_attempts >= self.config.max_correction_attempts
                    {
                        return Err(NLQError::CorrectionExhausted {
                            attempts: state.correction_attempts,
                            errors: state.errors.clone(),
                        });
                    }
                }
                NextAction::Correct => {
                    state.enter(Step::CorrectCypher);
                    state.correction_attempts += 1;
                    info!(attempt = state.correction_attempts, errors = ?state.errors, "Correcting query");
                    let schema = self.schema_cache.get_schema().await?;
                    let corrected = self
                        .corrector
                        .correct(
                            state.question(),
                            &state.cypher_statement,
                            &state.errors,
                            &state.warnings,
                            &schema,
                        )
                        .await?;
                    state.set_candidate(corrected);
                }
                NextAction::Execute | NextAction::End => return Ok(()),
            }
        }
    }
}

fn check_question(state: &PipelineState) -> NLQResult<()> {
    if state.question().trim().is_empty() {
        return Err(NLQError::ValidationError("question is empty".to_string()));
    }
    Ok(())
}

fn step_names(state: &PipelineState) -> Vec<String> {
    state.steps().iter().map(|s| s.as_str().to_string()).collect()
}

fn completed(
    run_id: Uuid,
    state: &PipelineState,
    answer: String,
    execution: Option<ExecutionMetrics>,
) -> PipelineResponse {
    let mut explanation = String::from("Generated Cypher query for this analysis");
    match state.correction_attempts {
        0 => {}
        1 => explanation.push_str(" after 1 correction"),
        n => explanation.push_str(&format!(" after {} corrections", n)),
    }
    if !state.warnings.is_empty() {
        explanation.push_str(&format!("; advisories: {}", state.warnings.join("; ")));
    }

    PipelineResponse {
        run_id: run_id.to_string(),
        answer,
        cypher_statement: state.cypher_statement.clone(),
        generated_query: state.cypher_statement.clone(),
        explanation,
        steps: step_names(state),
        warnings: state.warnings.clone(),
        records_summary: state.records.as_ref().map(|r| r.summary()),
        execution,
    }
}

fn aborted(run_id: Uuid, state: &PipelineState, error: &NLQError) -> PipelineResponse {
    let answer = match error {
        NLQError::OffTopic => "I can only answer questions about the analyzed codebase, such as its \
code structure, dependencies, vulnerabilities and developers."
            .to_string(),
        NLQError::ValidationError(_) => "Please ask a question about the codebase.".to_string(),
        NLQError::CorrectionExhausted { attempts, .. } => format!(
            "I was unable to produce a valid query for your question after {} correction attempt{}. \
Please try rephrasing it.",
            attempts,
            if *attempts == 1 { "" } else { "s" }
        ),
        NLQError::Schema(_) | NLQError::Database(_) => "The code graph database is currently \
unavailable, so I couldn't answer your question. Please try again later."
            .to_string(),
        NLQError::Llm(_) | NLQError::Config(_) => ISSUES_ANSWER.to_string(),
    };
    let stage = state.steps().last().map(|s| s.as_str()).unwrap_or("start");

    PipelineResponse {
        run_id: run_id.to_string(),
        answer,
        cypher_statement: state.cypher_statement.clone(),
        generated_query: state.cypher_statement.clone(),
        explanation: format!("Workflow stopped at step {}: {}", stage, error),
        steps: step_names(state),
        warnings: state.warnings.clone(),
        records_summary: None,
        execution: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MockGraph;
    use crate::llm::{LlmError, MockLlm};
    use crate::schema::{SchemaInfo, SchemaProvider, SchemaResult};
    use async_trait::async_trait;
    use std::time::Duration;

    struct StaticSchema;

    #[async_trait]
    impl SchemaProvider for StaticSchema {
        async fn fetch_schema(&self) -> SchemaResult<SchemaInfo> {
            Ok(SchemaInfo {
                labels: vec!["Developer".to_string()],
                ..SchemaInfo::default()
            })
        }
    }

    fn pipeline(llm: MockLlm, config: PipelineConfig) -> NLQPipeline {
        let cache = SchemaCacheManager::new(
            Arc::new(StaticSchema),
            Duration::from_secs(300),
            Duration::from_secs(60),
        );
        NLQPipeline::new(Arc::new(llm), Arc::new(MockGraph::new()), cache, config)
    }

    #[tokio::test]
    async fn test_empty_question() {
        let p = pipeline(MockLlm::new(), PipelineConfig::default());
        let response = p.run_pipeline("   ").await;
        assert!(response.steps.is_empty());
        assert_eq!(response.answer, "Please ask a question about the codebase.");
    }

    #[tokio::test]
    async fn test_enforced_guardrail_stops_off_topic() {
        let llm = MockLlm::new().on("guardrail system", "other");
        let config = PipelineConfig {
            enforce_guardrails: true,
            ..PipelineConfig::default()
        };
        let response = pipeline(llm, config).run_pipeline("What's the weather in Paris?").await;
        assert_eq!(response.steps, vec!["guardrails"]);
        assert!(response.answer.contains("only answer questions about the analyzed codebase"));
    }

    #[tokio::test]
    async fn test_advisory_guardrail_continues() {
        let llm = MockLlm::new()
            .on("guardrail system", "other")
            .on(
                "Generate a Cypher query",
                "MATCH (d:Developer) RETURN DISTINCT d.name AS name ORDER BY name LIMIT 5",
            )
            .on("Helpful answer", "No developers found.");
        let response = pipeline(llm, PipelineConfig::default()).run_pipeline("Tell me a joke").await;
        assert_eq!(response.steps.last().map(String::as_str), Some("generate_final_answer"));
        assert_eq!(response.records_summary.as_deref(), Some("no results"));
    }

    #[tokio::test]
    async fn test_zero_budget_never_corrects() {
        let llm = MockLlm::new()
            .on("guardrail system", "code")
            .on("Generate a Cypher query", "MATCH (d:Developer)");
        let config = PipelineConfig {
            max_correction_attempts: 0,
            ..PipelineConfig::default()
        };
        let response = pipeline(llm, config).run_pipeline("List developers").await;
        assert_eq!(response.steps, vec!["guardrails", "generate_cypher", "validate_cypher"]);
        assert!(response.answer.contains("unable to produce a valid query"));
    }

    #[tokio::test]
    async fn test_text_to_cypher() {
        let llm = MockLlm::new().on(
            "Generate a Cypher query",
            "```cypher\nMATCH (d:Developer) RETURN DISTINCT d.name ORDER BY d.name LIMIT 5\n```",
        );
        let p = pipeline(llm, PipelineConfig::default());
        let cypher = p.text_to_cypher("List developers").await.unwrap();
        assert_eq!(cypher, "MATCH (d:Developer) RETURN DISTINCT d.name ORDER BY d.name LIMIT 5");

        let llm = MockLlm::new().fail_on("Generate a Cypher query", LlmError::ApiError("down".to_string()));
        let p = pipeline(llm, PipelineConfig::default());
        assert!(matches!(p.text_to_cypher("List developers").await, Err(NLQError::Llm(_))));
    }
}
