use codegraph_qa::graph::{mock::row, MockGraph};
use codegraph_qa::llm::{LlmError, MockLlm};
use codegraph_qa::schema::{RelationshipPattern, SchemaInfo};
use codegraph_qa::{
    DbError, GraphSchemaProvider, LLMClient, LLMConfig, LLMProvider, NLQPipeline, PipelineConfig,
    SchemaCacheManager,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const GUARDRAIL: &str = "guardrail system";
const GENERATE: &str = "Generate a Cypher query";
const CORRECT: &str = "Corrected Cypher statement";
const ANSWER: &str = "Helpful answer";

const LOUVAIN_QUERY: &str = "MATCH (d:Developer)-[:AUTHORED]->(c:Commit) WHERE c.message CONTAINS 'Louvain' RETURN DISTINCT d.name AS developer ORDER BY developer LIMIT 50";

fn code_graph_schema() -> SchemaInfo {
    let mut label_properties = BTreeMap::new();
    label_properties.insert("Commit".to_string(), vec!["message".to_string(), "sha".to_string()]);
    label_properties.insert("Developer".to_string(), vec!["email".to_string(), "name".to_string()]);
    SchemaInfo {
        labels: vec!["Commit".to_string(), "Developer".to_string()],
        relationship_types: vec!["AUTHORED".to_string()],
        relationship_patterns: vec![RelationshipPattern {
            start_labels: vec!["Developer".to_string()],
            rel_type: "AUTHORED".to_string(),
            end_labels: vec!["Commit".to_string()],
        }],
        label_properties,
        notes: vec![],
    }
}

fn code_graph() -> MockGraph {
    MockGraph::new().with_schema(code_graph_schema()).with_rows(
        "AUTHORED",
        vec![
            row([("developer", json!("Ada Lovelace"))]),
            row([("developer", json!("Linus Torvalds"))]),
        ],
    )
}

fn pipeline_with(llm: Arc<MockLlm>, db: Arc<MockGraph>, config: PipelineConfig) -> NLQPipeline {
    let cache = SchemaCacheManager::new(
        Arc::new(GraphSchemaProvider::new(db.clone())),
        Duration::from_secs(300),
        Duration::from_secs(60),
    );
    NLQPipeline::new(llm, db, cache, config)
}

fn pipeline(llm: Arc<MockLlm>, db: Arc<MockGraph>) -> NLQPipeline {
    pipeline_with(llm, db, PipelineConfig::default())
}

#[tokio::test]
async fn test_valid_first_draft_goes_straight_through() {
    let llm = Arc::new(
        MockLlm::new()
            .on(GUARDRAIL, "code")
            .on(GENERATE, LOUVAIN_QUERY)
            .on(ANSWER, "Ada Lovelace and Linus Torvalds worked on Louvain."),
    );
    let db = Arc::new(code_graph());
    let response = pipeline(llm.clone(), db.clone()).run_pipeline("Who worked on Louvain?").await;

    assert_eq!(
        response.steps,
        vec!["guardrails", "generate_cypher", "validate_cypher", "execute_cypher", "generate_final_answer"]
    );
    assert!(response.generated_query.contains("MATCH"));
    assert!(response.generated_query.contains("RETURN"));
    assert_eq!(response.cypher_statement, response.generated_query);
    assert_eq!(response.answer, "Ada Lovelace and Linus Torvalds worked on Louvain.");
    assert_eq!(response.records_summary.as_deref(), Some("2 rows"));
    assert_eq!(response.execution.as_ref().map(|e| e.row_count), Some(2));
    assert_eq!(response.explanation, "Generated Cypher query for this analysis");

    assert_eq!(llm.call_count(CORRECT), 0);
    assert_eq!(db.executed(), vec![LOUVAIN_QUERY.to_string()]);

    // The generator saw the rendered schema
    let generate_call = llm
        .calls()
        .into_iter()
        .find(|c| c.user_message.contains(GENERATE))
        .unwrap();
    assert!(generate_call.user_message.contains("- (Developer) -[:AUTHORED]-> (Commit)"));
    assert!(generate_call.user_message.contains("Who worked on Louvain?"));

    // The synthesizer saw the rows
    let answer_call = llm.calls().into_iter().find(|c| c.user_message.contains(ANSWER)).unwrap();
    assert!(answer_call.user_message.contains("Linus Torvalds"));
}

#[tokio::test]
async fn test_missing_return_is_corrected_once() {
    let llm = Arc::new(
        MockLlm::new()
            .on(GUARDRAIL, "code")
            .on(GENERATE, "MATCH (d:Developer)-[:AUTHORED]->(c:Commit) WHERE c.message CONTAINS 'Louvain'")
            .on(CORRECT, LOUVAIN_QUERY)
            .on(ANSWER, "Ada Lovelace and Linus Torvalds."),
    );
    let db = Arc::new(code_graph());
    let response = pipeline(llm.clone(), db.clone()).run_pipeline("Who worked on Louvain?").await;

    assert_eq!(
        response.steps,
        vec![
            "guardrails",
            "generate_cypher",
            "validate_cypher",
            "correct_cypher",
            "validate_cypher",
            "execute_cypher",
            "generate_final_answer",
        ]
    );
    assert_eq!(response.steps.iter().filter(|s| *s == "correct_cypher").count(), 1);
    assert_eq!(response.generated_query, LOUVAIN_QUERY);
    assert_eq!(response.explanation, "Generated Cypher query for this analysis after 1 correction");

    let correct_call = llm.calls().into_iter().find(|c| c.user_message.contains(CORRECT)).unwrap();
    assert!(correct_call.user_message.contains("Query must contain a RETURN clause"));
    assert_eq!(db.executed(), vec![LOUVAIN_QUERY.to_string()]);
}

#[tokio::test]
async fn test_schema_unavailable_degrades_gracefully() {
    let llm = Arc::new(MockLlm::new().on(GUARDRAIL, "code").on(GENERATE, LOUVAIN_QUERY));
    let db = Arc::new(MockGraph::new());
    db.set_introspection_error(Some(DbError::Connection("connection refused".to_string())));

    let p = pipeline(llm.clone(), db.clone());
    let response = p.run_pipeline("Who worked on Louvain?").await;

    assert_eq!(response.steps, vec!["guardrails", "generate_cypher"]);
    assert!(response.answer.contains("currently unavailable"));
    assert!(response.explanation.contains("generate_cypher"));
    assert!(response.generated_query.is_empty());
    assert_eq!(llm.call_count(GENERATE), 0);
    assert_eq!(db.run_calls(), 0);
    assert!(p.schema_cache().get_schema().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_expired_schema_still_serves_when_reload_fails() {
    let llm = Arc::new(
        MockLlm::new()
            .on(GUARDRAIL, "code")
            .on(GENERATE, LOUVAIN_QUERY)
            .on(ANSWER, "Ada and Linus."),
    );
    let db = Arc::new(code_graph());
    let p = pipeline(llm, db.clone());

    let first = p.run_pipeline("Who worked on Louvain?").await;
    assert_eq!(first.answer, "Ada and Linus.");

    db.set_introspection_error(Some(DbError::Connection("connection reset".to_string())));
    tokio::time::advance(Duration::from_secs(301)).await;

    let second = p.run_pipeline("Who worked on Louvain?").await;
    assert_eq!(second.answer, "Ada and Linus.");
    assert_eq!(db.introspect_calls(), 2);
    assert_eq!(p.schema_cache().stats().load_failures, 1);
}

#[tokio::test]
async fn test_correction_budget_exhausted_never_executes() {
    let broken = "MATCH (d:Developer)-[:AUTHORED]->(c:Commit)";
    let llm = Arc::new(
        MockLlm::new()
            .on(GUARDRAIL, "code")
            .on(GENERATE, broken)
            .on(CORRECT, broken),
    );
    let db = Arc::new(code_graph());
    let response = pipeline(llm.clone(), db.clone()).run_pipeline("Who worked on Louvain?").await;

    assert_eq!(
        response.steps,
        vec![
            "guardrails",
            "generate_cypher",
            "validate_cypher",
            "correct_cypher",
            "validate_cypher",
            "correct_cypher",
            "validate_cypher",
        ]
    );
    assert!(response.answer.contains("unable to produce a valid query"));
    assert!(response.answer.contains("2 correction attempts"));
    assert_eq!(llm.call_count(CORRECT), 2);
    assert_eq!(db.run_calls(), 0);
    assert!(response.execution.is_none());
}

#[tokio::test]
async fn test_generation_failure_aborts() {
    let llm = Arc::new(
        MockLlm::new()
            .on(GUARDRAIL, "code")
            .fail_on(GENERATE, LlmError::NetworkError("timed out".to_string())),
    );
    let db = Arc::new(code_graph());
    let response = pipeline(llm, db.clone()).run_pipeline("Who worked on Louvain?").await;

    assert_eq!(response.steps, vec!["guardrails", "generate_cypher"]);
    assert_eq!(
        response.answer,
        "I processed your query but encountered some issues. Please try rephrasing your question."
    );
    assert!(response.explanation.contains("timed out"));
    assert_eq!(db.explain_calls(), 0);
    assert_eq!(db.run_calls(), 0);
}

#[tokio::test]
async fn test_syntax_rejection_feeds_correction() {
    let llm = Arc::new(
        MockLlm::new()
            .on(GUARDRAIL, "code")
            .on(GENERATE, "MATCH (d:Developer) RETRUN d.name")
            .on(CORRECT, LOUVAIN_QUERY)
            .on(ANSWER, "Ada and Linus."),
    );
    let db = Arc::new(code_graph().with_explain_error(
        "RETRUN",
        DbError::Rejected {
            code: "Neo.ClientError.Statement.SyntaxError".to_string(),
            message: "Invalid input 'RETRUN'".to_string(),
        },
    ));
    let response = pipeline(llm.clone(), db).run_pipeline("Who worked on Louvain?").await;

    assert!(response.steps.contains(&"correct_cypher".to_string()));
    assert_eq!(response.steps.last().map(String::as_str), Some("generate_final_answer"));
    let correct_call = llm.calls().into_iter().find(|c| c.user_message.contains(CORRECT)).unwrap();
    assert!(correct_call.user_message.contains("Syntax error"));
    assert!(correct_call.user_message.contains("RETRUN"));
}

#[tokio::test]
async fn test_unreachable_database_during_validation_is_fatal() {
    let llm = Arc::new(MockLlm::new().on(GUARDRAIL, "code").on(GENERATE, LOUVAIN_QUERY));
    let db = Arc::new(
        code_graph().with_explain_error("MATCH", DbError::Connection("connection refused".to_string())),
    );
    let response = pipeline(llm.clone(), db.clone()).run_pipeline("Who worked on Louvain?").await;

    assert_eq!(response.steps, vec!["guardrails", "generate_cypher", "validate_cypher"]);
    assert!(response.answer.contains("currently unavailable"));
    assert_eq!(llm.call_count(CORRECT), 0);
    assert_eq!(db.run_calls(), 0);
}

#[tokio::test]
async fn test_empty_result_and_runtime_failure_are_phrased_differently() {
    // No synthesis reply scripted, so the template answers are compared
    let llm = Arc::new(MockLlm::new().on(GUARDRAIL, "code").on(
        GENERATE,
        "MATCH (d:Developer) WHERE d.name CONTAINS 'nobody' RETURN d.name ORDER BY d.name LIMIT 5",
    ));
    let empty = pipeline(llm, Arc::new(code_graph())).run_pipeline("Who is nobody?").await;
    assert_eq!(empty.records_summary.as_deref(), Some("no results"));
    assert!(empty.answer.contains("couldn't find any relevant information"));

    let llm = Arc::new(MockLlm::new().on(GUARDRAIL, "code").on(GENERATE, LOUVAIN_QUERY));
    let db = Arc::new(code_graph_failing_at_runtime());
    let failed = pipeline(llm, db).run_pipeline("Who worked on Louvain?").await;
    assert_eq!(failed.records_summary.as_deref(), Some("execution error"));
    assert!(failed.answer.contains("could not be run"));
    assert_eq!(failed.steps.last().map(String::as_str), Some("generate_final_answer"));
}

fn code_graph_failing_at_runtime() -> MockGraph {
    MockGraph::new().with_schema(code_graph_schema()).with_query_error(
        "AUTHORED",
        DbError::Database {
            code: "Neo.TransientError.General.MemoryPoolOutOfMemoryError".to_string(),
            message: "out of memory".to_string(),
        },
    )
}

#[tokio::test]
async fn test_concurrent_questions_share_one_introspection() {
    let llm = Arc::new(
        MockLlm::new()
            .on(GUARDRAIL, "code")
            .on(GENERATE, LOUVAIN_QUERY)
            .on(ANSWER, "Ada and Linus."),
    );
    let db = Arc::new(code_graph().with_introspection_delay(Duration::from_millis(50)));
    let p = pipeline(llm, db.clone());

    let runs = (0..8).map(|i| {
        let p = &p;
        async move { p.run_pipeline(&format!("Who worked on Louvain? #{}", i)).await }
    });
    let responses = futures::future::join_all(runs).await;

    assert_eq!(db.introspect_calls(), 1);
    assert!(responses.iter().all(|r| r.answer == "Ada and Linus."));
    let mut run_ids: Vec<_> = responses.iter().map(|r| r.run_id.clone()).collect();
    run_ids.sort();
    run_ids.dedup();
    assert_eq!(run_ids.len(), 8);
}

#[tokio::test]
async fn test_response_serializes_to_json() {
    let llm = Arc::new(
        MockLlm::new()
            .on(GUARDRAIL, "code")
            .on(GENERATE, LOUVAIN_QUERY)
            .on(ANSWER, "Ada and Linus."),
    );
    let response = pipeline(llm, Arc::new(code_graph())).run_pipeline("Who worked on Louvain?").await;
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["answer"], json!("Ada and Linus."));
    assert_eq!(value["generated_query"], json!(LOUVAIN_QUERY));
    assert_eq!(value["steps"][0], json!("guardrails"));
    assert_eq!(value["execution"]["row_count"], json!(2));
}

#[tokio::test]
async fn test_mock_provider_pipeline() {
    let config = LLMConfig {
        provider: LLMProvider::Mock,
        model: "mock".to_string(),
        ..LLMConfig::default()
    };
    let llm = Arc::new(LLMClient::new(&config).unwrap());
    let db = Arc::new(code_graph());
    let cache = SchemaCacheManager::new(
        Arc::new(GraphSchemaProvider::new(db.clone())),
        Duration::from_secs(300),
        Duration::from_secs(60),
    );
    let p = NLQPipeline::new(llm, db, cache, PipelineConfig::default());

    let cypher = p.text_to_cypher("Show me nodes").await;
    assert_eq!(cypher.unwrap(), "MATCH (n) RETURN n LIMIT 10");

    let response = p.run_pipeline("Show me nodes").await;
    assert_eq!(response.steps.len(), 5);
    assert!(response.explanation.contains("ORDER BY"));
}
