use codegraph_qa::graph::{mock::row, MockGraph};
use codegraph_qa::llm::MockLlm;
use codegraph_qa::schema::{RelationshipPattern, SchemaInfo};
use codegraph_qa::{GraphSchemaProvider, NLQPipeline, PipelineConfig, PipelineResponse, SchemaCacheManager};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Offline walkthrough of the pipeline against scripted collaborators.
/// Use the `codegraph` CLI for a live Neo4j database and LLM.
#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("Codegraph QA v{}", codegraph_qa::version());
    println!("==========================================");
    println!();

    let db = Arc::new(demo_graph());
    let cache = SchemaCacheManager::new(
        Arc::new(GraphSchemaProvider::new(db.clone())),
        Duration::from_secs(300),
        Duration::from_secs(60),
    );
    cache.preload_schema().await;

    // Demo 1: valid on the first try
    println!("=== Demo 1: Direct answer ===");
    let llm = MockLlm::new()
        .on("guardrail system", "code")
        .on(
            "Generate a Cypher query",
            "MATCH (d:Developer)-[:AUTHORED]->(c:Commit) RETURN DISTINCT d.name AS developer, count(c) AS commits ORDER BY commits DESC LIMIT 10",
        )
        .on("Helpful answer", "Ada Lovelace (12 commits) and Linus Torvalds (4 commits) worked on Louvain.");
    let pipeline = NLQPipeline::new(Arc::new(llm), db.clone(), cache.clone(), PipelineConfig::default());
    print_response(&pipeline.run_pipeline("Who worked on Louvain?").await);

    // Demo 2: the first draft is missing RETURN and gets corrected
    println!("\n=== Demo 2: Self-correction ===");
    let llm = MockLlm::new()
        .on("guardrail system", "code")
        .on("Generate a Cypher query", "MATCH (d:Developer)-[:AUTHORED]->(c:Commit)")
        .on(
            "Corrected Cypher statement",
            "MATCH (d:Developer)-[:AUTHORED]->(c:Commit) RETURN d.name AS developer, count(c) AS commits ORDER BY commits DESC LIMIT 10",
        );
    // No synthesis reply scripted: the template answer is used
    let pipeline = NLQPipeline::new(Arc::new(llm), db.clone(), cache.clone(), PipelineConfig::default());
    print_response(&pipeline.run_pipeline("Who commits the most?").await);

    let stats = cache.stats();
    println!(
        "\nSchema cache: {} hit(s), {} load(s), {} failure(s)",
        stats.hits, stats.loads, stats.load_failures
    );
}

fn demo_graph() -> MockGraph {
    let mut label_properties = BTreeMap::new();
    label_properties.insert("Commit".to_string(), vec!["sha".to_string(), "message".to_string()]);
    label_properties.insert("Developer".to_string(), vec!["email".to_string(), "name".to_string()]);

    MockGraph::new()
        .with_schema(SchemaInfo {
            labels: vec!["Commit".to_string(), "Developer".to_string()],
            relationship_types: vec!["AUTHORED".to_string()],
            relationship_patterns: vec![RelationshipPattern {
                start_labels: vec!["Developer".to_string()],
                rel_type: "AUTHORED".to_string(),
                end_labels: vec!["Commit".to_string()],
            }],
            label_properties,
            notes: Vec::new(),
        })
        .with_rows(
            "AUTHORED",
            vec![
                row([("developer", json!("Ada Lovelace")), ("commits", json!(12))]),
                row([("developer", json!("Linus Torvalds")), ("commits", json!(4))]),
            ],
        )
}

fn print_response(response: &PipelineResponse) {
    println!("Answer:  {}", response.answer);
    println!("Query:   {}", response.generated_query);
    println!("Steps:   {}", response.steps.join(" → "));
    println!("Details: {}", response.explanation);
}
