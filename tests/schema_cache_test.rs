use codegraph_qa::graph::{mock::row, MockGraph};
use codegraph_qa::schema::{CacheState, GraphSchemaProvider, SchemaCacheManager};
use codegraph_qa::{DbError, SchemaCacheConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// A graph that answers the introspection queries themselves
fn introspectable_graph() -> MockGraph {
    MockGraph::new()
        .with_rows("db.labels()", vec![row([("label", json!("Developer"))]), row([("label", json!("File"))])])
        .with_rows(
            "db.relationshipTypes()",
            vec![row([("relationshipType", json!("AUTHORED"))]), row([("relationshipType", json!("IMPORTS"))])],
        )
        .with_rows(
            "[r:`AUTHORED`]",
            vec![row([("startLabels", json!(["Developer"])), ("endLabels", json!(["Commit"]))])],
        )
        .with_query_error("[r:`IMPORTS`]", DbError::Connection("reset".to_string()))
        .with_rows("(n:`Developer`)", vec![row([("properties", json!(["name", "email"]))])])
        .with_rows("(n:`File`)", vec![row([("properties", json!(["path", "total_lines"]))])])
}

fn cache_over(db: Arc<MockGraph>) -> SchemaCacheManager {
    SchemaCacheManager::from_config(
        Arc::new(GraphSchemaProvider::new(db)),
        &SchemaCacheConfig::default(),
    )
}

#[tokio::test]
async fn test_introspected_schema_text() {
    let db = Arc::new(introspectable_graph());
    let cache = cache_over(db.clone());

    let text = cache.get_schema().await.unwrap();
    assert!(text.starts_with("DATABASE SCHEMA:"));
    assert!(text.contains("NODE LABELS:\n- Developer\n- File\n"));
    assert!(text.contains("- (Developer) -[:AUTHORED]-> (Commit)"));
    assert!(text.contains("File:\n  - path\n  - total_lines\n"));
    assert!(text.contains("Developer:\n  - email\n  - name\n"));
    // The failed pattern lookup is noted, not fatal
    assert!(text.contains("INTROSPECTION NOTES:"));
    assert!(text.contains("EXAMPLE QUERIES:"));

    // Served from cache afterwards
    let again = cache.get_schema().await.unwrap();
    assert_eq!(again, text);
    assert_eq!(db.introspect_calls(), 1);
    assert_eq!(cache.stats().hits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_status_lifecycle() {
    let db = Arc::new(introspectable_graph());
    let cache = cache_over(db.clone());
    assert_eq!(cache.status().state, CacheState::NoCache);

    cache.preload_schema().await;
    let status = cache.status();
    assert_eq!(status.state, CacheState::Valid);
    assert_eq!(status.ttl_seconds, 300);
    assert!(status.schema_length.unwrap() > 0);
    assert!(status.created_at.is_some());

    tokio::time::advance(Duration::from_secs(301)).await;
    assert_eq!(cache.status().state, CacheState::Expired);

    // Expired and outside the rate-limit window: a read reloads
    cache.get_schema().await.unwrap();
    assert_eq!(db.introspect_calls(), 2);
    assert_eq!(cache.status().state, CacheState::Valid);

    cache.invalidate();
    assert_eq!(cache.status().state, CacheState::NoCache);
    cache.get_schema().await.unwrap();
    assert_eq!(db.introspect_calls(), 3);
}

#[tokio::test]
async fn test_spawned_preload_failure_is_not_fatal() {
    let db = Arc::new(MockGraph::new());
    db.set_introspection_error(Some(DbError::Connection("connection refused".to_string())));
    let cache = cache_over(db.clone());

    cache.spawn_preload().await.unwrap();
    assert_eq!(cache.status().state, CacheState::NoCache);
    assert_eq!(cache.stats().load_failures, 1);

    // The database comes back; the next read succeeds despite the recent attempt
    db.set_introspection_error(None);
    assert!(cache.get_schema().await.is_ok());
}
