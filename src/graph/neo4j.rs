//! Cypher over the Neo4j HTTP transactional API
//!
//! Every call is a single auto-commit transaction posted to
//! `{uri}/db/{database}/tx/commit`. Connection reuse is left to reqwest's pool.

use crate::config::GraphConfig;
use crate::graph::{DbError, DbResult, GraphDatabase, Params, QueryOutcome, Row};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error};

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: &'a Params,
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<DataRow>,
}

#[derive(Deserialize)]
struct DataRow {
    row: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

/// Map a Neo4j status code to the pipeline's error taxonomy
fn classify(code: String, message: String) -> DbError {
    if code.starts_with("Neo.ClientError.Security") {
        DbError::Connection(format!("{}: {}", code, message))
    } else if code.starts_with("Neo.ClientError") {
        DbError::Rejected { code, message }
    } else {
        DbError::Database { code, message }
    }
}

pub struct Neo4jHttpClient {
    commit_url: String,
    user: String,
    password: String,
    http_client: Client,
}

impl Neo4jHttpClient {
    /// Create a client for the configured endpoint and database.
    pub fn new(config: &GraphConfig) -> DbResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DbError::Connection(e.to_string()))?;

        Ok(Self {
            commit_url: format!(
                "{}/db/{}/tx/commit",
                config.uri.trim_end_matches('/'),
                config.database
            ),
            user: config.user.clone(),
            password: config.password.clone(),
            http_client,
        })
    }

    async fn post_statement(&self, query: &str, params: &Params) -> DbResult<Vec<Row>> {
        let body = CommitRequest {
            statements: vec![Statement { statement: query, parameters: params }],
        };

        let response = self
            .http_client
            .post(&self.commit_url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(DbError::Connection(format!(
                    "authentication failed ({})",
                    response.status()
                )));
            }
            status if !status.is_success() => {
                return Err(DbError::Connection(format!("Neo4j returned {}", status)));
            }
            _ => {}
        }

        let result: CommitResponse = response
            .json()
            .await
            .map_err(|e| DbError::Serialization(e.to_string()))?;

        if let Some(err) = result.errors.into_iter().next() {
            return Err(classify(err.code, err.message));
        }

        let rows = result
            .results
            .into_iter()
            .next()
            .map(|statement| {
                let columns = statement.columns;
                statement
                    .data
                    .into_iter()
                    .map(|data| columns.iter().cloned().zip(data.row).collect::<Row>())
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}

#[async_trait]
impl GraphDatabase for Neo4jHttpClient {
    async fn run_query(&self, query: &str, params: &Params) -> DbResult<QueryOutcome> {
        let start = Instant::now();
        let rows = self.post_statement(query, params).await.map_err(|e| {
            error!("Query execution failed: {}", e);
            e
        })?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(row_count = rows.len(), latency_ms, "Query executed");
        Ok(QueryOutcome::from_rows(rows, latency_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_codes() {
        let e = classify(
            "Neo.ClientError.Statement.SyntaxError".to_string(),
            "Invalid input 'RETRUN'".to_string(),
        );
        assert!(e.is_rejection());

        let e = classify("Neo.ClientError.Security.Unauthorized".to_string(), "nope".to_string());
        assert!(matches!(e, DbError::Connection(_)));

        let e = classify("Neo.TransientError.General.OutOfMemoryError".to_string(), "oom".to_string());
        assert!(matches!(e, DbError::Database { .. }));
    }

    #[test]
    fn test_commit_response_decoding() {
        let body = r#"{
            "results": [{"columns": ["name", "commits"], "data": [{"row": ["ada", 3], "meta": [null, null]}]}],
            "errors": []
        }"#;
        let parsed: CommitResponse = serde_json::from_str(body).unwrap();
        let statement = parsed.results.into_iter().next().unwrap();
        let row: Row = statement
            .columns
            .iter()
            .cloned()
            .zip(statement.data.into_iter().next().unwrap().row)
            .collect();
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["name", "commits"]);
        assert_eq!(row["commits"], serde_json::json!(3));
    }

    #[test]
    fn test_commit_url() {
        let client = Neo4jHttpClient::new(&GraphConfig {
            uri: "http://localhost:7474/".to_string(),
            ..GraphConfig::default()
        })
        .unwrap();
        assert_eq!(client.commit_url, "http://localhost:7474/db/neo4j/tx/commit");
    }
}
