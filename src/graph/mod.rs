//! Graph database collaborator
//!
//! The pipeline talks to the database only through `GraphDatabase`:
//! run a query, dry-run it with `EXPLAIN`, and introspect the schema.
//! Errors separate statements the database rejected (fixable by
//! rewriting the query) from a database that could not be reached.

pub mod mock;
pub mod neo4j;

use crate::schema::SchemaInfo;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

pub use mock::MockGraph;
pub use neo4j::Neo4jHttpClient;

/// Database errors
#[derive(Error, Debug, Clone)]
pub enum DbError {
    /// The statement was rejected (syntax, unknown function, type error)
    #[error("Query rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    /// The database could not be reached or refused the credentials
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database failed while running an otherwise valid statement
    #[error("Database error ({code}): {message}")]
    Database { code: String, message: String },

    /// The response could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    /// True when rewriting the query might help
    pub fn is_rejection(&self) -> bool {
        matches!(self, DbError::Rejected { .. })
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// One result row, keyed by column in projection order
pub type Row = IndexMap<String, serde_json::Value>;

/// Query parameters
pub type Params = BTreeMap<String, serde_json::Value>;

/// Rows plus the timing the driver reported
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryOutcome {
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub latency_ms: f64,
    pub available_after_ms: Option<u64>,
    pub consumed_after_ms: Option<u64>,
}

impl QueryOutcome {
    pub fn from_rows(rows: Vec<Row>, latency_ms: f64) -> Self {
        Self {
            row_count: rows.len(),
            rows,
            latency_ms,
            available_after_ms: None,
            consumed_after_ms: None,
        }
    }
}

/// Database access used by the pipeline.
///
/// Each call is an independent unit of work; connection pooling belongs to
/// the implementation.
#[async_trait]
pub trait GraphDatabase: Send + Sync {
    /// Run a Cypher statement
    async fn run_query(&self, query: &str, params: &Params) -> DbResult<QueryOutcome>;

    /// Plan the statement without producing rows
    async fn explain(&self, query: &str) -> DbResult<()> {
        self.run_query(&format!("EXPLAIN {}", query), &Params::new())
            .await
            .map(|_| ())
    }

    /// Enumerate labels, relationship types, patterns and properties
    async fn introspect_schema(&self) -> DbResult<SchemaInfo> {
        introspect_with_queries(self).await
    }

    /// Cheap connectivity check
    async fn ping(&self) -> DbResult<()> {
        self.run_query("RETURN 1 AS ok", &Params::new()).await.map(|_| ())
    }
}

pub(crate) const LABELS_QUERY: &str = "CALL db.labels() YIELD label RETURN label ORDER BY label";
pub(crate) const RELATIONSHIP_TYPES_QUERY: &str =
    "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType ORDER BY relationshipType";

fn escape_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn string_column(rows: &[Row], column: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get(column).and_then(|v| v.as_str()).map(str::to_string))
        .collect()
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Schema introspection built from plain queries.
///
/// A failed sub-query leaves a note in the result; the introspection fails
/// only when neither labels nor relationship types could be listed.
pub async fn introspect_with_queries<D>(db: &D) -> DbResult<SchemaInfo>
where
    D: GraphDatabase + ?Sized,
{
    let mut info = SchemaInfo::default();
    let params = Params::new();

    let labels = db.run_query(LABELS_QUERY, &params).await;
    let rel_types = db.run_query(RELATIONSHIP_TYPES_QUERY, &params).await;

    if let (Err(e), Err(_)) = (&labels, &rel_types) {
        return Err(e.clone());
    }

    match labels {
        Ok(outcome) => info.labels = string_column(&outcome.rows, "label"),
        Err(e) => {
            warn!("Could not fetch node labels: {}", e);
            info.notes.push("Error fetching node labels".to_string());
        }
    }

    match rel_types {
        Ok(outcome) => info.relationship_types = string_column(&outcome.rows, "relationshipType"),
        Err(e) => {
            warn!("Could not fetch relationship types: {}", e);
            info.notes.push("Error fetching relationship types".to_string());
        }
    }

    for rel_type in info.relationship_types.clone() {
        let query = format!(
            "MATCH (a)-[r:{}]->(b) RETURN labels(a) AS startLabels, labels(b) AS endLabels LIMIT 1",
            escape_identifier(&rel_type)
        );
        match db.run_query(&query, &params).await {
            Ok(outcome) => {
                if let Some(row) = outcome.rows.first() {
                    info.relationship_patterns.push(crate::schema::RelationshipPattern {
                        start_labels: string_list(row.get("startLabels")),
                        rel_type: rel_type.clone(),
                        end_labels: string_list(row.get("endLabels")),
                    });
                }
            }
            Err(e) => {
                warn!("Could not fetch relationship pattern for {}: {}", rel_type, e);
                info.notes.push(format!("Error fetching pattern for {}", rel_type));
            }
        }
    }

    for label in info.labels.clone() {
        let query = format!(
            "MATCH (n:{}) RETURN keys(n) AS properties LIMIT 1",
            escape_identifier(&label)
        );
        match db.run_query(&query, &params).await {
            Ok(outcome) => {
                let mut properties = string_list(outcome.rows.first().and_then(|r| r.get("properties")));
                if !properties.is_empty() {
                    properties.sort();
                    info.label_properties.insert(label, properties);
                }
            }
            Err(e) => {
                warn!("Could not fetch properties for {}: {}", label, e);
                info.notes.push(format!("{}: Error getting properties", label));
            }
        }
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let rejected = DbError::Rejected {
            code: "Neo.ClientError.Statement.SyntaxError".to_string(),
            message: "Invalid input".to_string(),
        };
        assert!(rejected.is_rejection());
        assert!(!DbError::Connection("refused".to_string()).is_rejection());
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("Method"), "`Method`");
        assert_eq!(escape_identifier("we`ird"), "`we``ird`");
    }
}
