//! Runs a validated statement

use crate::graph::{GraphDatabase, Params};
use crate::nlq::state::Records;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Observability figures for one execution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionMetrics {
    pub row_count: usize,
    pub latency_ms: f64,
    pub available_after_ms: Option<u64>,
    pub consumed_after_ms: Option<u64>,
}

pub struct QueryExecutor {
    db: Arc<dyn GraphDatabase>,
}

impl QueryExecutor {
    pub fn new(db: Arc<dyn GraphDatabase>) -> Self {
        Self { db }
    }

    /// Execute and normalize the outcome. Never fails: an empty result and
    /// a runtime failure come back as distinct `Records` variants.
    pub async fn execute(&self, query: &str) -> (Records, Option<ExecutionMetrics>) {
        match self.db.run_query(query, &Params::new()).await {
            Ok(outcome) => {
                let metrics = ExecutionMetrics {
                    row_count: outcome.row_count,
                    latency_ms: outcome.latency_ms,
                    available_after_ms: outcome.available_after_ms,
                    consumed_after_ms: outcome.consumed_after_ms,
                };
                info!(
                    row_count = metrics.row_count,
                    latency_ms = metrics.latency_ms,
                    "Query executed"
                );
                let records = if outcome.rows.is_empty() {
                    Records::NoResults
                } else {
                    Records::Rows(outcome.rows)
                };
                (records, Some(metrics))
            }
            Err(e) => {
                error!("Error executing Cypher query: {}", e);
                (Records::ExecutionError(e.to_string()), None)
            }
        }
    }
}
