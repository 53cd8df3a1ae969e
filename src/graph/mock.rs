//! Scripted in-process database for tests and demos

use crate::graph::{
    introspect_with_queries, DbError, DbResult, GraphDatabase, Params, QueryOutcome, Row,
};
use crate::schema::SchemaInfo;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Build a row from `(column, value)` pairs
pub fn row<I, K>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, serde_json::Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Database double.
///
/// Queries are answered by the first rule whose marker occurs in the query
/// text; unmatched queries return no rows. `EXPLAIN` succeeds unless an
/// explain rule matches.
pub struct MockGraph {
    query_rules: Mutex<Vec<(String, DbResult<Vec<Row>>)>>,
    explain_rules: Mutex<Vec<(String, DbError)>>,
    schema: Mutex<Option<SchemaInfo>>,
    introspection_error: Mutex<Option<DbError>>,
    introspection_delay: Option<Duration>,
    run_calls: AtomicUsize,
    explain_calls: AtomicUsize,
    introspect_calls: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

impl MockGraph {
    pub fn new() -> Self {
        Self {
            query_rules: Mutex::new(Vec::new()),
            explain_rules: Mutex::new(Vec::new()),
            schema: Mutex::new(None),
            introspection_error: Mutex::new(None),
            introspection_delay: None,
            run_calls: AtomicUsize::new(0),
            explain_calls: AtomicUsize::new(0),
            introspect_calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Answer queries containing `marker` with `rows`
    pub fn with_rows(self, marker: &str, rows: Vec<Row>) -> Self {
        lock(&self.query_rules).push((marker.to_string(), Ok(rows)));
        self
    }

    /// Fail queries containing `marker` at run time
    pub fn with_query_error(self, marker: &str, error: DbError) -> Self {
        lock(&self.query_rules).push((marker.to_string(), Err(error)));
        self
    }

    /// Fail `EXPLAIN` for queries containing `marker`
    pub fn with_explain_error(self, marker: &str, error: DbError) -> Self {
        lock(&self.explain_rules).push((marker.to_string(), error));
        self
    }

    /// Serve this schema from `introspect_schema` instead of running queries
    pub fn with_schema(self, schema: SchemaInfo) -> Self {
        *lock(&self.schema) = Some(schema);
        self
    }

    /// Delay every introspection, to widen concurrency windows
    pub fn with_introspection_delay(mut self, delay: Duration) -> Self {
        self.introspection_delay = Some(delay);
        self
    }

    /// Make subsequent introspections fail (or succeed again with `None`)
    pub fn set_introspection_error(&self, error: Option<DbError>) {
        *lock(&self.introspection_error) = error;
    }

    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn explain_calls(&self) -> usize {
        self.explain_calls.load(Ordering::SeqCst)
    }

    pub fn introspect_calls(&self) -> usize {
        self.introspect_calls.load(Ordering::SeqCst)
    }

    /// Statements passed to `run_query`, in order
    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }
}

impl Default for MockGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl GraphDatabase for MockGraph {
    async fn run_query(&self, query: &str, _params: &Params) -> DbResult<QueryOutcome> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.executed).push(query.to_string());

        let rules = lock(&self.query_rules);
        match rules.iter().find(|(marker, _)| query.contains(marker.as_str())) {
            Some((_, Ok(rows))) => Ok(QueryOutcome::from_rows(rows.clone(), 1.0)),
            Some((_, Err(e))) => Err(e.clone()),
            None => Ok(QueryOutcome::from_rows(Vec::new(), 1.0)),
        }
    }

    async fn explain(&self, query: &str) -> DbResult<()> {
        self.explain_calls.fetch_add(1, Ordering::SeqCst);
        let rules = lock(&self.explain_rules);
        match rules.iter().find(|(marker, _)| query.contains(marker.as_str())) {
            Some((_, e)) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn introspect_schema(&self) -> DbResult<SchemaInfo> {
        self.introspect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.introspection_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = lock(&self.introspection_error).clone() {
            return Err(e);
        }
        let scripted = lock(&self.schema).clone();
        match scripted {
            Some(schema) => Ok(schema),
            None => introspect_with_queries(self).await,
        }
    }
}
