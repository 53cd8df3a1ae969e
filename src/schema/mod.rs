//! Graph schema description
//!
//! `SchemaInfo` is the structural metadata returned by introspection;
//! `render` turns it into the text block embedded in every generation and
//! correction prompt. `SchemaCacheManager` keeps the rendered text fresh.

pub mod cache;

use crate::graph::{DbError, GraphDatabase};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

pub use cache::{CacheState, CacheStats, CacheStatus, SchemaCacheManager};

/// Schema errors
#[derive(Error, Debug, Clone)]
pub enum SchemaError {
    /// The provider could not introspect the database
    #[error("Schema introspection failed: {0}")]
    Introspection(#[from] DbError),

    /// No snapshot exists and fetching one failed
    #[error("Failed to load schema and no cache available: {0}")]
    Unavailable(String),
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// A relationship type with one observed pair of endpoint labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipPattern {
    pub start_labels: Vec<String>,
    pub rel_type: String,
    pub end_labels: Vec<String>,
}

/// Node/relationship/property surface of the database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
    pub relationship_patterns: Vec<RelationshipPattern>,
    pub label_properties: BTreeMap<String, Vec<String>>,
    /// Partial-failure remarks from introspection
    pub notes: Vec<String>,
}

const COMMON_QUERY_PATTERNS: &[&str] = &[
    "Security Analysis: CVE-AFFECTS->ExternalDependency<-DEPENDS_ON-Import<-IMPORTS-File",
    "Code Complexity: Method.estimated_lines, File.total_lines",
    "Developer Activity: Developer-AUTHORED->Commit-CHANGED->FileVer-OF_FILE->File",
    "Architecture Analysis: Method.pagerank_score, betweenness_score",
    "Method Calls: Method-CALLS->Method",
    "Class Hierarchy: Class-EXTENDS/IMPLEMENTS->Class/Interface",
    "Class-Method Relationship: Class-CONTAINS_METHOD->Method",
    "File-Class-Method: File-DEFINES->Class-CONTAINS_METHOD->Method",
];

const EXAMPLE_QUERIES: &[(&str, &str)] = &[
    (
        "Find vulnerable files",
        "MATCH (cve:CVE)-[:AFFECTS]->(dep:ExternalDependency)<-[:DEPENDS_ON]-(imp:Import)<-[:IMPORTS]-(f:File) WHERE cve.cvss_score >= 7.0 RETURN DISTINCT f.path, cve.id ORDER BY cve.id LIMIT 50",
    ),
    (
        "CVEs affecting specific dependency",
        "MATCH (cve:CVE)-[:AFFECTS]->(dep:ExternalDependency) WHERE dep.name = 'dependency.name' RETURN cve.id, cve.description, cve.cvss_score ORDER BY cve.cvss_score DESC LIMIT 50",
    ),
    (
        "Complex methods",
        "MATCH (f:File)-[:DECLARES]->(m:Method) WHERE m.estimated_lines > 50 RETURN f.path, m.name, m.estimated_lines ORDER BY m.estimated_lines DESC LIMIT 50",
    ),
    (
        "Developer activity",
        "MATCH (dev:Developer)-[:AUTHORED]->(c:Commit) RETURN dev.name, count(c) AS commits ORDER BY commits DESC LIMIT 50",
    ),
    (
        "Methods in class",
        "MATCH (c:Class {name: 'ClassName'})-[:CONTAINS_METHOD]->(m:Method) RETURN m.name, m.line ORDER BY m.line LIMIT 50",
    ),
    (
        "Methods in file",
        "MATCH (f:File)-[:DECLARES]->(m:Method) WHERE f.path CONTAINS 'path/to/file' RETURN m.name, m.line ORDER BY m.line LIMIT 50",
    ),
];

impl SchemaInfo {
    /// Render the prompt-ready schema description
    pub fn render(&self) -> String {
        let mut out = String::from("DATABASE SCHEMA:\n\n");

        out.push_str("NODE LABELS:\n");
        for label in &self.labels {
            let _ = writeln!(out, "- {}", label);
        }

        out.push_str("\nRELATIONSHIP TYPES:\n");
        for rel_type in &self.relationship_types {
            let _ = writeln!(out, "- {}", rel_type);
        }

        out.push_str("\nRELATIONSHIP PATTERNS:\n");
        for p in &self.relationship_patterns {
            let _ = writeln!(
                out,
                "- ({}) -[:{}]-> ({})",
                p.start_labels.join(":"),
                p.rel_type,
                p.end_labels.join(":")
            );
        }

        out.push_str("\nNODE PROPERTIES:\n");
        for (label, properties) in &self.label_properties {
            let _ = writeln!(out, "{}:", label);
            for property in properties {
                let _ = writeln!(out, "  - {}", property);
            }
        }

        if !self.notes.is_empty() {
            out.push_str("\nINTROSPECTION NOTES:\n");
            for note in &self.notes {
                let _ = writeln!(out, "- {}", note);
            }
        }

        out.push_str("\nCOMMON QUERY PATTERNS:\n");
        for (i, pattern) in COMMON_QUERY_PATTERNS.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, pattern);
        }

        out.push_str("\nEXAMPLE QUERIES:\n");
        for (title, query) in EXAMPLE_QUERIES {
            let _ = writeln!(out, "- {}: {}", title, query);
        }

        out
    }
}

/// Source of structural metadata; stateless
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn fetch_schema(&self) -> SchemaResult<SchemaInfo>;
}

/// Introspects a live database
pub struct GraphSchemaProvider {
    db: Arc<dyn GraphDatabase>,
}

impl GraphSchemaProvider {
    pub fn new(db: Arc<dyn GraphDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SchemaProvider for GraphSchemaProvider {
    async fn fetch_schema(&self) -> SchemaResult<SchemaInfo> {
        Ok(self.db.introspect_schema().await?)
    }
}

/// Rendered schema text from one successful fetch.
///
/// Never mutated; a newer fetch replaces it.
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
    loaded_at: Instant,
}

impl SchemaSnapshot {
    pub fn new(text: String, ttl: Duration) -> Self {
        Self {
            text,
            created_at: Utc::now(),
            ttl,
            loaded_at: Instant::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.loaded_at.elapsed() >= self.ttl
    }

    /// Seconds left before expiry; negative once expired
    pub fn time_until_expiry(&self) -> f64 {
        self.ttl.as_secs_f64() - self.loaded_at.elapsed().as_secs_f64()
    }
}
