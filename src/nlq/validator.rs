//! Dry-run plus structural checks on a candidate query
//!
//! Hard errors route the run to correction; warnings are passed along to
//! the corrector and the response but never block execution.

use crate::graph::GraphDatabase;
use crate::nlq::state::ValidationOutcome;
use crate::nlq::NLQResult;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Clause count above which a query is flagged as overly complex
pub const MAX_CLAUSES: usize = 10;

struct Patterns {
    literal: Regex,
    line_comment: Regex,
    match_clause: Regex,
    match_like: Regex,
    return_clause: Regex,
    write_clause: Regex,
    expression_tail: Regex,
    where_clause: Regex,
    limit: Regex,
    distinct: Regex,
    aggregate: Regex,
    order_by: Regex,
    clause: Regex,
    traversal: Regex,
    exact_path: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |src: &str| Regex::new(src).expect("static pattern compiles");
        Patterns {
            literal: re(r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|`[^`]*`"#),
            line_comment: re(r"//[^\n]*"),
            match_clause: re(r"(?i)\b(OPTIONAL\s+)?MATCH\b"),
            match_like: re(r"(?i)\b(MATCH|UNWIND|CALL)\b"),
            return_clause: re(r"(?i)\bRETURN\b"),
            write_clause: re(r"(?i)(?:^|[\s)\]}|])(CREATE|MERGE|DELETE|SET|REMOVE|DROP)(?:\s*\(|\s+[A-Za-z_'])"),
            expression_tail: re(r"(?i)(?:\b(?:AS|BY)|,)\s*$"),
            where_clause: re(r"(?i)\bWHERE\b"),
            limit: re(r"(?i)\bLIMIT\b"),
            distinct: re(r"(?i)\bDISTINCT\b"),
            aggregate: re(r"(?i)\b(count|collect|sum|avg|min|max)\s*\("),
            order_by: re(r"(?i)\bORDER\s+BY\b"),
            clause: re(r"(?i)\b(OPTIONAL\s+MATCH|MATCH|WHERE|WITH|UNWIND|CALL|RETURN|ORDER\s+BY|SKIP|LIMIT|UNION)\b"),
            traversal: re(r"-\[|\]-|\)--|--\(|<--|-->"),
            exact_path: re(r"(?i)\.(path|file_path|filename)\s*=\s*''"),
        }
    })
}

pub struct QueryValidator {
    db: Arc<dyn GraphDatabase>,
}

impl QueryValidator {
    pub fn new(db: Arc<dyn GraphDatabase>) -> Self {
        Self { db }
    }

    /// Validate one candidate.
    ///
    /// A statement the database rejects during the dry run is a hard error
    /// and skips the structural checks. A database that cannot be reached is
    /// returned as `Err`: rewriting the query will not help.
    pub async fn validate(&self, query: &str) -> NLQResult<ValidationOutcome> {
        if query.trim().is_empty() {
            return Ok(ValidationOutcome {
                errors: vec!["Empty Cypher query".to_string()],
                warnings: Vec::new(),
            });
        }

        if let Err(e) = self.db.explain(query).await {
            if !e.is_rejection() {
                warn!("Dry run could not reach the database: {}", e);
                return Err(e.into());
            }
            debug!("Dry run rejected the query: {}", e);
            return Ok(ValidationOutcome {
                errors: vec![format!("Syntax error: {}", e)],
                warnings: Vec::new(),
            });
        }

        let outcome = check_structure(query);
        debug!(
            errors = outcome.errors.len(),
            warnings = outcome.warnings.len(),
            "Structural validation finished"
        );
        Ok(outcome)
    }
}

/// Heuristic checks on a query that already planned successfully
pub fn check_structure(query: &str) -> ValidationOutcome {
    let p = patterns();
    let stripped = p.literal.replace_all(query, "''");
    let uncommented = p.line_comment.replace_all(&stripped, "");
    let code: &str = &uncommented;

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if code.trim().is_empty() {
        errors.push("Empty Cypher query".to_string());
        return ValidationOutcome { errors, warnings };
    }
    if !p.match_like.is_match(code) {
        errors.push("Query must contain a MATCH clause".to_string());
    }
    if !p.return_clause.is_match(code) {
        errors.push("Query must contain a RETURN clause".to_string());
    }
    let mut writes: Vec<String> = p
        .write_clause
        .captures_iter(code)
        .filter_map(|c| c.get(1))
        // `AS delete`, `BY delete` and `, delete` name columns
        .filter(|m| !p.expression_tail.is_match(&code[..m.start()]))
        .map(|m| m.as_str().to_uppercase())
        .collect();
    writes.sort();
    writes.dedup();
    if !writes.is_empty() {
        errors.push(format!(
            "Query must be read-only; remove {}",
            writes.join(", ")
        ));
    }

    if !p.limit.is_match(code) {
        warnings.push("Query has no LIMIT clause; add one to bound the result size".to_string());
    }
    if p.traversal.is_match(code) && !p.distinct.is_match(code) && !p.aggregate.is_match(code) {
        warnings.push("Traversal may return duplicate rows; consider RETURN DISTINCT".to_string());
    }
    if !p.order_by.is_match(code) {
        warnings.push("Query has no ORDER BY clause; result order is not deterministic".to_string());
    }

    let clause_count = p.clause.find_iter(code).count();
    if clause_count > MAX_CLAUSES {
        warnings.push(format!(
            "Query has {} clauses; consider simplifying it",
            clause_count
        ));
    }

    let (mut required, mut optional) = (0, 0);
    for c in p.match_clause.captures_iter(code) {
        if c.get(1).is_some() {
            optional += 1;
        } else {
            required += 1;
        }
    }
    if required > 1 && optional == 0 && p.where_clause.is_match(code) {
        warnings.push(
            "Filtered joins across several MATCH clauses drop rows with missing matches; consider OPTIONAL MATCH"
                .to_string(),
        );
    }

    if p.exact_path.is_match(code) {
        warnings.push("Use CONTAINS instead of exact match for file paths".to_string());
    }

    ValidationOutcome { errors, warnings }
}
