//! Per-run pipeline state

use crate::graph::Row;
use serde::Serialize;
use std::fmt;

/// Text handed to the synthesizer when a query matched nothing
pub const NO_RESULTS: &str = "I couldn't find any relevant information in the database";

/// State-machine cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    Generate,
    Validate,
    Correct,
    Execute,
    End,
}

/// Stage names recorded in the execution trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Guardrails,
    GenerateCypher,
    ValidateCypher,
    CorrectCypher,
    ExecuteCypher,
    GenerateFinalAnswer,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Guardrails => "guardrails",
            Step::GenerateCypher => "generate_cypher",
            Step::ValidateCypher => "validate_cypher",
            Step::CorrectCypher => "correct_cypher",
            Step::ExecuteCypher => "execute_cypher",
            Step::GenerateFinalAnswer => "generate_final_answer",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running the statement.
///
/// An empty result and a failed execution are kept apart so the answer can
/// say "nothing found" rather than "the query could not run".
#[derive(Debug, Clone, PartialEq)]
pub enum Records {
    Rows(Vec<Row>),
    NoResults,
    ExecutionError(String),
}

impl Records {
    /// One-line description for responses and logs
    pub fn summary(&self) -> String {
        match self {
            Records::Rows(rows) if rows.len() == 1 => "1 row".to_string(),
            Records::Rows(rows) => format!("{} rows", rows.len()),
            Records::NoResults => "no results".to_string(),
            Records::ExecutionError(_) => "execution error".to_string(),
        }
    }
}

impl fmt::Display for Records {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Records::Rows(rows) => write!(f, "{} row(s)", rows.len()),
            Records::NoResults => f.write_str(NO_RESULTS),
            Records::ExecutionError(message) => write!(f, "Error executing query: {}", message),
        }
    }
}

/// Findings from one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Must be fixed before the statement may run
    pub errors: Vec<String>,
    /// Advisory only
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn next_action(&self) -> NextAction {
        if self.is_valid() {
            NextAction::Execute
        } else {
            NextAction::Correct
        }
    }
}

/// Everything one pipeline run knows, owned by that run alone
#[derive(Debug, Clone)]
pub struct PipelineState {
    question: String,
    /// Latest candidate; earlier candidates are not kept
    pub cypher_statement: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub records: Option<Records>,
    pub next_action: NextAction,
    pub correction_attempts: usize,
    steps: Vec<Step>,
}

impl PipelineState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            cypher_statement: String::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            records: None,
            next_action: NextAction::Generate,
            correction_attempts: 0,
            steps: Vec::new(),
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    /// Append a stage to the trace
    pub fn enter(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Replace the findings of the previous pass and route accordingly
    pub fn apply_validation(&mut self, outcome: ValidationOutcome) {
        self.next_action = outcome.next_action();
        self.errors = outcome.errors;
        self.warnings = outcome.warnings;
    }

    /// Install a new candidate statement that still needs validating
    pub fn set_candidate(&mut self, statement: String) {
        self.cypher_statement = statement;
        self.next_action = NextAction::Validate;
    }
}
