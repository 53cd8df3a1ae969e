//! Natural-language answer from execution records

use crate::graph::Row;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::nlq::prompts;
use crate::nlq::state::Records;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, warn};

/// Rows listed by the template answer
const FALLBACK_ROWS: usize = 5;

pub struct AnswerSynthesizer {
    llm: Arc<dyn LanguageModel>,
    max_rows_in_prompt: usize,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>, max_rows_in_prompt: usize) -> Self {
        Self { llm, max_rows_in_prompt }
    }

    /// Always returns an answer; an LLM failure falls back to a template
    /// built from the records.
    pub async fn synthesize(&self, question: &str, records: &Records) -> String {
        let results = format_results(records, self.max_rows_in_prompt);
        let request = CompletionRequest::new(prompts::synthesizer_user(question, &results))
            .with_system_prompt(prompts::SYNTHESIZER_SYSTEM)
            .with_temperature(0.3);

        match self.llm.complete(&request).await {
            Ok(completion) => {
                debug!(answer_len = completion.text.len(), "Answer synthesized");
                completion.text
            }
            Err(e) => {
                warn!("Answer synthesis failed, using template answer: {}", e);
                fallback_answer(question, records)
            }
        }
    }
}

fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_row(row: &Row) -> String {
    row.iter()
        .map(|(key, value)| format!("{}: {}", key, format_value(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Results block for the prompt, truncated to `max_rows` rows
pub fn format_results(records: &Records, max_rows: usize) -> String {
    match records {
        Records::Rows(rows) => {
            let mut out = String::new();
            for row in rows.iter().take(max_rows) {
                let line = serde_json::to_string(row).unwrap_or_else(|_| format_row(row));
                let _ = writeln!(out, "{}", line);
            }
            if rows.len() > max_rows {
                let _ = writeln!(out, "(showing {} of {} rows)", max_rows, rows.len());
            }
            out
        }
        other => other.to_string(),
    }
}

/// Deterministic answer used when the model is unavailable
pub fn fallback_answer(question: &str, records: &Records) -> String {
    match records {
        Records::Rows(rows) => {
            let mut out = format!(
                "Here are the results for your question: '{}'\nFound {} result{}:\n",
                question,
                rows.len(),
                if rows.len() == 1 { "" } else { "s" }
            );
            for row in rows.iter().take(FALLBACK_ROWS) {
                let _ = writeln!(out, "  • {}", format_row(row));
            }
            if rows.len() > FALLBACK_ROWS {
                let _ = writeln!(out, "  ... and {} more", rows.len() - FALLBACK_ROWS);
            }
            out.trim_end().to_string()
        }
        Records::NoResults => format!(
            "I couldn't find any relevant information in the database for: '{}'",
            question
        ),
        Records::ExecutionError(message) => format!(
            "The query for '{}' could not be run ({}). Please try rephrasing your question.",
            question, message
        ),
    }
}
