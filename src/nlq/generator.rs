//! Question to candidate Cypher

use crate::llm::{CompletionRequest, LanguageModel};
use crate::nlq::{prompts, NLQResult};
use std::sync::Arc;
use tracing::debug;

const CLAUSE_KEYWORDS: &[&str] = &["MATCH", "OPTIONAL", "WITH", "UNWIND", "CALL", "RETURN"];

pub struct QueryGenerator {
    llm: Arc<dyn LanguageModel>,
}

impl QueryGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// One LLM call; retries belong to the correction loop.
    pub async fn generate(&self, question: &str, schema: &str) -> NLQResult<String> {
        let request = CompletionRequest::new(prompts::generator_user(schema, question))
            .with_system_prompt(prompts::GENERATOR_SYSTEM)
            .with_temperature(0.0);

        let completion = self.llm.complete(&request).await?;
        let cypher = extract_cypher(&completion.text);
        debug!(cypher = %cypher, "Generated candidate query");
        Ok(cypher)
    }
}

fn starts_with_clause(line: &str) -> bool {
    let word: String = line
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    CLAUSE_KEYWORDS.iter().any(|kw| word.eq_ignore_ascii_case(kw))
}

/// Pull the Cypher statement out of a model reply that may carry markdown
/// fences or surrounding prose.
pub fn extract_cypher(response: &str) -> String {
    let trimmed = response.trim();

    // First fenced block wins
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = &after_fence[..end];
            return strip_language_tag(block).trim().to_string();
        }
    }

    let unfenced = trimmed.trim_start_matches('`').trim_end_matches('`').trim();
    let unfenced = strip_language_tag(unfenced).trim();
    if starts_with_clause(unfenced) {
        return unfenced.to_string();
    }

    // Prose before the query: take from the first clause line to the next blank line
    let lines: Vec<&str> = unfenced
        .lines()
        .skip_while(|line| !starts_with_clause(line))
        .take_while(|line| !line.trim().is_empty())
        .collect();
    if !lines.is_empty() {
        return lines.join("\n").trim().to_string();
    }

    unfenced.to_string()
}

fn strip_language_tag(block: &str) -> &str {
    let lead = block.trim_start();
    match lead.get(..6) {
        Some(tag) if tag.eq_ignore_ascii_case("cypher") => &lead[6..],
        _ => block,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlm};
    use crate::nlq::NLQError;

    #[test]
    fn test_extract_cypher_fenced() {
        let response = "```cypher\nMATCH (n:Developer) RETURN n.name LIMIT 10\n```";
        assert_eq!(extract_cypher(response), "MATCH (n:Developer) RETURN n.name LIMIT 10");

        let response = "```\nMATCH (n) RETURN n LIMIT 5\n```";
        assert_eq!(extract_cypher(response), "MATCH (n) RETURN n LIMIT 5");

        let response = "```cypher MATCH (n) RETURN n LIMIT 5```";
        assert_eq!(extract_cypher(response), "MATCH (n) RETURN n LIMIT 5");
    }

    #[test]
    fn test_extract_cypher_with_explanation() {
        let response = "Here is the query to find developers:\n\n```cypher\nMATCH (d:Developer) RETURN d.name LIMIT 10\n```\n\nThis lists developer names.";
        assert_eq!(extract_cypher(response), "MATCH (d:Developer) RETURN d.name LIMIT 10");
    }

    #[test]
    fn test_extract_cypher_keeps_continuation_lines() {
        let response = "MATCH (d:Developer)-[:AUTHORED]->(c:Commit)\nRETURN d.name,\n       count(c) AS commits\nORDER BY commits DESC\nLIMIT 10";
        assert_eq!(extract_cypher(response), response);
    }

    #[test]
    fn test_extract_cypher_prose_without_fences() {
        let response = "The query is:\nMATCH (m:Method)\nRETURN m.name LIMIT 5\n\nIt lists methods.";
        assert_eq!(extract_cypher(response), "MATCH (m:Method)\nRETURN m.name LIMIT 5");
    }

    #[test]
    fn test_extract_cypher_unterminated_fence() {
        let response = "```cypher\nMATCH (n) RETURN n LIMIT 1";
        assert_eq!(extract_cypher(response), "MATCH (n) RETURN n LIMIT 1");
    }

    #[tokio::test]
    async fn test_generate_strips_fences() {
        let llm = Arc::new(MockLlm::new().on(
            "Generate a Cypher query",
            "```cypher\nMATCH (d:Developer) RETURN DISTINCT d.name ORDER BY d.name LIMIT 50\n```",
        ));
        let generator = QueryGenerator::new(llm.clone());
        let cypher = generator.generate("Who are the developers?", "DATABASE SCHEMA:").await.unwrap();
        assert_eq!(cypher, "MATCH (d:Developer) RETURN DISTINCT d.name ORDER BY d.name LIMIT 50");

        let request = &llm.calls()[0];
        assert!(request.user_message.contains("DATABASE SCHEMA:"));
        assert!(request.user_message.contains("Who are the developers?"));
    }

    #[tokio::test]
    async fn test_generate_propagates_llm_failure() {
        let llm = Arc::new(MockLlm::new().fail_on(
            "Generate a Cypher query",
            LlmError::ApiError("503".to_string()),
        ));
        let generator = QueryGenerator::new(llm);
        let err = generator.generate("q", "schema").await.unwrap_err();
        assert!(matches!(err, NLQError::Llm(_)));
    }
}
