//! Rewrites a failing candidate from its validation findings

use crate::llm::{CompletionRequest, LanguageModel};
use crate::nlq::generator::extract_cypher;
use crate::nlq::{prompts, NLQResult};
use std::sync::Arc;
use tracing::debug;

pub struct QueryCorrector {
    llm: Arc<dyn LanguageModel>,
}

impl QueryCorrector {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// One LLM call per invocation. The result is a new candidate and
    /// still has to be validated.
    pub async fn correct(
        &self,
        question: &str,
        failing_query: &str,
        errors: &[String],
        warnings: &[String],
        schema: &str,
    ) -> NLQResult<String> {
        let request = CompletionRequest::new(prompts::corrector_user(
            schema,
            question,
            failing_query,
            errors,
            warnings,
        ))
        .with_system_prompt(prompts::CORRECTOR_SYSTEM)
        .with_temperature(0.0);

        let completion = self.llm.complete(&request).await?;
        let corrected = extract_cypher(&completion.text);
        debug!(errors = errors.len(), corrected = %corrected, "Corrected candidate query");
        Ok(corrected)
    }
}
