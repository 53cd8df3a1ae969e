//! Topical relevance check

use crate::llm::{CompletionRequest, LanguageModel};
use crate::nlq::prompts;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Classifier outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailVerdict {
    Relevant,
    OffTopic,
    /// The classifier failed or gave an unreadable reply
    Unknown,
}

impl GuardrailVerdict {
    fn parse(reply: &str) -> Self {
        let reply = reply.trim().to_lowercase();
        let first_word = reply
            .split(|c: char| !c.is_alphanumeric())
            .find(|w| !w.is_empty())
            .unwrap_or("");
        match first_word {
            "code" => GuardrailVerdict::Relevant,
            "other" => GuardrailVerdict::OffTopic,
            _ if reply.contains("code") => GuardrailVerdict::Relevant,
            _ if reply.contains("other") => GuardrailVerdict::OffTopic,
            _ => GuardrailVerdict::Unknown,
        }
    }
}

pub struct Guardrail {
    llm: Arc<dyn LanguageModel>,
}

impl Guardrail {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Classify the question. Never fails; a broken classifier yields `Unknown`.
    pub async fn check(&self, question: &str) -> GuardrailVerdict {
        let request = CompletionRequest::new(prompts::guardrail_user(question))
            .with_system_prompt(prompts::GUARDRAIL_SYSTEM)
            .with_temperature(0.0)
            .with_max_tokens(10);

        match self.llm.complete(&request).await {
            Ok(completion) => {
                let verdict = GuardrailVerdict::parse(&completion.text);
                debug!(?verdict, reply = %completion.text, "Guardrail verdict");
                verdict
            }
            Err(e) => {
                warn!("Guardrail check failed, continuing: {}", e);
                GuardrailVerdict::Unknown
            }
        }
    }
}
