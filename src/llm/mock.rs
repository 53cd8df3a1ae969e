//! In-process language model with scripted replies

use crate::llm::{Completion, CompletionRequest, LanguageModel, LlmError, LlmResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

type Reply = LlmResult<String>;

struct Rule {
    marker: String,
    replies: VecDeque<Reply>,
    /// Reply reused once the queue is drained
    sticky: Option<Reply>,
}

/// Scripted model for tests and offline runs.
///
/// Replies are chosen by the first rule whose marker occurs in the prompt
/// (system prompt and user message). Queued replies are consumed in order;
/// the last reply of a rule keeps answering after the queue drains.
pub struct MockLlm {
    rules: Mutex<Vec<Rule>>,
    default_reply: Reply,
    calls: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            default_reply: Err(LlmError::ApiError("no scripted reply".to_string())),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Answer prompts containing `marker` with `reply`
    pub fn on(self, marker: &str, reply: &str) -> Self {
        self.push(marker, Ok(reply.to_string()))
    }

    /// Fail prompts containing `marker`
    pub fn fail_on(self, marker: &str, error: LlmError) -> Self {
        self.push(marker, Err(error))
    }

    /// Reply used when no marker matches
    pub fn with_default(mut self, reply: &str) -> Self {
        self.default_reply = Ok(reply.to_string());
        self
    }

    /// Simulated network latency per call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(self, marker: &str, reply: Reply) -> Self {
        {
            let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
            match rules.iter_mut().find(|r| r.marker == marker) {
                Some(rule) => {
                    if let Some(previous) = rule.sticky.replace(reply.clone()) {
                        rule.replies.push_back(previous);
                    }
                }
                None => rules.push(Rule {
                    marker: marker.to_string(),
                    replies: VecDeque::new(),
                    sticky: Some(reply),
                }),
            }
        }
        self
    }

    /// Every request seen so far, in call order
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of calls whose prompt contained `marker`
    pub fn call_count(&self, marker: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| prompt_text(c).contains(marker))
            .count()
    }

    fn next_reply(&self, prompt: &str) -> Reply {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        match rules.iter_mut().find(|r| prompt.contains(&r.marker)) {
            Some(rule) => match rule.replies.pop_front() {
                Some(reply) => reply,
                None => rule.sticky.clone().unwrap_or_else(|| self.default_reply.clone()),
            },
            None => self.default_reply.clone(),
        }
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

fn prompt_text(request: &CompletionRequest) -> String {
    match request.system_prompt.as_deref() {
        Some(system) => format!("{}\n{}", system, request.user_message),
        None => request.user_message.clone(),
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<Completion> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let text = self.next_reply(&prompt_text(request))?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(Completion::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_then_sticky() {
        let llm = MockLlm::new().on("cypher", "first").on("cypher", "second");

        let request = CompletionRequest::new("write cypher");
        assert_eq!(llm.complete(&request).await.unwrap().text, "first");
        assert_eq!(llm.complete(&request).await.unwrap().text, "second");
        assert_eq!(llm.complete(&request).await.unwrap().text, "second");
        assert_eq!(llm.call_count("cypher"), 3);
    }

    #[tokio::test]
    async fn test_default_and_failure() {
        let llm = MockLlm::new()
            .fail_on("boom", LlmError::NetworkError("down".to_string()))
            .with_default("fallback");

        let result = llm.complete(&CompletionRequest::new("boom")).await;
        assert!(matches!(result, Err(LlmError::NetworkError(_))));

        let reply = llm.complete(&CompletionRequest::new("other")).await.unwrap();
        assert_eq!(reply.text, "fallback");
    }

    #[tokio::test]
    async fn test_unscripted_prompt_fails() {
        let llm = MockLlm::new();
        assert!(llm.complete(&CompletionRequest::new("anything")).await.is_err());
    }
}
