//! Chat responders: pluggable, trait-based reply generation for the widget.
//!
//! Default: `KeywordResponder` (knowledge-base lookup only, deterministic).
//! With `ANTHROPIC_API_KEY` set: `LlmResponder`, which grounds the model in the
//! matched excerpts and falls back to the keyword answer on any LLM failure.

use async_trait::async_trait;
use tracing::warn;

use crate::chat::knowledge::{KnowledgeBase, KnowledgeSection};
use crate::chat::prompts::{system_prompt, NO_MATCH_REPLY};
use crate::llm_client::{ChatTurn, LlmClient};

const MAX_EXCERPTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    /// At least one knowledge-base section matched the question.
    pub grounded: bool,
}

#[async_trait]
pub trait ChatResponder: Send + Sync {
    fn name(&self) -> &'static str;

    /// `history` holds earlier turns, oldest first, without `message`.
    async fn respond(&self, message: &str, history: &[ChatTurn]) -> ChatReply;
}

/// Answers with the best-matching knowledge-base section.
pub struct KeywordResponder;

#[async_trait]
impl ChatResponder for KeywordResponder {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn respond(&self, message: &str, _history: &[ChatTurn]) -> ChatReply {
        keyword_reply(KnowledgeBase::builtin(), message)
    }
}

fn keyword_reply(kb: &KnowledgeBase, message: &str) -> ChatReply {
    match kb.search(message, 1).first() {
        Some(best) => ChatReply {
            text: best.section.body.clone(),
            grounded: true,
        },
        None => ChatReply {
            text: NO_MATCH_REPLY.to_string(),
            grounded: false,
        },
    }
}

pub struct LlmResponder {
    llm: LlmClient,
}

impl LlmResponder {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ChatResponder for LlmResponder {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn respond(&self, message: &str, history: &[ChatTurn]) -> ChatReply {
        let kb = KnowledgeBase::builtin();
        let matches = kb.search(message, MAX_EXCERPTS);
        let grounded = !matches.is_empty();

        // Without a hit the whole (small) knowledge base goes in, so follow-up
        // questions like "and how long does that take?" still have context.
        let excerpts: Vec<&KnowledgeSection> = if grounded {
            matches.iter().map(|m| m.section).collect()
        } else {
            kb.sections().iter().collect()
        };

        let mut turns = history.to_vec();
        turns.push(ChatTurn::user(message));

        match self.llm.complete(&system_prompt(&excerpts), &turns).await {
            Ok(text) => ChatReply { text, grounded },
            Err(e) => {
                warn!("LLM reply failed, answering from knowledge base: {e}");
                keyword_reply(kb, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_keyword_responder_answers_from_section() {
        let reply = KeywordResponder
            .respond("Which integrations are supported?", &[])
            .await;
        assert!(reply.grounded);
        assert!(reply.text.contains("NetSuite"));
    }

    #[tokio::test]
    async fn test_keyword_responder_offers_handoff_without_match() {
        let reply = KeywordResponder.respond("weather in Lisbon", &[]).await;
        assert!(!reply.grounded);
        assert_eq!(reply.text, NO_MATCH_REPLY);
    }

    #[tokio::test]
    async fn test_llm_responder_falls_back_on_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let llm = LlmClient::with_base_url("k".into(), "m".into(), server.uri())
            .unwrap()
            .with_retry_base(Duration::from_millis(1));

        let reply = LlmResponder::new(llm)
            .respond("Tell me about cash application", &[])
            .await;
        assert!(reply.grounded);
        assert!(reply.text.contains("matched to open invoices"));
    }

    #[tokio::test]
    async fn test_llm_responder_uses_model_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "We sync every 15 minutes."}],
                "usage": {"input_tokens": 100, "output_tokens": 8}
            })))
            .mount(&server)
            .await;
        let llm = LlmClient::with_base_url("k".into(), "m".into(), server.uri()).unwrap();

        let reply = LlmResponder::new(llm)
            .respond("How often does the NetSuite integration sync?", &[ChatTurn::user("hi")])
            .await;
        assert_eq!(reply.text, "We sync every 15 minutes.");
        assert!(reply.grounded);
    }
}
