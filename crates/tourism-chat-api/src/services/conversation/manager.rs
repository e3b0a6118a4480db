use anyhow::Result;
use tracing::{info, warn};

use crate::models::chat::ChatMessage;
use crate::models::Message;
use crate::storage::SessionStore;

use super::context_builder::ContextAssembler;
use super::step::{ConversationStep, FALLBACK_REPLY};
use super::types::RetrievedItem;

/// Trait for embedding service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Trait for the nearest-neighbour index
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VectorIndexProvider: Send + Sync {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedItem>>;
}

/// Trait for LLM service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Runs one chat turn: load, retrieve, respond, persist.
pub struct ConversationManager {
    store: SessionStore,
    assembler: ContextAssembler,
    step: ConversationStep,
}

impl ConversationManager {
    pub fn new(store: SessionStore, assembler: ContextAssembler, step: ConversationStep) -> Self {
        Self {
            store,
            assembler,
            step,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Returns the reply text. Every dependency failure has already been
    /// replaced by a default by the time this returns, so it never errors.
    pub async fn handle_chat(
        &self,
        session_id: &str,
        user_message: &str,
        user_id: Option<&str>,
    ) -> String {
        let mut history = self.store.load(session_id).await;
        info!(
            "Chat turn for session {} ({} prior messages)",
            session_id,
            history.len()
        );

        history.push(Message::user(user_message));

        let context_text = self.assembler.context_for(user_message).await;

        let produced = self.step.run(&history, &context_text).await;
        let reply = match latest_assistant_reply(&produced) {
            Some(reply) => reply.clone(),
            None => {
                warn!("Conversation step produced no assistant message");
                Message::assistant(FALLBACK_REPLY)
            }
        };

        let reply_text = reply.content.clone();
        history.push(reply);

        if !self.store.save_for_user(session_id, &history, user_id).await {
            warn!("Session {} was not persisted; reply is returned anyway", session_id);
        }

        reply_text
    }
}

/// Most recent assistant message, scanning from the end.
pub fn latest_assistant_reply(messages: &[Message]) -> Option<&Message> {
    messages.iter().rev().find(|m| m.is_assistant())
}
