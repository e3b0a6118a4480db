use std::sync::Arc;
use tracing::{debug, error};

use crate::models::{ChatMessage, Message};

use super::manager::LlmProvider;

pub const CONTEXT_PLACEHOLDER: &str = "{context_info}";
pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't generate a response.";

/// The single model call of a chat turn. Holds no per-session state.
pub struct ConversationStep {
    llm_provider: Arc<dyn LlmProvider>,
    system_prompt: String,
}

impl ConversationStep {
    pub fn new(llm_provider: Arc<dyn LlmProvider>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm_provider,
            system_prompt: system_prompt.into(),
        }
    }

    /// System instruction with the context interpolated, then the history in order.
    pub fn build_prompt(&self, history: &[Message], context_text: &str) -> Vec<ChatMessage> {
        let mut prompt = Vec::with_capacity(history.len() + 1);
        prompt.push(ChatMessage::system(
            self.system_prompt.replace(CONTEXT_PLACEHOLDER, context_text),
        ));
        prompt.extend(history.iter().map(ChatMessage::from));
        prompt
    }

    /// One model invocation. A failed call becomes the fallback apology.
    pub async fn respond(&self, history: &[Message], context_text: &str) -> Message {
        let prompt = self.build_prompt(history, context_text);
        debug!("Invoking model with {} prompt messages", prompt.len());

        match self.llm_provider.generate(&prompt).await {
            Ok(reply) => Message::assistant(reply),
            Err(e) => {
                error!("Model invocation failed: {:#}", e);
                Message::assistant(FALLBACK_REPLY)
            }
        }
    }

    /// Messages produced by this step, in order.
    pub async fn run(&self, history: &[Message], context_text: &str) -> Vec<Message> {
        vec![self.respond(history, context_text).await]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::conversation::manager::MockLlmProvider;

    const PROMPT: &str = "Only Uttarakhand tourism.\nContext:\n{context_info}";

    #[test]
    fn test_prompt_is_system_then_history() {
        let step = ConversationStep::new(Arc::new(MockLlmProvider::new()), PROMPT);
        let history = vec![
            Message::user("Hi"),
            Message::assistant("Namaste!"),
            Message::user("Best trek in June?"),
        ];

        let prompt = step.build_prompt(&history, "Kedarkantha: Winter trek");

        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[0].role, "system");
        assert_eq!(
            prompt[0].content,
            "Only Uttarakhand tourism.\nContext:\nKedarkantha: Winter trek"
        );
        let roles: Vec<&str> = prompt[1..].iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["user", "assistant", "user"]);
        assert_eq!(prompt[3].content, "Best trek in June?");
    }

    #[test]
    fn test_empty_context_leaves_blank_section() {
        let step = ConversationStep::new(Arc::new(MockLlmProvider::new()), PROMPT);
        let prompt = step.build_prompt(&[Message::user("x")], "");
        assert_eq!(prompt[0].content, "Only Uttarakhand tourism.\nContext:\n");
    }

    #[tokio::test]
    async fn test_respond_wraps_model_output() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .withf(|messages| messages.len() == 2 && messages[1].content == "Where is Auli?")
            .times(1)
            .returning(|_| Ok("Auli is near Joshimath.".to_string()));

        let step = ConversationStep::new(Arc::new(llm), PROMPT);
        let reply = step.respond(&[Message::user("Where is Auli?")], "").await;

        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "Auli is near Joshimath.");
    }

    #[tokio::test]
    async fn test_model_failure_becomes_fallback() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .returning(|_| Err(anyhow::anyhow!("503 from provider")));

        let step = ConversationStep::new(Arc::new(llm), PROMPT);
        let produced = step.run(&[Message::user("hello")], "").await;

        assert_eq!(produced.len(), 1);
        assert!(produced[0].is_assistant());
        assert_eq!(produced[0].content, FALLBACK_REPLY);
    }
}
