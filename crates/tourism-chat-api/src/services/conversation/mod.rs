//! Retrieval-augmented chat turn
//!
//! - [`ContextAssembler`]: embed the query, fetch nearest items, format them
//! - [`ConversationStep`]: one model call over the full history
//! - [`ConversationManager`]: wires both to the session store per request

mod context_builder;
pub mod manager;
mod step;
pub mod types;

pub use context_builder::ContextAssembler;
pub use manager::{
    latest_assistant_reply, ConversationManager, EmbeddingProvider, LlmProvider,
    VectorIndexProvider,
};
pub use step::{ConversationStep, CONTEXT_PLACEHOLDER, FALLBACK_REPLY};
pub use types::{ItemMetadata, RetrievedItem};
