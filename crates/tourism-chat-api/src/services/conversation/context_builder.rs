use std::sync::Arc;
use tracing::{debug, warn};

use super::manager::{EmbeddingProvider, VectorIndexProvider};
use super::types::RetrievedItem;

const MISSING_FIELD: &str = "N/A";

/// Turns a user query into the context block injected into the system prompt.
pub struct ContextAssembler {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    index_provider: Arc<dyn VectorIndexProvider>,
    top_k: usize,
}

impl ContextAssembler {
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        index_provider: Arc<dyn VectorIndexProvider>,
        top_k: usize,
    ) -> Self {
        Self {
            embedding_provider,
            index_provider,
            top_k,
        }
    }

    /// Nearest items for `query`. Embedding or index failures yield no items.
    pub async fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievedItem> {
        let embedding = match self.embedding_provider.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Embedding failed, continuing without context: {:#}", e);
                return Vec::new();
            }
        };

        match self.index_provider.query(&embedding, k).await {
            Ok(items) => {
                debug!("Retrieved {} context items", items.len());
                items
            }
            Err(e) => {
                warn!("Vector index query failed, continuing without context: {:#}", e);
                Vec::new()
            }
        }
    }

    /// One `name: description` line per item.
    pub fn format(items: &[RetrievedItem]) -> String {
        items
            .iter()
            .map(|item| {
                format!(
                    "{}: {}",
                    item.metadata.name.as_deref().unwrap_or(MISSING_FIELD),
                    item.metadata.description.as_deref().unwrap_or(MISSING_FIELD)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Retrieve with the configured `top_k` and format in one go.
    pub async fn context_for(&self, query: &str) -> String {
        let items = self.retrieve(query, self.top_k).await;
        Self::format(&items)
    }
}
