use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

use super::SessionBackend;
use crate::models::{Message, Session};

/// Process-local session map. Contents live as long as the server process.
#[derive(Clone, Default)]
pub struct MemorySessionBackend {
    storage: Arc<DashMap<String, Session>>,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionBackend for MemorySessionBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.storage.get(session_id).map(|entry| entry.value().clone()))
    }

    async fn store(&self, session_id: &str, messages: &[Message], _owner: Option<&str>) -> Result<()> {
        self.storage
            .entry(session_id.to_string())
            .and_modify(|session| {
                session.messages = messages.to_vec();
                session.updated_at = Utc::now();
            })
            .or_insert_with(|| Session::new(session_id, messages.to_vec()));
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        Ok(self.storage.remove(session_id).is_some())
    }
}
