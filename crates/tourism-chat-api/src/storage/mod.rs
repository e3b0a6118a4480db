//! Session persistence
//!
//! Every backend implements [`SessionBackend`]; handlers only ever see the
//! [`SessionStore`] facade, which turns backend failures into logged,
//! degraded results:
//! - `load` never fails, errors read as an empty history
//! - `save` reports success as a bool, the caller carries on either way
//! - `delete` reports whether a record was removed
//!
//! Nothing here serializes concurrent writers of the same session id. Two
//! overlapping chat requests on one session both load, append and save, and
//! the later save wins.

mod file;
mod memory;
mod remote;

pub use file::FileSessionBackend;
pub use memory::MemorySessionBackend;
pub use remote::RemoteApiSessionBackend;

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{Settings, StorageBackend};
use crate::database::{DbPool, SessionRepository};
use crate::models::{Message, Session};

#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn fetch(&self, session_id: &str) -> Result<Option<Session>>;

    /// Replace the stored history of `session_id`, creating the record if needed.
    /// `owner` is the requesting user, for backends that track ownership.
    async fn store(&self, session_id: &str, messages: &[Message], owner: Option<&str>)
        -> Result<()>;

    /// Returns true when a record existed and was removed.
    async fn remove(&self, session_id: &str) -> Result<bool>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Release connections on shutdown.
    async fn close(&self) {}
}

#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionBackend::new()))
    }

    /// Build the backend selected by `storage.backend`.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let backend: Arc<dyn SessionBackend> = match settings.storage.backend {
            StorageBackend::Memory => {
                warn!("Using in-memory session storage, history is lost on restart");
                Arc::new(MemorySessionBackend::new())
            }
            StorageBackend::File => {
                Arc::new(FileSessionBackend::new(settings.storage.file_path.clone()))
            }
            StorageBackend::Postgres => {
                let pool = DbPool::new(&settings.database).await?;
                let repository = SessionRepository::new(pool);
                repository.ensure_schema().await?;
                Arc::new(repository)
            }
            StorageBackend::RemoteApi => {
                Arc::new(RemoteApiSessionBackend::new(&settings.remote_api)?)
            }
        };

        info!("Session storage backend: {}", backend.name());
        Ok(Self::new(backend))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// History for `session_id`, empty when unknown or unreadable.
    pub async fn load(&self, session_id: &str) -> Vec<Message> {
        match self.backend.fetch(session_id).await {
            Ok(Some(session)) => {
                debug!(
                    "Loaded session {} ({} messages)",
                    session_id,
                    session.messages.len()
                );
                session.messages
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                error!("Error loading session {}: {:#}", session_id, e);
                Vec::new()
            }
        }
    }

    /// Full record, errors included, for the session inspection endpoint.
    pub async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        self.backend.fetch(session_id).await
    }

    pub async fn save(&self, session_id: &str, messages: &[Message]) -> bool {
        self.save_for_user(session_id, messages, None).await
    }

    /// Best-effort persist. A failure is logged and reported as `false`.
    pub async fn save_for_user(
        &self,
        session_id: &str,
        messages: &[Message],
        owner: Option<&str>,
    ) -> bool {
        match self.backend.store(session_id, messages, owner).await {
            Ok(()) => {
                debug!("Saved session {} ({} messages)", session_id, messages.len());
                true
            }
            Err(e) => {
                error!("Error saving session {}: {:#}", session_id, e);
                false
            }
        }
    }

    pub async fn try_delete(&self, session_id: &str) -> Result<bool> {
        self.backend.remove(session_id).await
    }

    pub async fn delete(&self, session_id: &str) -> bool {
        match self.try_delete(session_id).await {
            Ok(removed) => removed,
            Err(e) => {
                error!("Error deleting session {}: {:#}", session_id, e);
                false
            }
        }
    }

    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    pub async fn close(&self) {
        self.backend.close().await
    }
}
