use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

use super::SessionBackend;
use crate::models::{Message, Session};

type SessionFile = BTreeMap<String, Session>;

/// All sessions kept in one JSON document, keyed by session id.
///
/// The mutex only keeps this process from interleaving reads and writes of
/// the file; it does not order chat requests against each other.
pub struct FileSessionBackend {
    path: PathBuf,
    io_lock: Mutex<()>,
}

impl FileSessionBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<SessionFile> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(SessionFile::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Invalid session file {:?}", self.path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionFile::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", self.path)),
        }
    }

    /// Write to a sibling temp file, then rename over the target.
    async fn write_all(&self, sessions: &SessionFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let bytes = serde_json::to_vec_pretty(sessions)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, bytes)
            .await
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {:?}", self.path))?;

        debug!("Wrote {} sessions to {:?}", sessions.len(), self.path);
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionBackend for FileSessionBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn fetch(&self, session_id: &str) -> Result<Option<Session>> {
        let _guard = self.io_lock.lock().await;
        let mut sessions = self.read_all().await?;
        Ok(sessions.remove(session_id))
    }

    async fn store(&self, session_id: &str, messages: &[Message], _owner: Option<&str>) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        let mut sessions = self.read_all().await?;

        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id, Vec::new()));
        session.messages = messages.to_vec();
        session.updated_at = Utc::now();

        self.write_all(&sessions).await
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        let _guard = self.io_lock.lock().await;
        let mut sessions = self.read_all().await?;

        if sessions.remove(session_id).is_none() {
            return Ok(false);
        }

        self.write_all(&sessions).await?;
        Ok(true)
    }

    async fn ping(&self) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        self.read_all().await.map(|_| ())
    }
}
