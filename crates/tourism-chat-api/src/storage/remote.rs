use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::SessionBackend;
use crate::config::RemoteApiConfig;
use crate::models::{Message, Role, Session};

const DEFAULT_TITLE: &str = "New Chat";

/// Message shape used by the companion chat API (`sender` is `user` or `ai`)
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteMessage {
    #[serde(default)]
    id: String,
    content: String,
    sender: String,
    #[serde(default)]
    timestamp: Option<String>,
}

impl RemoteMessage {
    fn from_message(message: &Message) -> Self {
        let sender = match message.role {
            Role::User => "user",
            Role::Assistant => "ai",
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: message.content.clone(),
            sender: sender.to_string(),
            timestamp: Some(message.timestamp.unwrap_or_else(Utc::now).to_rfc3339()),
        }
    }

    fn into_message(self) -> Message {
        let role = if self.sender == "ai" {
            Role::Assistant
        } else {
            Role::User
        };
        Message {
            role,
            content: self.content,
            timestamp: self
                .timestamp
                .as_deref()
                .and_then(crate::models::session::parse_timestamp),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSession {
    session_id: String,
    #[serde(default)]
    messages: Vec<RemoteMessage>,
    #[serde(default)]
    last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl RemoteSession {
    fn into_session(self) -> Session {
        Session {
            session_id: self.session_id,
            messages: self
                .messages
                .into_iter()
                .map(RemoteMessage::into_message)
                .collect(),
            updated_at: self.last_activity.or(self.updated_at).unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    session: RemoteSession,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody<'a> {
    session_id: &'a str,
    user_id: &'a str,
    title: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchBody {
    messages: Vec<RemoteMessage>,
}

/// Sessions kept by the companion chat API over HTTP.
///
/// `store` creates the session if needed (the API answers with the stored
/// copy either way) and appends only the messages the API does not have yet,
/// since the API offers append but not replace. A history that does not
/// extend the stored one is refused rather than silently dropped.
pub struct RemoteApiSessionBackend {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
    default_user_id: Option<String>,
}

impl RemoteApiSessionBackend {
    pub fn new(config: &RemoteApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client for chat API")?;

        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid chat API base URL: {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Chat API base URL cannot carry a path: {}", config.base_url);
        }

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone(),
            default_user_id: config.default_user_id.clone(),
        })
    }

    /// `{base}/api/chat/{segments...}` with each segment percent-encoded
    fn chat_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "chat"]).extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn create_session(&self, session_id: &str, user_id: &str) -> Result<RemoteSession> {
        let url = self.chat_url(&["ai", "create"]);
        let response = self
            .authorize(self.client.post(url))
            .json(&CreateSessionBody {
                session_id,
                user_id,
                title: DEFAULT_TITLE,
            })
            .send()
            .await
            .context("Failed to reach chat API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat API create failed ({}): {}", status, body);
        }

        let envelope: SessionEnvelope = response
            .json()
            .await
            .context("Failed to parse chat API create response")?;
        Ok(envelope.session)
    }

    async fn append_messages(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        let url = self.chat_url(&[session_id, "messages", "ai", "batch"]);
        let body = BatchBody {
            messages: messages.iter().map(RemoteMessage::from_message).collect(),
        };

        let response = self
            .authorize(self.client.post(url))
            .json(&body)
            .send()
            .await
            .context("Failed to reach chat API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat API batch append failed ({}): {}", status, body);
        }

        Ok(())
    }

    /// `GET /api/chat/{id}` only answers the logged-in owner. Without such a
    /// token the unauthenticated create route is the one read path: it returns
    /// the stored session, or creates an empty one that reads as unknown.
    async fn fetch_through_create(
        &self,
        session_id: &str,
        refused: StatusCode,
    ) -> Result<Option<Session>> {
        let user_id = self.default_user_id.as_deref().with_context(|| {
            format!(
                "Chat API refused to read session {} ({}); configure remote_api.api_token \
                 for the session owner or remote_api.default_user_id",
                session_id, refused
            )
        })?;

        debug!(
            "Chat API refused GET for {} ({}), reading through create",
            session_id, refused
        );
        let session = self.create_session(session_id, user_id).await?.into_session();
        Ok((!session.messages.is_empty()).then_some(session))
    }
}

#[async_trait::async_trait]
impl SessionBackend for RemoteApiSessionBackend {
    fn name(&self) -> &'static str {
        "remote_api"
    }

    async fn fetch(&self, session_id: &str) -> Result<Option<Session>> {
        let url = self.chat_url(&[session_id]);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .context("Failed to reach chat API")?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return self.fetch_through_create(session_id, response.status()).await;
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("Chat API fetch failed ({}): {}", status, body);
            }
            _ => {}
        }

        let envelope: SessionEnvelope = response
            .json()
            .await
            .context("Failed to parse chat API session")?;
        Ok(Some(envelope.session.into_session()))
    }

    async fn store(&self, session_id: &str, messages: &[Message], owner: Option<&str>) -> Result<()> {
        let user_id = owner
            .or(self.default_user_id.as_deref())
            .context("Chat API needs a user id to own the session")?;

        let remote = self.create_session(session_id, user_id).await?.into_session();
        let known = remote.messages.len();

        let extends_remote = known <= messages.len()
            && remote
                .messages
                .iter()
                .zip(messages)
                .all(|(stored, local)| stored.role == local.role && stored.content == local.content);
        if !extends_remote {
            anyhow::bail!(
                "Chat API holds {} messages for {} that the {} messages being saved do not extend",
                known,
                session_id,
                messages.len()
            );
        }

        if known == messages.len() {
            debug!("Chat API already holds all {} messages for {}", known, session_id);
            return Ok(());
        }

        self.append_messages(session_id, &messages[known..]).await
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        let url = self.chat_url(&[session_id]);
        let response = self
            .authorize(self.client.delete(url))
            .send()
            .await
            .context("Failed to reach chat API")?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("Chat API delete failed ({}): {}", status, body)
            }
        }
    }
}
