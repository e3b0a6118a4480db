use super::DbPool;
use crate::models::{Message, Session};
use crate::storage::SessionBackend;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::{debug, info};

/// One document per session: the whole history lives in a JSONB column.
pub struct SessionRepository {
    pub pool: DbPool,
}

#[derive(Debug, FromRow)]
struct SessionRow {
    session_id: String,
    messages: Json<Vec<Message>>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            session_id: row.session_id,
            messages: row.messages.0,
            updated_at: row.updated_at,
        }
    }
}

impl SessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the sessions table and its indexes if they are missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chat_sessions (
                session_id TEXT PRIMARY KEY,
                messages JSONB NOT NULL DEFAULT '[]'::jsonb,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        )
        .execute(self.pool.get_pool())
        .await
        .context("Failed to create chat_sessions table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_sessions_updated_at ON chat_sessions (updated_at)",
        )
        .execute(self.pool.get_pool())
        .await
        .context("Failed to create chat_sessions index")?;

        info!("Session table and indexes ready");
        Ok(())
    }

    pub async fn find_session(&self, session_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"SELECT
                session_id,
                messages,
                updated_at
               FROM chat_sessions
               WHERE session_id = $1"#,
        )
        .bind(session_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row.map(Session::from))
    }

    pub async fn upsert_session(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO chat_sessions (session_id, messages, updated_at)
               VALUES ($1, $2, now())
               ON CONFLICT (session_id)
               DO UPDATE SET messages = EXCLUDED.messages, updated_at = EXCLUDED.updated_at"#,
        )
        .bind(session_id)
        .bind(Json(messages))
        .execute(self.pool.get_pool())
        .await?;

        debug!("Upserted session {} ({} messages)", session_id, messages.len());
        Ok(())
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(self.pool.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl SessionBackend for SessionRepository {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn fetch(&self, session_id: &str) -> Result<Option<Session>> {
        self.find_session(session_id).await
    }

    async fn store(&self, session_id: &str, messages: &[Message], _owner: Option<&str>) -> Result<()> {
        self.upsert_session(session_id, messages).await
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        self.delete_session(session_id).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool.get_pool()).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Session database connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    #[test]
    fn test_row_converts_to_session() {
        let updated_at = Utc::now();
        let row = SessionRow {
            session_id: "s1".to_string(),
            messages: Json(vec![Message::user("q"), Message::assistant("a")]),
            updated_at,
        };

        let session = Session::from(row);
        assert_eq!(session.session_id, "s1");
        assert_eq!(session.messages.len(), 2);
        assert!(session.messages[1].is_assistant());
        assert_eq!(session.updated_at, updated_at);
    }

    /// Runs against a live database when DATABASE_URL is set, otherwise passes trivially.
    #[tokio::test]
    async fn test_store_fetch_and_delete_against_postgres() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let pool = DbPool::new(&DatabaseConfig {
            url,
            ..Default::default()
        })
        .await
        .unwrap();
        let repository = SessionRepository::new(pool);
        repository.ensure_schema().await.unwrap();

        let session_id = format!("test-{}", uuid::Uuid::new_v4());
        assert!(repository.find_session(&session_id).await.unwrap().is_none());

        let mut history = vec![
            Message::user("Which temples are near Haridwar?"),
            Message::assistant("Mansa Devi and Chandi Devi."),
        ];
        repository.store(&session_id, &history, None).await.unwrap();

        history.push(Message::user("How do I reach Mansa Devi?"));
        history.push(Message::assistant("Take the ropeway from Upper Road."));
        repository.store(&session_id, &history, None).await.unwrap();

        let session = repository.fetch(&session_id).await.unwrap().unwrap();
        assert_eq!(session.session_id, session_id);
        let contents: Vec<&str> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "Which temples are near Haridwar?",
                "Mansa Devi and Chandi Devi.",
                "How do I reach Mansa Devi?",
                "Take the ropeway from Upper Road.",
            ]
        );
        assert!(!session.messages[2].is_assistant());
        assert!(session.messages[3].is_assistant());

        assert!(repository.remove(&session_id).await.unwrap());
        assert!(repository.fetch(&session_id).await.unwrap().is_none());
        assert!(!repository.remove(&session_id).await.unwrap());
    }
}
