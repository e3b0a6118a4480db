use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Who authored a message in a session history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

// Older records carry `HumanMessage` / `AIMessage`; anything unknown reads as user.
impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "assistant" | "AIMessage" | "ai" => Role::Assistant,
            _ => Role::User,
        })
    }
}

/// A single entry of a conversation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// Persisted conversation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            session_id: session_id.into(),
            messages,
            updated_at: Utc::now(),
        }
    }
}

/// Accepts RFC 3339 and offset-less ISO timestamps (read as UTC).
/// Unparseable values become `None` instead of failing the whole record.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| parse_timestamp(&value)))
}

pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serializes_role_as_type() {
        let msg = Message::user("Namaste");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "user");
        assert_eq!(value["content"], "Namaste");
        assert!(value["timestamp"].is_string());

        let value = serde_json::to_value(Message::assistant("Hello")).unwrap();
        assert_eq!(value["type"], "assistant");
    }

    #[test]
    fn test_legacy_type_names() {
        let human: Message =
            serde_json::from_value(json!({"type": "HumanMessage", "content": "hi"})).unwrap();
        assert_eq!(human.role, Role::User);

        let ai: Message =
            serde_json::from_value(json!({"type": "AIMessage", "content": "hello"})).unwrap();
        assert_eq!(ai.role, Role::Assistant);

        let unknown: Message =
            serde_json::from_value(json!({"type": "SystemMessage", "content": "x"})).unwrap();
        assert_eq!(unknown.role, Role::User);
    }

    #[test]
    fn test_timestamp_without_offset_reads_as_utc() {
        let msg: Message = serde_json::from_value(json!({
            "type": "user",
            "content": "hi",
            "timestamp": "2024-05-01T10:15:30.123456"
        }))
        .unwrap();
        let ts = msg.timestamp.unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T10:15:30.123456+00:00");
    }

    #[test]
    fn test_bad_or_missing_timestamp_is_none() {
        let msg: Message = serde_json::from_value(json!({
            "type": "assistant",
            "content": "ok",
            "timestamp": "yesterday"
        }))
        .unwrap();
        assert!(msg.timestamp.is_none());

        let msg: Message =
            serde_json::from_value(json!({"type": "assistant", "content": "ok"})).unwrap();
        assert!(msg.timestamp.is_none());
        assert!(serde_json::to_value(&msg).unwrap().get("timestamp").is_none());
    }

    #[test]
    fn test_session_record_shape() {
        let session = Session::new("s1", vec![Message::user("a"), Message::assistant("b")]);
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["messages"].as_array().unwrap().len(), 2);
        assert!(value["updated_at"].is_string());

        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }
}
