use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment names used by existing `.env` deployments. They are
/// registered as defaults so `config/settings.toml` and `APP_*` variables win.
const CONVENTIONAL_ENV_KEYS: &[(&str, &str)] = &[
    ("llm.api_key", "GROQ_API_KEY"),
    ("vector_index.api_key", "PINECONE_API_KEY"),
    ("embedding.api_key", "HF_API_KEY"),
    ("database.url", "DATABASE_URL"),
    ("cors.allowed_origin", "FRONTEND_URL"),
    ("remote_api.base_url", "API_BASE_URL"),
    ("server.port", "PORT"),
];

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly and helpful AI assistant for tourism in Uttarakhand. \
Engage in conversation, provide information, and answer questions to the best of your ability. \
Always be polite and informative. \
Your knowledge is strictly limited to tourism in Uttarakhand, India. \
If a user asks about topics outside of Uttarakhand tourism (e.g., politics, health, personal advice, other regions/countries), \
politely state that you can only assist with Uttarakhand tourism-related inquiries.\
\n\nHere is relevant tourism information to help you answer the user's query:\n{context_info}";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub remote_api: RemoteApiConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Frontend origin allowed to call the API with credentials
    pub allowed_origin: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai".to_string(),
            api_key: String::new(),
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.0,
            max_tokens: None,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.huggingface.co/hf-inference".to_string(),
            api_key: String::new(),
            model: "BAAI/bge-m3".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct VectorIndexConfig {
    pub api_key: String,
    pub index_name: String,
    /// Data-plane host. Resolved from `index_name` at startup when empty.
    pub host: Option<String>,
    pub controller_url: String,
    pub top_k: usize,
    pub timeout_seconds: u64,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            index_name: "tourism-chatbot".to_string(),
            host: None,
            controller_url: "https://api.pinecone.io".to_string(),
            top_k: 5,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
    Postgres,
    RemoteApi,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub file_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            file_path: PathBuf::from("data/sessions.json"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_max_size: 5,
            pool_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RemoteApiConfig {
    pub base_url: String,
    /// Bearer token sent to the chat API, if it requires one
    pub api_token: Option<String>,
    /// Owner used when a chat request carries no `user_id`
    pub default_user_id: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for RemoteApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: None,
            default_user_id: None,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PromptsConfig {
    pub system_prompt: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        for (key, var) in CONVENTIONAL_ENV_KEYS {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_default(*key, value)?;
            }
        }

        let config = builder
            .add_source(File::with_name("config/settings").required(false))
            // Example: APP_LLM__API_KEY=gsk_...
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Fails when any credential needed by the selected setup is missing.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.llm.api_key.trim().is_empty() {
            missing.push("llm.api_key (GROQ_API_KEY)");
        }
        if self.embedding.api_key.trim().is_empty() {
            missing.push("embedding.api_key (HF_API_KEY)");
        }
        if self.vector_index.api_key.trim().is_empty() {
            missing.push("vector_index.api_key (PINECONE_API_KEY)");
        }
        if self.cors.allowed_origin.trim().is_empty() {
            missing.push("cors.allowed_origin (FRONTEND_URL)");
        }

        match self.storage.backend {
            StorageBackend::Postgres if self.database.url.trim().is_empty() => {
                missing.push("database.url (DATABASE_URL)");
            }
            StorageBackend::RemoteApi if self.remote_api.base_url.trim().is_empty() => {
                missing.push("remote_api.base_url (API_BASE_URL)");
            }
            StorageBackend::File if self.storage.file_path.as_os_str().is_empty() => {
                missing.push("storage.file_path");
            }
            _ => {}
        }

        if !missing.is_empty() {
            anyhow::bail!("Missing required configuration: {}", missing.join(", "));
        }

        if self.storage.backend == StorageBackend::Postgres
            && !(self.database.url.starts_with("postgres://")
                || self.database.url.starts_with("postgresql://"))
        {
            let scheme = self.database.url.split("://").next().unwrap_or_default();
            anyhow::bail!(
                "database.url must be a postgres:// connection string, got a {}:// URL",
                scheme
            );
        }

        if !self.prompts.system_prompt.contains("{context_info}") {
            tracing::warn!("System prompt has no {{context_info}} placeholder, retrieved context will be dropped");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_settings() -> Settings {
        let mut settings = Settings::default();
        settings.llm.api_key = "gsk_test".to_string();
        settings.embedding.api_key = "hf_test".to_string();
        settings.vector_index.api_key = "pc_test".to_string();
        settings.cors.allowed_origin = "http://localhost:3000".to_string();
        settings
    }

    #[test]
    fn test_defaults_target_hosted_services() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.llm.model, "llama-3.1-8b-instant");
        assert_eq!(settings.embedding.model, "BAAI/bge-m3");
        assert_eq!(settings.vector_index.index_name, "tourism-chatbot");
        assert_eq!(settings.vector_index.top_k, 5);
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert!(settings.prompts.system_prompt.contains("{context_info}"));
    }

    #[test]
    fn test_validate_accepts_complete_settings() {
        assert!(complete_settings().validate().is_ok());
    }

    #[test]
    fn test_validate_lists_every_missing_key() {
        let err = Settings::default().validate().unwrap_err().to_string();
        assert!(err.contains("llm.api_key"));
        assert!(err.contains("embedding.api_key"));
        assert!(err.contains("vector_index.api_key"));
        assert!(err.contains("cors.allowed_origin"));
    }

    #[test]
    fn test_validate_requires_backend_specific_keys() {
        let mut settings = complete_settings();
        settings.storage.backend = StorageBackend::Postgres;
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("database.url"));

        settings.database.url = "postgres://localhost/chat".to_string();
        assert!(settings.validate().is_ok());

        settings.storage.backend = StorageBackend::RemoteApi;
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("remote_api.base_url"));
    }

    #[test]
    fn test_validate_rejects_non_postgres_database_url() {
        let mut settings = complete_settings();
        settings.storage.backend = StorageBackend::Postgres;
        settings.database.url = "mongodb://localhost:27017/tourism".to_string();

        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("postgres://"));
        assert!(err.contains("mongodb://"));

        settings.database.url = "postgresql://chat@localhost/chat".to_string();
        assert!(settings.validate().is_ok());

        settings.storage.backend = StorageBackend::Memory;
        settings.database.url = "mongodb://localhost:27017/tourism".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_backend_names_deserialize_snake_case() {
        let backend: StorageBackend = serde_json::from_str("\"remote_api\"").unwrap();
        assert_eq!(backend, StorageBackend::RemoteApi);
        let backend: StorageBackend = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(backend, StorageBackend::Postgres);
    }
}
