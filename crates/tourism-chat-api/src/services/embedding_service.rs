use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::services::conversation::manager::EmbeddingProvider;

#[derive(Debug, Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a str,
}

/// Hugging Face inference client for the feature-extraction pipeline.
#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl EmbeddingService {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create embedding HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/models/{}/pipeline/feature-extraction",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
            api_key: config.api_key.clone(),
        })
    }

    async fn embed_internal(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&FeatureExtractionRequest { inputs: text })
            .send()
            .await
            .context("Failed to connect to embedding service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json_value: Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embedding = parse_embedding(&json_value)?;
        debug!("Embedding has {} dimensions", embedding.len());
        Ok(embedding)
    }
}

/// Accepts `[f32, ...]`, `[[f32, ...]]`, `{"embedding": [...]}` and the
/// OpenAI `{"data": [{"embedding": [...]}]}` shape.
fn parse_embedding(value: &Value) -> Result<Vec<f32>> {
    let vector = match value {
        Value::Array(items) if items.first().is_some_and(Value::is_array) => items.first(),
        Value::Array(items) if items.first().is_some_and(|v| v.get("embedding").is_some()) => {
            items.first().and_then(|v| v.get("embedding"))
        }
        Value::Array(_) => Some(value),
        Value::Object(map) => map.get("embedding").or_else(|| {
            map.get("data")
                .and_then(|d| d.get(0))
                .and_then(|first| first.get("embedding"))
        }),
        _ => None,
    };

    let Some(Value::Array(numbers)) = vector else {
        anyhow::bail!("Unrecognized embedding response format: {}", value);
    };

    let embedding: Vec<f32> = numbers
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();

    if embedding.is_empty() {
        anyhow::bail!("Generated embedding is empty");
    }
    if embedding.len() != numbers.len() {
        anyhow::bail!("Embedding contains non-numeric values");
    }

    Ok(embedding)
}

#[async_trait::async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_internal(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            base_url: base_url.to_string(),
            api_key: "hf_test".to_string(),
            model: "BAAI/bge-m3".to_string(),
            timeout_seconds: 5,
        }
    }

    #[test]
    fn test_parse_flat_and_nested_vectors() {
        assert_eq!(parse_embedding(&json!([0.5, -1.0])).unwrap(), vec![0.5, -1.0]);
        assert_eq!(parse_embedding(&json!([[0.25, 0.75]])).unwrap(), vec![0.25, 0.75]);
        assert_eq!(
            parse_embedding(&json!({"data": [{"embedding": [1.0]}]})).unwrap(),
            vec![1.0]
        );
    }

    #[test]
    fn test_parse_rejects_unusable_payloads() {
        assert!(parse_embedding(&json!([])).is_err());
        assert!(parse_embedding(&json!({"error": "loading"})).is_err());
        assert!(parse_embedding(&json!(["a", "b"])).is_err());
    }

    #[tokio::test]
    async fn test_embed_posts_inputs_to_pipeline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/BAAI/bge-m3/pipeline/feature-extraction"))
            .and(header("authorization", "Bearer hf_test"))
            .and(body_json(json!({"inputs": "temples near Haridwar"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([0.1, 0.2, 0.3])))
            .expect(1)
            .mount(&server)
            .await;

        let service = EmbeddingService::new(&config(&server.uri())).unwrap();
        let embedding = service.embed("temples near Haridwar").await.unwrap();
        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model is loading"))
            .mount(&server)
            .await;

        let service = EmbeddingService::new(&config(&server.uri())).unwrap();
        let err = service.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
