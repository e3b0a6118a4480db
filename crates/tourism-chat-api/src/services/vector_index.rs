use crate::config::VectorIndexConfig;
use crate::services::conversation::manager::VectorIndexProvider;
use crate::services::conversation::types::{ItemMetadata, RetrievedItem};
use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const API_VERSION: &str = "2024-07";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Value>,
}

impl From<QueryMatch> for RetrievedItem {
    fn from(m: QueryMatch) -> Self {
        RetrievedItem {
            id: m.id,
            score: m.score,
            metadata: ItemMetadata::from_json(m.metadata.as_ref()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
}

/// Pinecone data-plane client bound to one index host.
#[derive(Clone)]
pub struct PineconeIndex {
    client: Client,
    host: String,
    api_key: String,
}

impl PineconeIndex {
    /// Bind to the configured host, or look it up through the control plane.
    pub async fn connect(config: &VectorIndexConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create vector index HTTP client")?;

        let host = match config.host.as_deref().filter(|h| !h.trim().is_empty()) {
            Some(host) => host.to_string(),
            None => resolve_host(&client, config).await?,
        };

        let index = Self {
            client,
            host: normalize_host(&host),
            api_key: config.api_key.clone(),
        };
        info!("Vector index '{}' at {}", config.index_name, index.host);
        Ok(index)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }
}

async fn resolve_host(client: &Client, config: &VectorIndexConfig) -> Result<String> {
    let url = format!(
        "{}/indexes/{}",
        config.controller_url.trim_end_matches('/'),
        config.index_name
    );

    let response = client
        .get(&url)
        .header("Api-Key", &config.api_key)
        .header("X-Pinecone-API-Version", API_VERSION)
        .send()
        .await
        .with_context(|| format!("Failed to reach vector index controller at {}", url))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!(
            "Failed to describe index '{}' ({}): {}",
            config.index_name,
            status,
            body
        );
    }

    let description: IndexDescription = response
        .json()
        .await
        .context("Failed to parse index description")?;
    Ok(description.host)
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

#[async_trait::async_trait]
impl VectorIndexProvider for PineconeIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedItem>> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
        };

        let response = self
            .with_headers(self.client.post(format!("{}/query", self.host)))
            .json(&request)
            .send()
            .await
            .context("Failed to query vector index")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Vector index error ({}): {}", status, body);
        }

        let result: QueryResponse = response
            .json()
            .await
            .context("Failed to parse vector index response")?;

        debug!("Vector index returned {} matches", result.matches.len());
        Ok(result.matches.into_iter().map(RetrievedItem::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(controller_url: &str, host: Option<String>) -> VectorIndexConfig {
        VectorIndexConfig {
            api_key: "pc_test".to_string(),
            index_name: "tourism-chatbot".to_string(),
            host,
            controller_url: controller_url.to_string(),
            top_k: 5,
            timeout_seconds: 5,
        }
    }

    #[test]
    fn test_normalize_host_adds_scheme() {
        assert_eq!(
            normalize_host("tourism-abc.svc.pinecone.io"),
            "https://tourism-abc.svc.pinecone.io"
        );
        assert_eq!(normalize_host("http://localhost:5080/"), "http://localhost:5080");
    }

    #[tokio::test]
    async fn test_connect_resolves_host_from_controller() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/tourism-chatbot"))
            .and(header("api-key", "pc_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "tourism-chatbot",
                "host": "tourism-chatbot-xyz.svc.pinecone.io"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let index = PineconeIndex::connect(&config(&server.uri(), None)).await.unwrap();
        assert_eq!(index.host(), "https://tourism-chatbot-xyz.svc.pinecone.io");
    }

    #[tokio::test]
    async fn test_connect_fails_for_unknown_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        assert!(PineconeIndex::connect(&config(&server.uri(), None)).await.is_err());
    }

    #[tokio::test]
    async fn test_query_maps_matches_to_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("api-key", "pc_test"))
            .and(body_json(json!({
                "vector": [0.5, 0.25],
                "topK": 2,
                "includeMetadata": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "matches": [
                    {"id": "p1", "score": 0.91, "metadata": {"name": "Mansa Devi Temple", "description": "Hilltop shrine"}},
                    {"id": "p2", "score": 0.84}
                ],
                "namespace": ""
            })))
            .mount(&server)
            .await;

        let index = PineconeIndex::connect(&config("http://unused", Some(server.uri())))
            .await
            .unwrap();
        let items = index.query(&[0.5, 0.25], 2).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "p1");
        assert_eq!(items[0].metadata.name.as_deref(), Some("Mansa Devi Temple"));
        assert_eq!(items[1].metadata, ItemMetadata::default());
    }

    #[tokio::test]
    async fn test_query_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let index = PineconeIndex::connect(&config("http://unused", Some(server.uri())))
            .await
            .unwrap();
        assert!(index.query(&[1.0], 5).await.is_err());
    }
}
