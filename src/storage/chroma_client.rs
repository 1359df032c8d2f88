use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChromaError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Chroma API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
}

#[derive(Debug, Clone)]
pub struct ScoredResult {
    pub id: String,
    /// Distance reported by the collection's metric; lower is closer.
    pub distance: f32,
    pub metadata: Value,
    pub document: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChromaQueryRequest {
    query_embeddings: Vec<Vec<f32>>,
    n_results: u32,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    where_clause: Option<Value>,
    include: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChromaQueryResponse {
    ids: Vec<Vec<String>>,
    distances: Option<Vec<Vec<f32>>>,
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    documents: Option<Vec<Vec<Option<String>>>>,
}

/// Rust-native ChromaDB client using HTTP API v2
pub struct ChromaClient {
    base_url: String,
    client: Client,
    tenant: String,
    database: String,
}

impl ChromaClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
        }
    }

    fn collection_url(&self, collection_name: &str) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections/{}",
            self.base_url, self.tenant, self.database, collection_name
        )
    }

    fn collection_operation_url(&self, collection_id: &str, operation: &str) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections/{}/{}",
            self.base_url, self.tenant, self.database, collection_id, operation
        )
    }

    /// Nearest neighbours of `embedding`, closest first.
    pub async fn query(
        &self,
        collection: &str,
        embedding: Vec<f32>,
        limit: u32,
        filters: Option<Value>,
    ) -> Result<Vec<ScoredResult>, ChromaError> {
        let collection_id = self.get_collection_id(collection).await?;
        let url = self.collection_operation_url(&collection_id, "query");

        let request = ChromaQueryRequest {
            query_embeddings: vec![embedding],
            n_results: limit,
            where_clause: filters,
            include: vec![
                "distances".to_string(),
                "metadatas".to_string(),
                "documents".to_string(),
            ],
        };

        let response = self.client.post(&url).json(&request).send().await?;

        match response.status() {
            StatusCode::OK => {
                let query_response: ChromaQueryResponse = response.json().await?;
                Ok(Self::parse_query_results(query_response))
            }
            status => {
                let message = response.text().await?;
                Err(ChromaError::ApiError {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// Get collection ID by name
    async fn get_collection_id(&self, name: &str) -> Result<String, ChromaError> {
        let url = self.collection_url(name);

        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let collection: Value = response.json().await?;
                collection["id"]
                    .as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ChromaError::CollectionNotFound(name.to_string()))
            }
            StatusCode::NOT_FOUND => Err(ChromaError::CollectionNotFound(name.to_string())),
            status => {
                let message = response.text().await?;
                Err(ChromaError::ApiError {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    fn parse_query_results(response: ChromaQueryResponse) -> Vec<ScoredResult> {
        let Some(ids) = response.ids.into_iter().next() else {
            return Vec::new();
        };
        let distances = response
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let metadatas = response
            .metadatas
            .and_then(|m| m.into_iter().next())
            .unwrap_or_default();
        let documents = response
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        ids.into_iter()
            .enumerate()
            .map(|(idx, id)| ScoredResult {
                id,
                distance: distances.get(idx).copied().unwrap_or(f32::MAX),
                metadata: metadatas
                    .get(idx)
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| json!({})),
                document: documents.get(idx).cloned().flatten(),
            })
            .collect()
    }

    /// Health check method - uses v2 API
    pub async fn ping(&self) -> Result<(), ChromaError> {
        let url = format!("{}/api/v2/heartbeat", self.base_url);
        self.client.get(&url).send().await?.error_for_status()?;
        Ok(())
    }
}
