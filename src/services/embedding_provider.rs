// src/services/embedding_provider.rs

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Provider-specific errors
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("No embeddings returned")]
    NoEmbeddings,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Trait for embedding providers (Ollama, OpenAI, etc.)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for the given text content
    async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Ollama provider implementation
pub struct OllamaProvider {
    ollama: ollama_rs::Ollama,
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: String, model: String) -> Self {
        let port = reqwest::Url::parse(&base_url)
            .ok()
            .and_then(|url| url.port())
            .unwrap_or(11434);
        Self {
            ollama: ollama_rs::Ollama::new(base_url, port),
            model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>, ProviderError> {
        use ollama_rs::generation::embeddings::request::{
            EmbeddingsInput, GenerateEmbeddingsRequest,
        };

        let input = EmbeddingsInput::Single(content.to_string());
        let request = GenerateEmbeddingsRequest::new(self.model.clone(), input);

        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        response
            .embeddings
            .into_iter()
            .next()
            .map(|embedding| embedding.into_iter().map(|v| v as f32).collect())
            .ok_or(ProviderError::NoEmbeddings)
    }
}

/// OpenAI `/embeddings` provider; requires an API key.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddingProvider {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingItem {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn generate_embedding(&self, content: &str) -> Result<Vec<f32>, ProviderError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": content }))
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http(format!("{} - {}", status, message)));
        }

        let parsed: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or(ProviderError::NoEmbeddings)
    }
}
