use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::internal::DocumentChunk;
use crate::services::embedding_provider::EmbeddingProvider;
use crate::storage::chroma_client::{ChromaClient, ScoredResult};

/// Similarity search over ingested document chunks.
///
/// Never fails: an unavailable backend degrades to an empty result, which
/// callers read as "no relevant context".
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    /// Closest chunks first. `restrict_to` limits results to the given
    /// documents; an empty restriction matches nothing.
    async fn search(
        &self,
        query: &str,
        limit: usize,
        restrict_to: Option<&[Uuid]>,
    ) -> Vec<DocumentChunk>;
}

pub struct DocumentRetriever {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    chroma: Arc<ChromaClient>,
    collection: String,
}

impl DocumentRetriever {
    pub fn new(
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        chroma: Arc<ChromaClient>,
        collection: String,
    ) -> Self {
        Self {
            embedder,
            chroma,
            collection,
        }
    }

    fn document_filter(restrict_to: Option<&[Uuid]>) -> Option<Value> {
        restrict_to.map(|ids| {
            let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
            json!({ "document_id": { "$in": ids } })
        })
    }

    fn to_chunk(result: ScoredResult) -> Option<DocumentChunk> {
        let document_id = result.metadata["document_id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())?;

        Some(DocumentChunk {
            document_id,
            chunk_id: result.id,
            chunk_index: result.metadata["chunk_index"].as_i64(),
            content: result.document.unwrap_or_default(),
            token_count: result.metadata["token_count"].as_i64(),
            distance: result.distance,
        })
    }
}

#[async_trait]
impl DocumentSearch for DocumentRetriever {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        restrict_to: Option<&[Uuid]>,
    ) -> Vec<DocumentChunk> {
        if limit == 0 || restrict_to.is_some_and(|ids| ids.is_empty()) {
            return Vec::new();
        }

        let Some(embedder) = &self.embedder else {
            debug!("No embedding provider configured, skipping retrieval");
            return Vec::new();
        };

        let embedding = match embedder.generate_embedding(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Query embedding failed, continuing without context: {}", e);
                return Vec::new();
            }
        };

        let results = match self
            .chroma
            .query(
                &self.collection,
                embedding,
                limit as u32,
                Self::document_filter(restrict_to),
            )
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!("Vector search failed, continuing without context: {}", e);
                return Vec::new();
            }
        };

        let mut chunks: Vec<DocumentChunk> =
            results.into_iter().filter_map(Self::to_chunk).collect();
        chunks.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        chunks.truncate(limit);

        debug!(results = chunks.len(), "Retrieved document chunks");
        chunks
    }
}
