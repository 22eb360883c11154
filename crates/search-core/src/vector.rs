use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use common::{Candidate, ChunkPayload};
use embeddings::EmbeddingProvider;

use crate::error::{StoreError, bounded};

/// One similarity hit; `payload` is `None` when the stored payload could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: Option<ChunkPayload>,
}

/// Similarity search and point lookup over named collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn query_by_vector(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<VectorHit>, StoreError>;

    /// `Ok(None)` when the collection has no point with this id.
    async fn retrieve_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<ChunkPayload>, StoreError>;

    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError>;
}

pub struct VectorSearchAdapter {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl VectorSearchAdapter {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            timeout,
        }
    }

    /// Cosine-similarity candidates for the raw query text. Embedding or
    /// store failures yield an empty list.
    pub async fn search(&self, query: &str, collection: &str, top_k: usize) -> Vec<Candidate> {
        match self.try_search(query, collection, top_k).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(
                    collection,
                    error = %err,
                    "vector search unavailable, degrading to empty"
                );
                Vec::new()
            }
        }
    }

    pub async fn try_search(
        &self,
        query: &str,
        collection: &str,
        top_k: usize,
    ) -> Result<Vec<Candidate>, StoreError> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let vector = bounded(self.timeout, async {
            self.embedder.embed(query).await.map_err(StoreError::from)
        })
        .await?;
        let hits = bounded(
            self.timeout,
            self.store.query_by_vector(collection, vector, top_k),
        )
        .await?;

        Ok(hits
            .into_iter()
            .take(top_k)
            .map(|hit| Candidate::vector(hit.id, hit.score, hit.payload))
            .collect())
    }
}
