use std::{sync::Arc, time::Duration};

use common::ChunkPayload;

use crate::{
    error::{StoreError, bounded},
    vector::VectorStore,
};

/// Point lookups against the vector collection, which holds the chunk body
/// for every id regardless of which method surfaced it.
pub struct ChunkStoreAccessor {
    store: Arc<dyn VectorStore>,
    timeout: Duration,
}

impl ChunkStoreAccessor {
    pub fn new(store: Arc<dyn VectorStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// `None` means "drop this candidate": the id is unknown or the store failed.
    pub async fn fetch_chunk(&self, id: &str, collection: &str) -> Option<ChunkPayload> {
        match self.try_fetch(id, collection).await {
            Ok(Some(payload)) => Some(payload),
            Ok(None) => {
                tracing::debug!(id, collection, "chunk not found in vector collection");
                None
            }
            Err(err) => {
                tracing::warn!(id, collection, error = %err, "chunk lookup failed");
                None
            }
        }
    }

    pub async fn try_fetch(
        &self,
        id: &str,
        collection: &str,
    ) -> Result<Option<ChunkPayload>, StoreError> {
        bounded(self.timeout, self.store.retrieve_by_id(collection, id)).await
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use common::ChunkPayload;

    use super::ChunkStoreAccessor;
    use crate::{
        error::StoreError,
        vector::{VectorHit, VectorStore},
    };

    struct OnePoint {
        delay: Duration,
    }

    #[async_trait]
    impl VectorStore for OnePoint {
        async fn query_by_vector(
            &self,
            _collection: &str,
            _vector: Vec<f32>,
            _limit: usize,
        ) -> Result<Vec<VectorHit>, StoreError> {
            Ok(Vec::new())
        }

        async fn retrieve_by_id(
            &self,
            collection: &str,
            id: &str,
        ) -> Result<Option<ChunkPayload>, StoreError> {
            tokio::time::sleep(self.delay).await;
            match (collection, id) {
                ("down", _) => Err(StoreError::Unreachable("refused".to_string())),
                (_, "known") => Ok(Some(ChunkPayload {
                    chunk_text: "corps".to_string(),
                    ..ChunkPayload::default()
                })),
                _ => Ok(None),
            }
        }

        async fn collection_exists(&self, _collection: &str) -> Result<bool, StoreError> {
            Ok(true)
        }
    }

    fn accessor(delay_ms: u64) -> ChunkStoreAccessor {
        ChunkStoreAccessor::new(
            Arc::new(OnePoint {
                delay: Duration::from_millis(delay_ms),
            }),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn fetches_known_chunks() {
        let payload = accessor(0).fetch_chunk("known", "chunks").await;
        assert_eq!(payload.map(|p| p.chunk_text), Some("corps".to_string()));
    }

    #[tokio::test]
    async fn unknown_ids_and_failures_are_none() {
        let accessor = accessor(0);
        assert!(accessor.fetch_chunk("other", "chunks").await.is_none());
        assert!(accessor.fetch_chunk("known", "down").await.is_none());
    }

    #[tokio::test]
    async fn slow_lookups_time_out_to_none() {
        let accessor = accessor(300);
        assert!(matches!(
            accessor.try_fetch("known", "chunks").await,
            Err(StoreError::Timeout(_))
        ));
        assert!(accessor.fetch_chunk("known", "chunks").await.is_none());
    }
}
