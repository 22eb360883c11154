use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use common::Candidate;

use crate::{
    error::{StoreError, bounded},
    normalizer::TextNormalizer,
};

/// One ranked document from a lexical index.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub doc_id: String,
    pub score: f32,
}

/// Inverted-index text search over named indexes.
///
/// Documents carry a stored `doc_id` field holding the chunk id and a
/// full-text field populated with normalized text.
#[async_trait]
pub trait LexicalStore: Send + Sync {
    async fn search(
        &self,
        index: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<LexicalHit>, StoreError>;

    async fn exists(&self, index: &str) -> Result<bool, StoreError>;
}

pub struct LexicalSearchAdapter {
    store: Arc<dyn LexicalStore>,
    normalizer: Arc<TextNormalizer>,
    timeout: Duration,
}

impl LexicalSearchAdapter {
    pub fn new(
        store: Arc<dyn LexicalStore>,
        normalizer: Arc<TextNormalizer>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            normalizer,
            timeout,
        }
    }

    /// BM25 candidates for `query`, best first. Any store failure yields an
    /// empty list so retrieval can continue on the vector path alone.
    pub async fn search(&self, query: &str, index: &str, top_k: usize) -> Vec<Candidate> {
        match self.try_search(query, index, top_k).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(
                    index,
                    error = %err,
                    "lexical search unavailable, degrading to empty"
                );
                Vec::new()
            }
        }
    }

    pub async fn try_search(
        &self,
        query: &str,
        index: &str,
        top_k: usize,
    ) -> Result<Vec<Candidate>, StoreError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let normalized = self.normalizer.normalize(query);
        if normalized.is_empty() {
            tracing::debug!(index, "query normalized to nothing, skipping lexical search");
            return Ok(Vec::new());
        }
        if !bounded(self.timeout, self.store.exists(index)).await? {
            return Err(StoreError::MissingIndex(index.to_string()));
        }

        let hits = bounded(self.timeout, self.store.search(index, &normalized, top_k)).await?;
        Ok(hits
            .into_iter()
            .take(top_k)
            .map(|hit| Candidate::lexical(hit.doc_id, hit.score))
            .collect())
    }
}
