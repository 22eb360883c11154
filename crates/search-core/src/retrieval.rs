use common::RetrievedChunk;
use futures::future::join_all;

use crate::{
    chunk_store::ChunkStoreAccessor,
    error::RetrieveError,
    fusion::{FusionParams, fuse},
    lexical::LexicalSearchAdapter,
    vector::VectorSearchAdapter,
};

/// Hybrid BM25 + dense retrieval fused with weighted RRF.
///
/// Collaborator failures never surface here: each adapter degrades to an
/// empty list or `None`, so "no results" and "both backends down" look the
/// same to callers. Only contract violations are reported as errors.
pub struct HybridRetriever {
    lexical: LexicalSearchAdapter,
    vector: VectorSearchAdapter,
    chunks: ChunkStoreAccessor,
    params: FusionParams,
}

impl HybridRetriever {
    pub fn new(
        lexical: LexicalSearchAdapter,
        vector: VectorSearchAdapter,
        chunks: ChunkStoreAccessor,
        params: FusionParams,
    ) -> Self {
        Self {
            lexical,
            vector,
            chunks,
            params,
        }
    }

    pub fn params(&self) -> &FusionParams {
        &self.params
    }

    pub async fn retrieve(
        &self,
        query: &str,
        lexical_index: &str,
        vector_collection: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrieveError> {
        if top_k == 0 {
            return Err(RetrieveError::InvalidTopK);
        }
        if query.trim().is_empty() {
            return Err(RetrieveError::EmptyQuery);
        }

        let (lexical, vector) = tokio::join!(
            self.lexical.search(query, lexical_index, top_k),
            self.vector.search(query, vector_collection, top_k),
        );
        let fused = fuse(&lexical, &vector, top_k, &self.params);

        let payloads = join_all(
            fused
                .iter()
                .map(|result| self.chunks.fetch_chunk(&result.id, vector_collection)),
        )
        .await;
        let fused_count = fused.len();
        let mut chunks = fused
            .into_iter()
            .zip(payloads)
            .filter_map(|(result, payload)| {
                payload.map(|payload| RetrievedChunk::from_parts(result, payload))
            })
            .collect::<Vec<_>>();
        chunks.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score));

        if chunks.len() < fused_count {
            tracing::warn!(
                vector_collection,
                dropped = fused_count - chunks.len(),
                "fused candidates missing from the vector collection were dropped"
            );
        }
        tracing::debug!(
            lexical_index,
            vector_collection,
            lexical_hits = lexical.len(),
            vector_hits = vector.len(),
            fused = fused_count,
            hydrated = chunks.len(),
            "hybrid retrieval complete"
        );
        Ok(chunks)
    }
}
