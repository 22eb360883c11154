//! Writes pre-chunked records into the lexical index and the vector
//! collection under one shared id.
//!
//! Fusion and hydration join the two stores on that id. With a vector sink
//! attached, a record whose embedding fails is skipped on both sides.

use std::sync::Arc;

use async_trait::async_trait;
use common::{ChunkPayload, ChunkRecord};
use embeddings::EmbeddingProvider;
use serde::Serialize;
use uuid::Uuid;

use crate::{error::StoreError, normalizer::TextNormalizer};

#[async_trait]
pub trait LexicalSink: Send + Sync {
    /// Creates the index when it does not exist yet.
    async fn prepare_index(&self, index: &str) -> Result<(), StoreError>;

    async fn put_document(&self, index: &str, doc_id: &str, text: &str) -> Result<(), StoreError>;

    /// Makes everything written so far searchable.
    async fn flush(&self, index: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

#[async_trait]
pub trait VectorSink: Send + Sync {
    async fn ensure_collection(&self, collection: &str, dim: usize) -> Result<(), StoreError>;

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct ChunkIndexer {
    normalizer: Arc<TextNormalizer>,
    lexical: Arc<dyn LexicalSink>,
    vectors: Option<(Arc<dyn VectorSink>, Arc<dyn EmbeddingProvider>)>,
}

impl ChunkIndexer {
    /// Lexical-only indexer; call [`Self::with_vectors`] to also fill the vector collection.
    pub fn new(normalizer: Arc<TextNormalizer>, lexical: Arc<dyn LexicalSink>) -> Self {
        Self {
            normalizer,
            lexical,
            vectors: None,
        }
    }

    pub fn with_vectors(
        mut self,
        sink: Arc<dyn VectorSink>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        self.vectors = Some((sink, embedder));
        self
    }

    pub async fn index(
        &self,
        records: &[ChunkRecord],
        lexical_index: &str,
        vector_collection: &str,
    ) -> Result<IndexReport, StoreError> {
        let mut report = IndexReport::default();
        let mut documents = Vec::with_capacity(records.len());
        let mut points = Vec::new();

        for record in records {
            if record.chunk_text.trim().is_empty() {
                report.skipped += 1;
                continue;
            }
            let id = resolve_point_id(record.id.as_deref());
            if let Some((_, embedder)) = &self.vectors {
                match embedder.embed(&record.chunk_text).await {
                    Ok(vector) => points.push(VectorPoint {
                        id: id.clone(),
                        vector,
                        payload: ChunkPayload {
                            chunk_text: record.chunk_text.clone(),
                            metadata: record.metadata.clone(),
                        },
                    }),
                    Err(err) => {
                        tracing::warn!(id = %id, error = %err, "embedding failed, skipping chunk");
                        report.failed += 1;
                        continue;
                    }
                }
            }
            documents.push((id, self.normalizer.normalize(&record.chunk_text)));
        }

        if let Some((sink, embedder)) = &self.vectors
            && let Some(first) = points.first()
        {
            let dim = embedder.dimension().unwrap_or(first.vector.len());
            sink.ensure_collection(vector_collection, dim).await?;
            sink.upsert(vector_collection, points).await?;
        }

        self.lexical.prepare_index(lexical_index).await?;
        for (doc_id, text) in &documents {
            self.lexical.put_document(lexical_index, doc_id, text).await?;
        }
        self.lexical.flush(lexical_index).await?;

        report.indexed = documents.len();
        tracing::info!(
            lexical_index,
            vector_collection,
            indexed = report.indexed,
            skipped = report.skipped,
            failed = report.failed,
            "chunks indexed"
        );
        Ok(report)
    }
}

/// Point id for a record: unsigned integers and UUIDs are kept, any other
/// string maps to a stable UUIDv5, and a missing id gets a random UUIDv4.
pub fn resolve_point_id(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|id| !id.is_empty()) else {
        return Uuid::new_v4().to_string();
    };
    if let Ok(num) = raw.parse::<u64>() {
        return num.to_string();
    }
    match Uuid::parse_str(raw) {
        Ok(uuid) => uuid.hyphenated().to_string(),
        Err(_) => Uuid::new_v5(&Uuid::NAMESPACE_OID, raw.as_bytes()).to_string(),
    }
}
