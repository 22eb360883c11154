use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use common::config::{AppConfig, LexicalBackend};
use embeddings::{EmbeddingConfig, EmbeddingProvider, build_provider};

use crate::{
    chunk_store::ChunkStoreAccessor,
    elasticsearch::ElasticsearchLexicalStore,
    fusion::FusionParams,
    indexer::{ChunkIndexer, LexicalSink, VectorSink},
    lexical::{LexicalSearchAdapter, LexicalStore},
    normalizer::TextNormalizer,
    qdrant::QdrantVectorStore,
    retrieval::HybridRetriever,
    tantivy_index::TantivyLexicalStore,
    vector::{VectorSearchAdapter, VectorStore},
};

/// Process-wide collaborator handles, built once from configuration and
/// shared by the retriever and the indexer.
pub struct Backends {
    pub normalizer: Arc<TextNormalizer>,
    pub lexical_store: Arc<dyn LexicalStore>,
    pub lexical_sink: Arc<dyn LexicalSink>,
    pub vector_store: Arc<dyn VectorStore>,
    pub vector_sink: Arc<dyn VectorSink>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub fusion: FusionParams,
    pub timeout: Duration,
}

impl Backends {
    /// Needs a running tokio runtime for the qdrant client.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        anyhow::ensure!(
            config.retriever.timeout_ms > 0,
            "retriever.timeout_ms must be at least 1, every store call would time out"
        );
        let timeout = config.retriever_timeout();
        let normalizer = Arc::new(
            TextNormalizer::from_settings(&config.retriever).context("building text normalizer")?,
        );
        let fusion =
            FusionParams::from_settings(&config.retriever).context("invalid fusion settings")?;

        let (lexical_store, lexical_sink): (Arc<dyn LexicalStore>, Arc<dyn LexicalSink>) =
            match config.lexical.backend {
                LexicalBackend::Tantivy => {
                    let store = Arc::new(TantivyLexicalStore::on_disk(&config.lexical.tantivy_dir));
                    (store.clone(), store)
                }
                LexicalBackend::Elasticsearch => {
                    let store = Arc::new(
                        ElasticsearchLexicalStore::new(&config.lexical.elasticsearch_url, timeout)
                            .context("building elasticsearch client")?
                            .with_bm25(config.lexical.bm25_k1, config.lexical.bm25_b),
                    );
                    (store.clone(), store)
                }
            };

        let qdrant = Arc::new(
            QdrantVectorStore::connect(&config.vector.qdrant_url, timeout)
                .context("building qdrant client")?,
        );
        let embedder = build_provider(&EmbeddingConfig::from_app_config(config))
            .context("building embedding provider")?;

        tracing::debug!(
            backend = ?config.lexical.backend,
            qdrant = %config.vector.qdrant_url,
            model = embedder.model_name(),
            timeout_ms = timeout.as_millis() as u64,
            "backends configured"
        );
        Ok(Self {
            normalizer,
            lexical_store,
            lexical_sink,
            vector_store: qdrant.clone(),
            vector_sink: qdrant,
            embedder,
            fusion,
            timeout,
        })
    }

    pub fn retriever(&self) -> HybridRetriever {
        HybridRetriever::new(
            LexicalSearchAdapter::new(
                self.lexical_store.clone(),
                self.normalizer.clone(),
                self.timeout,
            ),
            VectorSearchAdapter::new(
                self.vector_store.clone(),
                self.embedder.clone(),
                self.timeout,
            ),
            ChunkStoreAccessor::new(self.vector_store.clone(), self.timeout),
            self.fusion,
        )
    }

    pub fn indexer(&self, lexical_only: bool) -> ChunkIndexer {
        let indexer = ChunkIndexer::new(self.normalizer.clone(), self.lexical_sink.clone());
        if lexical_only {
            indexer
        } else {
            indexer.with_vectors(self.vector_sink.clone(), self.embedder.clone())
        }
    }
}

impl HybridRetriever {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Backends::from_config(config)?.retriever())
    }
}
