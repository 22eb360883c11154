//! Hybrid retrieval: BM25 and dense vector search fused with weighted
//! Reciprocal Rank Fusion, then hydrated from the vector collection.

pub mod backends;
pub mod chunk_store;
pub mod elasticsearch;
pub mod error;
pub mod fusion;
pub mod indexer;
pub mod lexical;
pub mod normalizer;
pub mod qdrant;
pub mod retrieval;
pub mod tantivy_index;
pub mod vector;

pub use backends::Backends;
pub use chunk_store::ChunkStoreAccessor;
pub use error::{FusionConfigError, RetrieveError, StoreError};
pub use fusion::{FusionParams, fuse};
pub use indexer::{ChunkIndexer, IndexReport, LexicalSink, VectorPoint, VectorSink};
pub use lexical::{LexicalHit, LexicalSearchAdapter, LexicalStore};
pub use normalizer::TextNormalizer;
pub use retrieval::HybridRetriever;
pub use vector::{VectorHit, VectorSearchAdapter, VectorStore};
