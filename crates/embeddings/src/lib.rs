pub mod config;
pub mod hashed;
pub mod ollama;
pub mod provider;

use std::sync::Arc;

use common::config::EmbeddingProviderKind;

pub use config::EmbeddingConfig;
pub use hashed::HashedEmbedder;
pub use ollama::OllamaEmbedder;
pub use provider::{EmbeddingError, EmbeddingProvider};

pub fn build_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider {
        EmbeddingProviderKind::Ollama => {
            tracing::debug!(
                endpoint = config.endpoint(),
                model = %config.model,
                cloud = config.uses_cloud(),
                "using ollama embeddings"
            );
            Ok(Arc::new(OllamaEmbedder::new(config)?))
        }
        EmbeddingProviderKind::Pseudo => {
            tracing::warn!(
                dim = config.vector_dim,
                "using hashed pseudo-embeddings, similarity scores carry no meaning"
            );
            Ok(Arc::new(HashedEmbedder::new(config.vector_dim)))
        }
    }
}
