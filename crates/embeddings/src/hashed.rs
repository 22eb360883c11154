use async_trait::async_trait;

use crate::provider::{EmbeddingError, EmbeddingProvider};

/// Deterministic byte-folding embedder for offline runs and tests.
///
/// Identical text always maps to the identical vector; anything beyond that
/// carries no semantics.
pub struct HashedEmbedder {
    dim: usize,
}

impl HashedEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_sync(&self, input: &str) -> Vec<f32> {
        let mut out = vec![0.0f32; self.dim];
        let n = out.len();
        for (idx, b) in input.as_bytes().iter().enumerate() {
            out[idx % n] += f32::from(*b) / 255.0;
        }
        out
    }
}

#[async_trait]
impl EmbeddingProvider for HashedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        Ok(self.embed_sync(text))
    }

    fn model_name(&self) -> &str {
        "hashed"
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dim)
    }
}
