use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("embedding provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("embedding response could not be decoded: {0}")]
    Decode(String),
    #[error("embedding dimension {actual} does not match collection dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("refusing to embed empty text")]
    EmptyInput,
}

/// Text to dense vector.
///
/// The provider must use the same model and dimension that populated the
/// vector collection; similarity scores are meaningless otherwise and nothing
/// at query time can detect the mismatch beyond the dimension check.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn model_name(&self) -> &str;

    /// Fixed output dimension when known up front.
    fn dimension(&self) -> Option<usize>;
}
