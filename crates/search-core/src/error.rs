use std::{future::Future, time::Duration};

use embeddings::EmbeddingError;

/// Why a backing store could not answer. Never crosses an adapter boundary;
/// adapters collapse it to an empty list or `None`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backing store unreachable: {0}")]
    Unreachable(String),
    #[error("index or collection `{0}` does not exist")]
    MissingIndex(String),
    #[error("query rejected by backing store: {0}")]
    Query(String),
    #[error("malformed response from backing store: {0}")]
    Decode(String),
    #[error("backing store call timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Contract violations by the caller of `retrieve`; these are surfaced, not absorbed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RetrieveError {
    #[error("top_k must be at least 1")]
    InvalidTopK,
    #[error("query must not be empty")]
    EmptyQuery,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FusionConfigError {
    #[error("rrf_k must be at least 1")]
    ZeroRrfK,
    #[error("{name} must be a finite, non-negative number, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },
}

/// Runs one collaborator call under a deadline, mapping expiry to [`StoreError::Timeout`].
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}
