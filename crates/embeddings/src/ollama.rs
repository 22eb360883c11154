use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    config::EmbeddingConfig,
    provider::{EmbeddingError, EmbeddingProvider},
};

pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    vector_dim: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/api/embeddings", config.endpoint()),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            vector_dim: config.vector_dim,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let mut request = self.client.post(&self.url).json(&EmbeddingRequest {
            model: &self.model,
            prompt: text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded = response
            .json::<EmbeddingResponse>()
            .await
            .map_err(|err| EmbeddingError::Decode(err.to_string()))?;
        if decoded.embedding.is_empty() {
            return Err(EmbeddingError::Decode("empty embedding".to_string()));
        }
        if self.vector_dim != 0 && decoded.embedding.len() != self.vector_dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.vector_dim,
                actual: decoded.embedding.len(),
            });
        }
        Ok(decoded.embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        (self.vector_dim != 0).then_some(self.vector_dim)
    }
}
