use std::time::Duration;

use common::config::{AppConfig, EmbeddingProviderKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub base_url: String,
    pub cloud_host: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Dimension of the vector collection. Ollama responses of another size are rejected.
    pub vector_dim: usize,
    pub request_timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Ollama,
            base_url: "http://localhost:11434".to_string(),
            cloud_host: "https://ollama.com".to_string(),
            api_key: None,
            model: "embeddinggemma".to_string(),
            vector_dim: 768,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl EmbeddingConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.embedding.provider,
            base_url: cfg.embedding.base_url.clone(),
            cloud_host: cfg.embedding.cloud_host.clone(),
            api_key: cfg.embedding.api_key.clone(),
            model: cfg.embedding.model.clone(),
            vector_dim: cfg.vector.vector_dim,
            ..Self::default()
        }
    }

    /// Cloud host when an API key is configured, local daemon otherwise.
    pub fn endpoint(&self) -> &str {
        if self.uses_cloud() {
            self.cloud_host.trim_end_matches('/')
        } else {
            self.base_url.trim_end_matches('/')
        }
    }

    pub fn uses_cloud(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::EmbeddingConfig;

    #[test]
    fn local_endpoint_without_api_key() {
        let cfg = EmbeddingConfig {
            base_url: "http://ollama:11434/".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(!cfg.uses_cloud());
        assert_eq!(cfg.endpoint(), "http://ollama:11434");
    }

    #[test]
    fn cloud_endpoint_when_api_key_set() {
        let cfg = EmbeddingConfig {
            api_key: Some("secret".to_string()),
            ..EmbeddingConfig::default()
        };
        assert!(cfg.uses_cloud());
        assert_eq!(cfg.endpoint(), "https://ollama.com");
    }
}
