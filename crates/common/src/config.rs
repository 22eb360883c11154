use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub collections_path: String,
    pub lexical: LexicalConfig,
    pub vector: VectorConfig,
    pub embedding: EmbeddingSettings,
    pub retriever: RetrieverSettings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LexicalBackend {
    Tantivy,
    Elasticsearch,
}

impl LexicalBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tantivy" => Some(Self::Tantivy),
            "elasticsearch" | "es" => Some(Self::Elasticsearch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LexicalConfig {
    pub backend: LexicalBackend,
    pub elasticsearch_url: String,
    pub tantivy_dir: String,
    pub bm25_k1: f32,
    pub bm25_b: f32,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            backend: LexicalBackend::Tantivy,
            elasticsearch_url: "http://localhost:9200".to_string(),
            tantivy_dir: ".rag/lexical".to_string(),
            bm25_k1: 1.2,
            bm25_b: 0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VectorConfig {
    pub qdrant_url: String,
    pub vector_dim: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            vector_dim: 768,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Ollama,
    Pseudo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub base_url: String,
    pub cloud_host: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Ollama,
            base_url: "http://localhost:11434".to_string(),
            cloud_host: "https://ollama.com".to_string(),
            api_key: None,
            model: "embeddinggemma".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrieverSettings {
    pub default_top_k: usize,
    pub bm25_weight: f32,
    pub vector_weight: f32,
    pub rrf_k: u32,
    pub timeout_ms: u64,
    pub language: String,
    pub lemma_dictionary: Option<String>,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            bm25_weight: 0.5,
            vector_weight: 0.5,
            rrf_k: 60,
            timeout_ms: 3_000,
            language: "french".to_string(),
            lemma_dictionary: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            collections_path: "collections.json".to_string(),
            lexical: LexicalConfig::default(),
            vector: VectorConfig::default(),
            embedding: EmbeddingSettings::default(),
            retriever: RetrieverSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed reading config file: {}", path.display()))?;
            toml::from_str::<Self>(&raw)
                .with_context(|| format!("failed parsing config file: {}", path.display()))?
        } else {
            Self::default()
        };
        cfg.apply_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Applies environment-style overrides. Unparsable numbers keep the current value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("RAG_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(path) = lookup("RAG_COLLECTIONS_PATH") {
            self.collections_path = path;
        }
        if let Some(backend) = lookup("LEXICAL_BACKEND")
            .as_deref()
            .and_then(LexicalBackend::parse)
        {
            self.lexical.backend = backend;
        }
        if let Some(url) = lookup("ELASTICSEARCH_URL") {
            self.lexical.elasticsearch_url = url;
        }
        if let Some(dir) = lookup("TANTIVY_DIR") {
            self.lexical.tantivy_dir = dir;
        }
        if let Some(url) = lookup("QDRANT_URL") {
            self.vector.qdrant_url = url;
        }
        if let Some(provider) = lookup("EMBED_PROVIDER") {
            match provider.trim().to_ascii_lowercase().as_str() {
                "ollama" => self.embedding.provider = EmbeddingProviderKind::Ollama,
                "pseudo" => self.embedding.provider = EmbeddingProviderKind::Pseudo,
                other => tracing::warn!(provider = other, "ignoring unknown EMBED_PROVIDER"),
            }
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.embedding.base_url = url;
        }
        if let Some(key) = lookup("OLLAMA_API_KEY").filter(|k| !k.is_empty()) {
            self.embedding.api_key = Some(key);
        }
        if let Some(model) = lookup("EMBED_MODEL") {
            self.embedding.model = model;
        }

        let retriever = &mut self.retriever;
        if let Some(top_k) = lookup("RETRIEVER_TOP_K") {
            retriever.default_top_k = top_k.parse().unwrap_or(retriever.default_top_k);
        }
        if let Some(weight) = lookup("BM25_WEIGHT") {
            retriever.bm25_weight = weight.parse().unwrap_or(retriever.bm25_weight);
        }
        if let Some(weight) = lookup("VECTOR_WEIGHT") {
            retriever.vector_weight = weight.parse().unwrap_or(retriever.vector_weight);
        }
        if let Some(rrf_k) = lookup("RRF_K") {
            retriever.rrf_k = rrf_k.parse().unwrap_or(retriever.rrf_k);
        }
        if let Some(timeout) = lookup("RETRIEVER_TIMEOUT_MS") {
            retriever.timeout_ms = timeout.parse().unwrap_or(retriever.timeout_ms);
        }
        if let Some(language) = lookup("LEMMATIZER_LANGUAGE") {
            retriever.language = language;
        }
        if let Some(path) = lookup("LEMMA_DICTIONARY") {
            retriever.lemma_dictionary = Some(path);
        }
    }

    pub fn retriever_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retriever.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, fs};

    use super::{AppConfig, EmbeddingProviderKind, LexicalBackend};

    #[test]
    fn loads_default_when_file_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = AppConfig::load(&dir.path().join("does-not-exist.toml")).expect("config");
        assert_eq!(cfg.retriever.rrf_k, 60);
        assert_eq!(cfg.lexical.backend, LexicalBackend::Tantivy);
    }

    #[test]
    fn loads_partial_toml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rag.toml");
        fs::write(
            &path,
            "log_level = 'debug'\n[lexical]\nbackend = 'elasticsearch'\n[retriever]\nbm25_weight = 0.7\nrrf_k = 20\n",
        )
        .expect("write");

        let mut cfg = AppConfig::load(&path).expect("config");
        cfg.apply_overrides(|_| None);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.lexical.backend, LexicalBackend::Elasticsearch);
        assert_eq!(cfg.lexical.elasticsearch_url, "http://localhost:9200");
        assert!((cfg.retriever.bm25_weight - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.retriever.rrf_k, 20);
        assert_eq!(cfg.retriever.default_top_k, 5);
    }

    #[test]
    fn overrides_replace_file_values_and_skip_garbage() {
        let env = HashMap::from([
            ("QDRANT_URL", "http://qdrant:6334"),
            ("RRF_K", "not-a-number"),
            ("VECTOR_WEIGHT", "0.25"),
            ("EMBED_PROVIDER", "pseudo"),
            ("OLLAMA_API_KEY", ""),
        ]);
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(cfg.vector.qdrant_url, "http://qdrant:6334");
        assert_eq!(cfg.retriever.rrf_k, 60);
        assert!((cfg.retriever.vector_weight - 0.25).abs() < f32::EPSILON);
        assert_eq!(cfg.embedding.provider, EmbeddingProviderKind::Pseudo);
        assert!(cfg.embedding.api_key.is_none());
    }
}
