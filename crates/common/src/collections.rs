use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// The lexical index and vector collection that back one logical collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionPair {
    #[serde(alias = "qdrant_collection")]
    pub vector_collection: String,
    #[serde(alias = "es_index")]
    pub lexical_index: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown collection '{name}', available: {available:?}")]
pub struct UnknownCollection {
    pub name: String,
    pub available: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CollectionRegistry {
    entries: BTreeMap<String, CollectionPair>,
}

impl CollectionRegistry {
    /// Reads `collections.json`. A missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "collection registry not found, starting empty");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading collection registry: {}", path.display()))?;
        let registry = serde_json::from_str::<Self>(&raw)
            .with_context(|| format!("failed parsing collection registry: {}", path.display()))?;
        tracing::debug!(count = registry.entries.len(), "loaded collection registry");
        Ok(registry)
    }

    pub fn insert(&mut self, name: impl Into<String>, pair: CollectionPair) {
        self.entries.insert(name.into(), pair);
    }

    pub fn get(&self, name: &str) -> Result<&CollectionPair, UnknownCollection> {
        self.entries.get(name).ok_or_else(|| UnknownCollection {
            name: name.to_string(),
            available: self.names(),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CollectionPair)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
