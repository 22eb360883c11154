pub mod collections;
pub mod config;

use schemars::JsonSchema;
use schemars::Schema;
use serde::{Deserialize, Serialize};

/// Which retrieval path surfaced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    Lexical,
    Vector,
}

/// Well-known chunk metadata keys plus an open bag for source-specific fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Chunk body as stored in the vector collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ChunkPayload {
    pub chunk_text: String,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

/// One per-method hit prior to fusion.
///
/// Vector candidates carry the stored payload; lexical candidates only know
/// their id and must be hydrated from the vector collection later.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub native_score: f32,
    pub method: RetrievalMethod,
    pub payload: Option<ChunkPayload>,
}

impl Candidate {
    pub fn lexical(id: impl Into<String>, native_score: f32) -> Self {
        Self {
            id: id.into(),
            native_score,
            method: RetrievalMethod::Lexical,
            payload: None,
        }
    }

    pub fn vector(id: impl Into<String>, native_score: f32, payload: Option<ChunkPayload>) -> Self {
        Self {
            id: id.into(),
            native_score,
            method: RetrievalMethod::Vector,
            payload,
        }
    }
}

/// Output of rank fusion for one unique id.
///
/// Ranks are 0-indexed positions in each method's score-sorted list.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FusedResult {
    pub id: String,
    pub fused_score: f64,
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,
}

/// Final retrieval unit handed to callers. Built fresh per query.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RetrievedChunk {
    pub id: String,
    pub chunk_text: String,
    pub metadata: ChunkMetadata,
    pub fused_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lexical_rank: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_rank: Option<usize>,
}

impl RetrievedChunk {
    pub fn from_parts(fused: FusedResult, payload: ChunkPayload) -> Self {
        Self {
            id: fused.id,
            chunk_text: payload.chunk_text,
            metadata: payload.metadata,
            fused_score: fused.fused_score,
            lexical_rank: fused.lexical_rank,
            vector_rank: fused.vector_rank,
        }
    }
}

/// A pre-chunked record as accepted by the chunk indexer (one JSON object per line).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ChunkRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub chunk_text: String,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SchemaBundle {
    pub retrieved_chunk: Schema,
    pub chunk_record: Schema,
    pub fused_result: Schema,
}

pub fn schema_bundle() -> SchemaBundle {
    SchemaBundle {
        retrieved_chunk: schemars::schema_for!(RetrievedChunk),
        chunk_record: schemars::schema_for!(ChunkRecord),
        fused_result: schemars::schema_for!(FusedResult),
    }
}
