use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use common::{ChunkMetadata, ChunkPayload};
use qdrant_client::{
    Qdrant, QdrantError,
    qdrant::{
        CollectionExistsRequest, CreateCollectionBuilder, Distance, GetPointsBuilder, ListValue,
        PointId, PointStruct, QueryPointsBuilder, Struct, UpsertPointsBuilder, Value,
        VectorParamsBuilder, point_id::PointIdOptions, value::Kind,
    },
};
use uuid::Uuid;

use crate::{
    error::StoreError,
    indexer::{VectorPoint, VectorSink},
    vector::{VectorHit, VectorStore},
};

const UPSERT_BATCH: usize = 64;

/// Vector store on a Qdrant server (gRPC), cosine distance.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Builds the client; no connection is made until the first call.
    pub fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url)
            .timeout(timeout)
            .skip_compatibility_check()
            .build()
            .map_err(|err| StoreError::Unreachable(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn query_by_vector(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<VectorHit>, StoreError> {
        let response = self
            .client
            .query(
                QueryPointsBuilder::new(collection)
                    .query(vector)
                    .limit(limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|err| classify(collection, err))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = render_point_id(point.id.as_ref()?)?;
                let payload = match decode_payload(point.payload) {
                    Ok(payload) => Some(payload),
                    Err(err) => {
                        tracing::debug!(
                            collection,
                            id = %id,
                            error = %err,
                            "undecodable payload on vector hit"
                        );
                        None
                    }
                };
                Some(VectorHit {
                    id,
                    score: point.score,
                    payload,
                })
            })
            .collect())
    }

    async fn retrieve_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<ChunkPayload>, StoreError> {
        let point_id = parse_point_id(id)?;
        let response = self
            .client
            .get_points(GetPointsBuilder::new(collection, vec![point_id]).with_payload(true))
            .await
            .map_err(|err| classify(collection, err))?;

        match response.result.into_iter().next() {
            Some(point) => decode_payload(point.payload).map(Some),
            None => Ok(None),
        }
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        self.client
            .collection_exists(CollectionExistsRequest {
                collection_name: collection.to_string(),
            })
            .await
            .map_err(|err| classify(collection, err))
    }
}

#[async_trait]
impl VectorSink for QdrantVectorStore {
    async fn ensure_collection(&self, collection: &str, dim: usize) -> Result<(), StoreError> {
        if self.collection_exists(collection).await? {
            return Ok(());
        }
        tracing::info!(collection, dim, "creating qdrant collection");
        let result = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, Distance::Cosine)),
            )
            .await;
        if let Err(err) = result {
            let msg = err.to_string().to_lowercase();
            if !msg.contains("already exists") {
                return Err(classify(collection, err));
            }
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), StoreError> {
        let mut structs = Vec::with_capacity(points.len());
        for point in points {
            structs.push(PointStruct::new(
                parse_point_id(&point.id)?,
                point.vector,
                [
                    ("chunk_text", Value::from(point.payload.chunk_text)),
                    ("metadata", metadata_value(&point.payload.metadata)?),
                ],
            ));
        }
        for batch in structs.chunks(UPSERT_BATCH) {
            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, batch.to_vec()).wait(true))
                .await
                .map_err(|err| classify(collection, err))?;
        }
        Ok(())
    }
}

fn classify(collection: &str, err: QdrantError) -> StoreError {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("not found")
        || lowered.contains("doesn't exist")
        || lowered.contains("does not exist")
    {
        StoreError::MissingIndex(collection.to_string())
    } else if lowered.contains("unavailable")
        || lowered.contains("transport")
        || lowered.contains("connect")
        || lowered.contains("deadline")
    {
        StoreError::Unreachable(message)
    } else {
        StoreError::Query(message)
    }
}

/// Qdrant only accepts unsigned integers and UUIDs as point ids.
pub fn parse_point_id(id: &str) -> Result<PointId, StoreError> {
    let options = if let Ok(num) = id.parse::<u64>() {
        PointIdOptions::Num(num)
    } else if let Ok(uuid) = Uuid::parse_str(id) {
        PointIdOptions::Uuid(uuid.hyphenated().to_string())
    } else {
        return Err(StoreError::Query(format!(
            "`{id}` is neither an unsigned integer nor a uuid"
        )));
    };
    Ok(PointId {
        point_id_options: Some(options),
    })
}

pub fn render_point_id(id: &PointId) -> Option<String> {
    match id.point_id_options.as_ref()? {
        PointIdOptions::Num(num) => Some(num.to_string()),
        PointIdOptions::Uuid(uuid) => Some(uuid.clone()),
    }
}

/// Decodes a stored `{chunk_text, metadata, hash?}` payload.
///
/// Older points keep `hash` at the top level; it is moved into the metadata
/// when the metadata has none.
pub fn decode_payload(payload: HashMap<String, Value>) -> Result<ChunkPayload, StoreError> {
    let mut fields = payload
        .into_iter()
        .map(|(key, value)| (key, to_json(value)))
        .collect::<serde_json::Map<_, _>>();

    let chunk_text = match fields.remove("chunk_text") {
        Some(serde_json::Value::String(text)) => text,
        Some(_) => return Err(StoreError::Decode("chunk_text is not a string".to_string())),
        None => return Err(StoreError::Decode("payload has no chunk_text".to_string())),
    };
    let mut metadata = match fields.remove("metadata") {
        None | Some(serde_json::Value::Null) => ChunkMetadata::default(),
        Some(value) => serde_json::from_value::<ChunkMetadata>(value)
            .map_err(|err| StoreError::Decode(format!("metadata: {err}")))?,
    };
    if metadata.hash.is_none()
        && let Some(serde_json::Value::String(hash)) = fields.remove("hash")
    {
        metadata.hash = Some(hash);
    }

    Ok(ChunkPayload {
        chunk_text,
        metadata,
    })
}

fn metadata_value(metadata: &ChunkMetadata) -> Result<Value, StoreError> {
    serde_json::to_value(metadata)
        .map(from_json)
        .map_err(|err| StoreError::Decode(format!("metadata: {err}")))
}

pub fn to_json(value: Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(to_json).collect())
        }
        Some(Kind::StructValue(object)) => serde_json::Value::Object(
            object
                .fields
                .into_iter()
                .map(|(key, value)| (key, to_json(value)))
                .collect(),
        ),
    }
}

pub fn from_json(value: serde_json::Value) -> Value {
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Kind::StringValue(s),
        serde_json::Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(from_json).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect(),
        }),
    };
    Value { kind: Some(kind) }
}
