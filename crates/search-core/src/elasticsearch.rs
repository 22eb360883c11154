use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::StoreError,
    indexer::LexicalSink,
    lexical::{LexicalHit, LexicalStore},
};

/// Lexical store backed by an Elasticsearch cluster over its REST API.
///
/// Indexes map `doc_id` as a stored keyword and `text` as analysed text; the
/// BM25 `(k1, b)` pair is fixed when the index is created.
pub struct ElasticsearchLexicalStore {
    client: reqwest::Client,
    base: Url,
    timeout: Duration,
    bm25: (f32, f32),
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(default)]
    fields: HitFields,
}

#[derive(Deserialize, Default)]
struct HitFields {
    #[serde(default)]
    doc_id: Vec<String>,
}

impl ElasticsearchLexicalStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let base = Url::parse(base_url).map_err(|err| {
            StoreError::Query(format!("invalid elasticsearch url `{base_url}`: {err}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Query(format!(
                "elasticsearch url `{base_url}` cannot carry a path"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StoreError::Unreachable(err.to_string()))?;
        Ok(Self {
            client,
            base,
            timeout,
            bm25: (1.2, 0.75),
        })
    }

    /// BM25 parameters used for indexes created through [`LexicalSink::prepare_index`].
    pub fn with_bm25(mut self, k1: f32, b: f32) -> Self {
        self.bm25 = (k1, b);
        self
    }

    /// Creates `index` with the chunk mapping and a BM25 similarity.
    pub async fn create_index(&self, index: &str, k1: f32, b: f32) -> Result<(), StoreError> {
        let body = json!({
            "settings": {
                "index": {
                    "similarity": {
                        "default": { "type": "BM25", "k1": k1, "b": b }
                    }
                }
            },
            "mappings": {
                "properties": {
                    "doc_id": { "type": "keyword", "store": true },
                    "text": { "type": "text" }
                }
            }
        });
        let response = self
            .send(self.request(Method::PUT, &[index])?.json(&body))
            .await?;
        expect_success(index, response).await.map(|_| ())
    }

    pub async fn index_document(
        &self,
        index: &str,
        doc_id: &str,
        text: &str,
    ) -> Result<(), StoreError> {
        let body = json!({ "doc_id": doc_id, "text": text });
        let response = self
            .send(self.request(Method::PUT, &[index, "_doc", doc_id])?.json(&body))
            .await?;
        expect_success(index, response).await.map(|_| ())
    }

    pub async fn refresh(&self, index: &str) -> Result<(), StoreError> {
        let response = self
            .send(self.request(Method::POST, &[index, "_refresh"])?)
            .await?;
        expect_success(index, response).await.map(|_| ())
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Query("elasticsearch url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(self.client.request(method, url))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StoreError> {
        request.send().await.map_err(|err| {
            if err.is_timeout() {
                StoreError::Timeout(self.timeout)
            } else {
                StoreError::Unreachable(err.to_string())
            }
        })
    }
}

async fn expect_success(
    index: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(StoreError::MissingIndex(index.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Query(format!("status {}: {body}", status.as_u16())))
}

#[async_trait]
impl LexicalStore for ElasticsearchLexicalStore {
    async fn search(
        &self,
        index: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<LexicalHit>, StoreError> {
        let body = json!({
            "size": limit,
            "query": { "match": { "text": query } },
            "stored_fields": ["doc_id"]
        });
        let response = self
            .send(self.request(Method::POST, &[index, "_search"])?.json(&body))
            .await?;
        let decoded = expect_success(index, response)
            .await?
            .json::<SearchResponse>()
            .await
            .map_err(|err| StoreError::Decode(err.to_string()))?;

        Ok(decoded
            .hits
            .hits
            .into_iter()
            .filter_map(|hit| {
                let doc_id = hit.fields.doc_id.into_iter().next().or(hit.id)?;
                Some(LexicalHit {
                    doc_id,
                    score: hit.score.unwrap_or(0.0),
                })
            })
            .collect())
    }

    async fn exists(&self, index: &str) -> Result<bool, StoreError> {
        let response = self.send(self.request(Method::HEAD, &[index])?).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StoreError::Query(format!(
                "index existence check returned status {}",
                status.as_u16()
            ))),
        }
    }
}

#[async_trait]
impl LexicalSink for ElasticsearchLexicalStore {
    async fn prepare_index(&self, index: &str) -> Result<(), StoreError> {
        if self.exists(index).await? {
            return Ok(());
        }
        tracing::info!(index, k1 = self.bm25.0, b = self.bm25.1, "creating elasticsearch index");
        self.create_index(index, self.bm25.0, self.bm25.1).await
    }

    async fn put_document(&self, index: &str, doc_id: &str, text: &str) -> Result<(), StoreError> {
        self.index_document(index, doc_id, text).await
    }

    async fn flush(&self, index: &str) -> Result<(), StoreError> {
        self.refresh(index).await
    }
}
