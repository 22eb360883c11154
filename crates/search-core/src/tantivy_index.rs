use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use ahash::AHashMap;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tantivy::schema::Value;
use tantivy::{
    Index, IndexReader, IndexWriter, TantivyDocument, Term,
    collector::TopDocs,
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::{Field, IndexRecordOption, STORED, STRING, Schema, TEXT},
    tokenizer::TokenStream,
};

use crate::{
    error::StoreError,
    indexer::LexicalSink,
    lexical::{LexicalHit, LexicalStore},
};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// One tantivy index holding `doc_id` (stored, untokenized) and `text`
/// (pre-normalized, BM25-scored).
pub struct TantivyLexicalIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    fields: TantivyFields,
}

#[derive(Clone, Copy)]
struct TantivyFields {
    doc_id: Field,
    text: Field,
}

impl TantivyLexicalIndex {
    pub fn new_in_memory() -> Result<Self> {
        from_index(Index::create_in_ram(build_schema()))
    }

    pub fn open_or_create_on_disk(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;
        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir)?
        } else {
            Index::create_in_dir(index_dir, build_schema())?
        };
        from_index(index)
    }

    pub fn open_existing(index_dir: &Path) -> Result<Self> {
        from_index(Index::open_in_dir(index_dir)?)
    }

    /// Adds or replaces the document stored under `doc_id`. Visible after [`Self::commit`].
    pub fn add_document(&self, doc_id: &str, normalized_text: &str) -> Result<()> {
        let mut doc = TantivyDocument::default();
        doc.add_text(self.fields.doc_id, doc_id);
        doc.add_text(self.fields.text, normalized_text);
        self.with_writer(|writer| {
            writer.delete_term(Term::from_field_text(self.fields.doc_id, doc_id));
            writer.add_document(doc)?;
            Ok(())
        })
    }

    pub fn reset(&self) -> Result<()> {
        self.with_writer(|writer| {
            writer.delete_all_documents()?;
            writer.commit()?;
            Ok(())
        })?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.with_writer(|writer| {
            writer.commit()?;
            Ok(())
        })?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Ranks documents against already-normalized query text.
    ///
    /// The text goes through the `text` field's own analyzer and every
    /// resulting term becomes an optional clause, so any shared term matches
    /// and BM25 orders the hits.
    pub fn search(&self, normalized_query: &str, top_k: usize) -> Result<Vec<LexicalHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let clauses = self.query_terms(normalized_query)?;
        if clauses.is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query = BooleanQuery::new(clauses);
        let docs = searcher.search(&query, &TopDocs::with_limit(top_k))?;

        let mut out = Vec::with_capacity(docs.len());
        for (score, address) in docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let doc_id = doc
                .get_first(self.fields.doc_id)
                .and_then(|value| value.as_value().as_str())
                .unwrap_or_default();
            if !doc_id.is_empty() {
                out.push(LexicalHit {
                    doc_id: doc_id.to_string(),
                    score,
                });
            }
        }
        Ok(out)
    }

    fn query_terms(&self, text: &str) -> Result<Vec<(Occur, Box<dyn Query>)>> {
        let mut analyzer = self.index.tokenizer_for_field(self.fields.text)?;
        let mut stream = analyzer.token_stream(text);
        let mut seen = Vec::<String>::new();
        while stream.advance() {
            let token = stream.token().text.clone();
            if !seen.contains(&token) {
                seen.push(token);
            }
        }
        Ok(seen
            .into_iter()
            .map(|token| {
                let term = Term::from_field_text(self.fields.text, &token);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect())
    }

    fn with_writer<T>(&self, write: impl FnOnce(&mut IndexWriter) -> Result<T>) -> Result<T> {
        let mut guard = self.writer.lock();
        if guard.is_none() {
            *guard = Some(self.index.writer(WRITER_HEAP_BYTES)?);
        }
        match guard.as_mut() {
            Some(writer) => write(writer),
            None => anyhow::bail!("index writer unavailable"),
        }
    }
}

fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    let _ = schema_builder.add_text_field("doc_id", STRING | STORED);
    let _ = schema_builder.add_text_field("text", TEXT);
    schema_builder.build()
}

fn from_index(index: Index) -> Result<TantivyLexicalIndex> {
    let schema = index.schema();
    let doc_id = schema.get_field("doc_id")?;
    let text = schema.get_field("text")?;
    let reader = index.reader()?;
    Ok(TantivyLexicalIndex {
        index,
        reader,
        writer: Mutex::new(None),
        fields: TantivyFields { doc_id, text },
    })
}

/// Named tantivy indexes, either as subdirectories of a root directory or
/// held in memory.
pub struct TantivyLexicalStore {
    root: Option<PathBuf>,
    indexes: RwLock<AHashMap<String, Arc<TantivyLexicalIndex>>>,
}

impl TantivyLexicalStore {
    pub fn on_disk(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            indexes: RwLock::new(AHashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            root: None,
            indexes: RwLock::new(AHashMap::new()),
        }
    }

    /// Opens an existing index, `None` if there is no index by that name.
    pub fn open(&self, name: &str) -> Result<Option<Arc<TantivyLexicalIndex>>, StoreError> {
        validate_index_name(name)?;
        if let Some(index) = self.indexes.read().get(name) {
            return Ok(Some(index.clone()));
        }
        let Some(dir) = self.index_dir(name) else {
            return Ok(None);
        };
        if !dir.join("meta.json").exists() {
            return Ok(None);
        }
        let opened = TantivyLexicalIndex::open_existing(&dir)
            .map_err(|err| StoreError::Unreachable(format!("{}: {err}", dir.display())))?;
        Ok(Some(self.remember(name, opened)))
    }

    pub fn open_or_create(&self, name: &str) -> Result<Arc<TantivyLexicalIndex>, StoreError> {
        if let Some(index) = self.open(name)? {
            return Ok(index);
        }
        let created = match self.index_dir(name) {
            Some(dir) => TantivyLexicalIndex::open_or_create_on_disk(&dir),
            None => TantivyLexicalIndex::new_in_memory(),
        }
        .map_err(|err| StoreError::Unreachable(err.to_string()))?;
        Ok(self.remember(name, created))
    }

    fn remember(&self, name: &str, index: TantivyLexicalIndex) -> Arc<TantivyLexicalIndex> {
        self.indexes
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(index))
            .clone()
    }

    fn index_dir(&self, name: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(name))
    }

    fn require(&self, name: &str) -> Result<Arc<TantivyLexicalIndex>, StoreError> {
        self.open(name)?
            .ok_or_else(|| StoreError::MissingIndex(name.to_string()))
    }
}

fn validate_index_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::Query(format!("invalid index name `{name}`")))
    }
}

#[async_trait]
impl LexicalStore for TantivyLexicalStore {
    async fn search(
        &self,
        index: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<LexicalHit>, StoreError> {
        let opened = self.require(index)?;
        let query = query.to_string();
        tokio::task::spawn_blocking(move || opened.search(&query, limit))
            .await
            .map_err(|err| StoreError::Query(err.to_string()))?
            .map_err(|err| StoreError::Query(err.to_string()))
    }

    async fn exists(&self, index: &str) -> Result<bool, StoreError> {
        Ok(self.open(index)?.is_some())
    }
}

#[async_trait]
impl LexicalSink for TantivyLexicalStore {
    async fn prepare_index(&self, index: &str) -> Result<(), StoreError> {
        self.open_or_create(index).map(|_| ())
    }

    async fn put_document(&self, index: &str, doc_id: &str, text: &str) -> Result<(), StoreError> {
        self.require(index)?
            .add_document(doc_id, text)
            .map_err(|err| StoreError::Query(err.to_string()))
    }

    async fn flush(&self, index: &str) -> Result<(), StoreError> {
        let opened = self.require(index)?;
        tokio::task::spawn_blocking(move || opened.commit())
            .await
            .map_err(|err| StoreError::Query(err.to_string()))?
            .map_err(|err| StoreError::Query(err.to_string()))
    }
}
