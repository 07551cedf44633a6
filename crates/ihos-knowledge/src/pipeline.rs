//! Knowledge ingestion and retrieval.
//!
//! `ingest` chunks a document, embeds every chunk in one batch and writes
//! the chunks to the managed collection. `query` embeds a question and
//! returns the closest chunks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::chunker::split_text;
use crate::embedding::DynEmbeddingService;
use crate::error::KnowledgeError;
use crate::manager::VectorIndexManager;
use crate::store::{ChunkRecord, SearchHit};

/// Default number of matches for [`KnowledgePipeline::query`].
pub const DEFAULT_TOP_K: usize = 3;

/// Default cut-off for match text.
pub const DEFAULT_MAX_MATCH_CHARS: usize = 500;

const OUTPUT_FIELDS: [&str; 3] = ["doc_id", "chunk_index", "text"];

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub collection: String,
    pub chunk_count: usize,
    pub inserted_ids: Vec<i64>,
}

/// One retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: i64,
    pub doc_id: Option<String>,
    pub chunk_index: Option<i64>,
    /// Chunk text cut to the configured number of characters.
    pub text: String,
    pub distance: f32,
}

/// Ranked matches for a query; `best_match` repeats the first entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub matches: Vec<QueryMatch>,
    pub best_match: Option<QueryMatch>,
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

fn to_match(hit: SearchHit, max_chars: usize) -> QueryMatch {
    let text = hit
        .fields
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default();
    QueryMatch {
        id: hit.id,
        doc_id: hit
            .fields
            .get("doc_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        chunk_index: hit.fields.get("chunk_index").and_then(Value::as_i64),
        text: truncate_chars(text, max_chars),
        distance: hit.distance,
    }
}

/// Composes chunking, embedding and the index manager.
pub struct KnowledgePipeline {
    embedder: Arc<dyn DynEmbeddingService>,
    index: Arc<VectorIndexManager>,
    max_match_chars: usize,
}

impl KnowledgePipeline {
    pub fn new(embedder: Arc<dyn DynEmbeddingService>, index: Arc<VectorIndexManager>) -> Self {
        Self {
            embedder,
            index,
            max_match_chars: DEFAULT_MAX_MATCH_CHARS,
        }
    }

    pub fn with_max_match_chars(mut self, max: usize) -> Self {
        self.max_match_chars = max;
        self
    }

    pub fn index(&self) -> &Arc<VectorIndexManager> {
        &self.index
    }

    /// Chunk, embed and store a document.
    ///
    /// Re-ingesting the same document adds a second, independent set of
    /// chunks. Index build and load failures after the insert are logged
    /// only; the next query rebuilds what is missing.
    pub async fn ingest(
        &self,
        doc_id: &str,
        text: &str,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<IngestReport, KnowledgeError> {
        let chunks = split_text(text, chunk_size, overlap);
        if chunks.is_empty() {
            debug!(doc_id, "Nothing to ingest");
            return Ok(IngestReport {
                doc_id: doc_id.to_string(),
                collection: self.index.collection().to_string(),
                chunk_count: 0,
                inserted_ids: Vec::new(),
            });
        }

        let embeddings = self.embedder.embed_batch_boxed(&chunks).await?;
        if embeddings.len() != chunks.len() {
            return Err(KnowledgeError::EmbeddingCountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        let dimension = embeddings.first().map(Vec::len).unwrap_or_default();
        self.index.ensure_collection(dimension, false).await?;

        let chunk_count = chunks.len();
        let rows = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| {
                ChunkRecord {
                    doc_id: doc_id.to_string(),
                    chunk_index: i as i64,
                    text,
                    embedding,
                }
                .into_row()
            })
            .collect();
        let inserted_ids = self.index.insert(rows).await?;

        if let Err(e) = self.index.create_index().await {
            warn!(doc_id, error = %e, "Index build after ingest failed");
        }
        if let Err(e) = self.index.load().await {
            warn!(doc_id, error = %e, "Collection load after ingest failed");
        }

        info!(doc_id, chunk_count, dimension, "Document ingested");
        Ok(IngestReport {
            doc_id: doc_id.to_string(),
            collection: self.index.collection().to_string(),
            chunk_count,
            inserted_ids,
        })
    }

    /// Nearest `k` chunks for `text`.
    pub async fn query(&self, text: &str, k: usize) -> Result<QueryResult, KnowledgeError> {
        if text.trim().is_empty() {
            return Err(KnowledgeError::InvalidInput("query text is empty".to_string()));
        }
        if !self.index.exists().await? {
            debug!(collection = %self.index.collection(), "Query before any ingest");
            return Ok(QueryResult {
                query: text.to_string(),
                matches: Vec::new(),
                best_match: None,
            });
        }
        let embedding = self.embedder.embed_boxed(text).await?;

        if let Err(e) = self.index.load().await {
            warn!(error = %e, "Collection load before query failed");
        }

        let output_fields = OUTPUT_FIELDS.iter().map(|f| f.to_string()).collect();
        let hits = self.index.search(embedding, k, None, output_fields).await?;
        let matches: Vec<QueryMatch> = hits
            .into_iter()
            .map(|hit| to_match(hit, self.max_match_chars))
            .collect();
        debug!(k, found = matches.len(), "Knowledge query");

        Ok(QueryResult {
            query: text.to_string(),
            best_match: matches.first().cloned(),
            matches,
        })
    }
}
