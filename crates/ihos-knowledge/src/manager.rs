//! Collection lifecycle on top of a [`VectorStore`].
//!
//! The manager owns one collection name and adds the self-healing the
//! pipeline relies on: a one-time drop-and-recreate when inserts hit a
//! schema mismatch, and an index build when `load` finds no index.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use ihos_core::error::IhosError;

use crate::error::KnowledgeError;
use crate::store::{
    CollectionSchema, IndexSpec, Row, SearchHit, SearchRequest, VectorStore, PRIMARY_KEY_FIELD,
    VECTOR_FIELD,
};

/// Caller-supplied key fields removed before insert.
const STRIPPED_KEY_FIELDS: [&str; 2] = [PRIMARY_KEY_FIELD, "primary_key"];

/// True when a store error describes a primary-key or schema mismatch.
pub fn is_schema_mismatch(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("primary_key")
        || msg.contains("primary key")
        || msg.contains("schema mismatch")
        || msg.contains("dimension mismatch")
        || msg.contains("dim mismatch")
}

/// True when a load failed because the collection has no index yet.
pub fn is_missing_index(message: &str) -> bool {
    message.to_lowercase().contains("index not found")
}

/// Vector index manager shared by every ingestion and query in the process.
pub struct VectorIndexManager {
    store: Arc<dyn VectorStore>,
    collection: String,
    index: IndexSpec,
    migration_attempted: AtomicBool,
}

impl VectorIndexManager {
    pub fn new(store: Arc<dyn VectorStore>, collection: impl Into<String>, index: IndexSpec) -> Self {
        Self {
            store,
            collection: collection.into(),
            index,
            migration_attempted: AtomicBool::new(false),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn exists(&self) -> Result<bool, KnowledgeError> {
        Ok(self.store.has_collection(&self.collection).await?)
    }

    /// Whether the one-time drop-and-recreate has been used.
    pub fn migration_attempted(&self) -> bool {
        self.migration_attempted.load(Ordering::SeqCst)
    }

    /// Create the collection with `dimension` unless it exists. `force` drops
    /// an existing collection first.
    pub async fn ensure_collection(&self, dimension: usize, force: bool) -> Result<(), KnowledgeError> {
        let mut exists = self.store.has_collection(&self.collection).await?;
        if exists && force {
            self.store.drop_collection(&self.collection).await?;
            info!(collection = %self.collection, "Dropped collection for forced recreate");
            exists = false;
        }
        if exists {
            return Ok(());
        }
        self.store
            .create_collection(&self.collection, CollectionSchema::chunks(dimension))
            .await?;
        info!(collection = %self.collection, dimension, "Collection created");
        Ok(())
    }

    /// Insert rows, stripping caller-supplied primary keys.
    ///
    /// The first schema mismatch seen by this manager drops the collection,
    /// recreates it at the first row's embedding dimension and retries once.
    /// Any later mismatch is returned as [`KnowledgeError::SchemaMismatch`].
    pub async fn insert(&self, rows: Vec<Row>) -> Result<Vec<i64>, KnowledgeError> {
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|mut row| {
                for key in STRIPPED_KEY_FIELDS {
                    row.remove(key);
                }
                row
            })
            .collect();
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let err = match self.store.insert(&self.collection, rows.clone()).await {
            Ok(ids) => return Ok(ids),
            Err(e) => e,
        };
        let message = err.to_string();
        if !is_schema_mismatch(&message) {
            return Err(err.into());
        }

        if self
            .migration_attempted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(KnowledgeError::SchemaMismatch(message));
        }

        let dimension = rows
            .first()
            .and_then(|row| row.get(VECTOR_FIELD))
            .and_then(|v| v.as_array())
            .map(Vec::len)
            .filter(|d| *d > 0)
            .ok_or_else(|| KnowledgeError::SchemaMismatch(message.clone()))?;

        warn!(
            collection = %self.collection,
            dimension,
            error = %message,
            "Insert hit a schema mismatch; recreating collection"
        );
        self.ensure_collection(dimension, true).await?;

        self.store
            .insert(&self.collection, rows)
            .await
            .map_err(|e| match e {
                e if is_schema_mismatch(&e.to_string()) => KnowledgeError::SchemaMismatch(e.to_string()),
                e => KnowledgeError::Core(e),
            })
    }

    /// Build the default vector index. Safe to call repeatedly.
    pub async fn create_index(&self) -> Result<(), KnowledgeError> {
        self.store
            .create_index(&self.collection, &self.index)
            .await?;
        Ok(())
    }

    /// Load the collection, building the index and retrying once if it is missing.
    pub async fn load(&self) -> Result<(), KnowledgeError> {
        let err = match self.store.load(&self.collection).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if !is_missing_index(&err.to_string()) {
            return Err(err.into());
        }

        info!(collection = %self.collection, "No index on load; building default index");
        self.create_index().await?;
        self.store
            .load(&self.collection)
            .await
            .map_err(|e: IhosError| KnowledgeError::IndexUnavailable(e.to_string()))
    }

    /// Top-`k` nearest rows by ascending cosine distance.
    pub async fn search(
        &self,
        embedding: Vec<f32>,
        k: usize,
        filter: Option<String>,
        output_fields: Vec<String>,
    ) -> Result<Vec<SearchHit>, KnowledgeError> {
        let request = SearchRequest {
            vector: embedding,
            limit: k,
            filter,
            output_fields,
        };
        Ok(self.store.search(&self.collection, &request).await?)
    }
}
