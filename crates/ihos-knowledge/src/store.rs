//! Vector store abstraction and the in-memory backend.
//!
//! The in-memory store answers with brute-force cosine distance and mimics
//! the failure modes of a remote vector database: inserts are checked
//! against the collection schema, `load` needs an index, and `search` needs
//! a loaded collection.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use ihos_core::error::IhosError;

/// One entity as written to or read from a collection.
pub type Row = Map<String, Value>;

pub const PRIMARY_KEY_FIELD: &str = "id";
pub const VECTOR_FIELD: &str = "embedding";

/// A chunk of a document with its embedding, before insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub doc_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl ChunkRecord {
    pub fn into_row(self) -> Row {
        let mut row = Row::new();
        row.insert("doc_id".to_string(), json!(self.doc_id));
        row.insert("chunk_index".to_string(), json!(self.chunk_index));
        row.insert("text".to_string(), json!(self.text));
        row.insert(VECTOR_FIELD.to_string(), json!(self.embedding));
        row
    }
}

/// Shape of a chunk collection.
///
/// Fields are fixed: `id` (Int64 primary key), `doc_id` (VarChar 128),
/// `chunk_index` (Int64), `text` (VarChar 8192) and `embedding`
/// (FloatVector of `dimension`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub dimension: usize,
    /// When true the store assigns primary keys and callers must not send them.
    pub auto_id: bool,
}

impl CollectionSchema {
    pub fn chunks(dimension: usize) -> Self {
        Self {
            dimension,
            auto_id: true,
        }
    }
}

/// Vector index parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: String,
    pub metric_type: String,
    pub index_type: String,
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self {
            field: VECTOR_FIELD.to_string(),
            metric_type: "COSINE".to_string(),
            index_type: "AUTOINDEX".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub limit: usize,
    /// Equality expression such as `doc_id == "handbook" and chunk_index == 0`.
    pub filter: Option<String>,
    pub output_fields: Vec<String>,
}

/// A search result. `distance` is cosine distance: lower is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub distance: f32,
    pub fields: Row,
}

/// Operations the index manager needs from a vector database.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn has_collection(&self, name: &str) -> Result<bool, IhosError>;

    async fn create_collection(&self, name: &str, schema: CollectionSchema) -> Result<(), IhosError>;

    async fn drop_collection(&self, name: &str) -> Result<(), IhosError>;

    /// Insert rows and return their primary keys in input order.
    async fn insert(&self, name: &str, rows: Vec<Row>) -> Result<Vec<i64>, IhosError>;

    /// Build the vector index. Succeeds when an index already exists.
    async fn create_index(&self, name: &str, spec: &IndexSpec) -> Result<(), IhosError>;

    async fn load(&self, name: &str) -> Result<(), IhosError>;

    /// Nearest rows by ascending cosine distance.
    async fn search(&self, name: &str, request: &SearchRequest) -> Result<Vec<SearchHit>, IhosError>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if the lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Parse `field == value [and field == value ...]` into pairs.
///
/// Values are double- or single-quoted strings, numbers or booleans.
pub fn parse_filter(expr: &str) -> Result<Vec<(String, Value)>, IhosError> {
    let mut clauses = Vec::new();
    for clause in expr.split(" and ") {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let (field, raw) = clause
            .split_once("==")
            .ok_or_else(|| IhosError::Vector(format!("unsupported filter clause: {}", clause)))?;
        let field = field.trim();
        let raw = raw.trim();
        if field.is_empty() || raw.is_empty() {
            return Err(IhosError::Vector(format!("unsupported filter clause: {}", clause)));
        }

        let value = if let Some(s) = raw
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .or_else(|| raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
        {
            Value::String(s.to_string())
        } else if let Ok(n) = raw.parse::<i64>() {
            json!(n)
        } else if let Ok(f) = raw.parse::<f64>() {
            json!(f)
        } else if let Ok(b) = raw.parse::<bool>() {
            Value::Bool(b)
        } else {
            return Err(IhosError::Vector(format!("unsupported filter value: {}", raw)));
        };
        clauses.push((field.to_string(), value));
    }
    Ok(clauses)
}

fn value_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (Some(Value::Number(a)), Value::Number(e)) => a.as_f64() == e.as_f64(),
        (Some(a), e) => a == e,
        (None, _) => false,
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRow {
    id: i64,
    embedding: Vec<f32>,
    fields: Row,
}

#[derive(Debug, Serialize, Deserialize)]
struct Collection {
    schema: CollectionSchema,
    rows: Vec<StoredRow>,
    next_id: i64,
    indexed: bool,
    loaded: bool,
}

fn embedding_of(row: &Row) -> Option<Vec<f32>> {
    row.get(VECTOR_FIELD)?
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// In-memory [`VectorStore`] using brute-force cosine distance.
///
/// Thread-safe via interior RwLock; clones share the same collections.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in a collection, 0 when it does not exist.
    pub fn row_count(&self, name: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(name).map_or(0, |col| col.rows.len()))
            .unwrap_or(0)
    }

    /// Vector dimension of a collection, if it exists.
    pub fn dimension(&self, name: &str) -> Option<usize> {
        self.collections
            .read()
            .ok()?
            .get(name)
            .map(|col| col.schema.dimension)
    }

    /// Store holding the collections saved at `path`. A missing file
    /// gives an empty store.
    pub fn load_snapshot(path: &Path) -> Result<Self, IhosError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)?;
        let collections: HashMap<String, Collection> = serde_json::from_slice(&bytes)?;
        info!(
            path = %path.display(),
            collections = collections.len(),
            "Loaded vector snapshot"
        );
        Ok(Self {
            collections: Arc::new(RwLock::new(collections)),
        })
    }

    /// Write every collection to `path` as JSON, replacing the file whole.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), IhosError> {
        let bytes = {
            let collections = self.collections.read().map_err(Self::lock_err)?;
            serde_json::to_vec(&*collections)?
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Saved vector snapshot");
        Ok(())
    }

    fn lock_err(e: impl std::fmt::Display) -> IhosError {
        IhosError::Vector(format!("Lock poisoned: {}", e))
    }
}

fn not_found(name: &str) -> IhosError {
    IhosError::Vector(format!("collection not found: {}", name))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn has_collection(&self, name: &str) -> Result<bool, IhosError> {
        let collections = self.collections.read().map_err(Self::lock_err)?;
        Ok(collections.contains_key(name))
    }

    async fn create_collection(&self, name: &str, schema: CollectionSchema) -> Result<(), IhosError> {
        let mut collections = self.collections.write().map_err(Self::lock_err)?;
        if collections.contains_key(name) {
            return Err(IhosError::Vector(format!("collection already exists: {}", name)));
        }
        collections.insert(
            name.to_string(),
            Collection {
                schema,
                rows: Vec::new(),
                next_id: 1,
                indexed: false,
                loaded: false,
            },
        );
        debug!(collection = name, dimension = schema.dimension, "created collection");
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), IhosError> {
        let mut collections = self.collections.write().map_err(Self::lock_err)?;
        collections.remove(name);
        Ok(())
    }

    async fn insert(&self, name: &str, rows: Vec<Row>) -> Result<Vec<i64>, IhosError> {
        let mut collections = self.collections.write().map_err(Self::lock_err)?;
        let collection = collections.get_mut(name).ok_or_else(|| not_found(name))?;
        let schema = collection.schema;

        // Validate everything first so a bad row leaves the collection untouched.
        let mut prepared = Vec::with_capacity(rows.len());
        for mut row in rows {
            let embedding = embedding_of(&row).ok_or_else(|| {
                IhosError::Vector(format!("schema mismatch: row has no {} field", VECTOR_FIELD))
            })?;
            if embedding.len() != schema.dimension {
                return Err(IhosError::Vector(format!(
                    "schema mismatch: expected dimension {}, got {}",
                    schema.dimension,
                    embedding.len()
                )));
            }
            let explicit_id = row.remove(PRIMARY_KEY_FIELD).and_then(|v| v.as_i64());
            if !schema.auto_id && explicit_id.is_none() {
                return Err(IhosError::Vector(format!(
                    "schema mismatch: missing primary_key field {}",
                    PRIMARY_KEY_FIELD
                )));
            }
            row.remove(VECTOR_FIELD);
            prepared.push((explicit_id, embedding, row));
        }

        let mut ids = Vec::with_capacity(prepared.len());
        for (explicit_id, embedding, fields) in prepared {
            let id = match explicit_id {
                Some(id) if !schema.auto_id => id,
                _ => {
                    let id = collection.next_id;
                    collection.next_id += 1;
                    id
                }
            };
            collection.rows.push(StoredRow {
                id,
                embedding,
                fields,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn create_index(&self, name: &str, _spec: &IndexSpec) -> Result<(), IhosError> {
        let mut collections = self.collections.write().map_err(Self::lock_err)?;
        let collection = collections.get_mut(name).ok_or_else(|| not_found(name))?;
        collection.indexed = true;
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<(), IhosError> {
        let mut collections = self.collections.write().map_err(Self::lock_err)?;
        let collection = collections.get_mut(name).ok_or_else(|| not_found(name))?;
        if !collection.indexed {
            return Err(IhosError::Vector(format!(
                "index not found for collection {}",
                name
            )));
        }
        collection.loaded = true;
        Ok(())
    }

    async fn search(&self, name: &str, request: &SearchRequest) -> Result<Vec<SearchHit>, IhosError> {
        let clauses = match request.filter.as_deref() {
            Some(expr) if !expr.trim().is_empty() => parse_filter(expr)?,
            _ => Vec::new(),
        };

        let collections = self.collections.read().map_err(Self::lock_err)?;
        let collection = collections.get(name).ok_or_else(|| not_found(name))?;
        if !collection.loaded {
            return Err(IhosError::Vector(format!("collection not loaded: {}", name)));
        }
        if request.vector.len() != collection.schema.dimension {
            return Err(IhosError::Vector(format!(
                "schema mismatch: expected query dimension {}, got {}",
                collection.schema.dimension,
                request.vector.len()
            )));
        }

        let mut hits: Vec<SearchHit> = collection
            .rows
            .iter()
            .filter(|row| {
                clauses
                    .iter()
                    .all(|(field, expected)| value_matches(row.fields.get(field), expected))
            })
            .map(|row| {
                let distance = (1.0 - cosine_similarity(&request.vector, &row.embedding)) as f32;
                let fields = request
                    .output_fields
                    .iter()
                    .filter_map(|f| row.fields.get(f).map(|v| (f.clone(), v.clone())))
                    .collect();
                SearchHit {
                    id: row.id,
                    distance,
                    fields,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(request.limit);
        Ok(hits)
    }
}
