//! Schemaless document store.
//!
//! Documents are JSON objects grouped by collection name. Every stored
//! document carries a string `_id`; filters are top-level equality matches.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use ihos_core::error::IhosError;

use crate::db::Database;

/// A stored JSON object.
pub type Document = Map<String, Value>;

/// Field name of the store-generated document id.
pub const ID_FIELD: &str = "_id";

/// Partial update applied by [`DocumentStore::update_one`].
///
/// `set` replaces top-level fields, `push` appends values to array fields
/// (creating the array when missing).
#[derive(Debug, Clone, Default)]
pub struct Update {
    pub set: Document,
    pub push: Map<String, Value>,
}

impl Update {
    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set.insert(field.into(), value);
        self
    }

    /// Append every element of `values` to the array at `field`.
    pub fn push_each(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.push.insert(field.into(), Value::Array(values));
        self
    }
}

/// Outcome of an update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<String>,
}

/// Parameterized persistence used for conversations and business records.
pub trait DocumentStore: Send + Sync {
    /// Documents of `collection` matching `filter`, in insertion order.
    fn find_many(
        &self,
        collection: &str,
        filter: &Document,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, IhosError>;

    fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>, IhosError> {
        Ok(self.find_many(collection, filter, Some(1))?.into_iter().next())
    }

    /// Insert a document and return its id. A string `_id` on the input is kept.
    fn insert_one(&self, collection: &str, doc: Document) -> Result<String, IhosError>;

    fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<String>, IhosError> {
        docs.into_iter()
            .map(|doc| self.insert_one(collection, doc))
            .collect()
    }

    /// Update the first document matching `filter`. With `upsert`, a missing
    /// document is created from the filter's fields plus the update.
    fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        update: &Update,
        upsert: bool,
    ) -> Result<UpdateResult, IhosError>;
}

/// True when every filter field equals the document's field.
pub fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| doc.get(key) == Some(expected))
}

/// Apply `set` and `push` to a document in place.
pub fn apply_update(doc: &mut Document, update: &Update) {
    for (key, value) in &update.set {
        doc.insert(key.clone(), value.clone());
    }
    for (key, value) in &update.push {
        let items = match value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        match doc.get_mut(key) {
            Some(Value::Array(existing)) => existing.extend(items),
            _ => {
                doc.insert(key.clone(), Value::Array(items));
            }
        }
    }
}

/// SQLite-backed [`DocumentStore`].
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    db: Arc<Database>,
}

impl SqliteDocumentStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> IhosError + '_ {
    move |e| IhosError::Storage(format!("{}: {}", context, e))
}

fn decode_body(id: String, body: &str) -> Result<Document, IhosError> {
    let mut doc: Document = serde_json::from_str(body)?;
    doc.insert(ID_FIELD.to_string(), Value::String(id));
    Ok(doc)
}

fn split_id(mut doc: Document) -> (String, Document) {
    let id = match doc.remove(ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => id,
        _ => Uuid::new_v4().simple().to_string(),
    };
    (id, doc)
}

fn insert_row(
    conn: &rusqlite::Connection,
    collection: &str,
    doc: Document,
) -> Result<String, IhosError> {
    let (id, body) = split_id(doc);
    let body = serde_json::to_string(&body)?;
    conn.execute(
        "INSERT INTO documents (id, collection, body) VALUES (?1, ?2, ?3)",
        rusqlite::params![id, collection, body],
    )
    .map_err(storage_err("Failed to insert document"))?;
    Ok(id)
}

impl DocumentStore for SqliteDocumentStore {
    fn find_many(
        &self,
        collection: &str,
        filter: &Document,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, IhosError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY seq ASC")
                .map_err(storage_err("Failed to prepare find"))?;
            let rows = stmt
                .query_map(rusqlite::params![collection], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(storage_err("Failed to query documents"))?;

            let mut found = Vec::new();
            for row in rows {
                let (id, body) = row.map_err(storage_err("Failed to read document row"))?;
                let doc = decode_body(id, &body)?;
                if matches_filter(&doc, filter) {
                    found.push(doc);
                    if limit.is_some_and(|l| found.len() >= l) {
                        break;
                    }
                }
            }
            debug!(collection, count = found.len(), "find_many");
            Ok(found)
        })
    }

    fn insert_one(&self, collection: &str, doc: Document) -> Result<String, IhosError> {
        self.db
            .with_conn(|conn| insert_row(conn, collection, doc))
    }

    fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<String>, IhosError> {
        self.db.with_transaction(|tx| {
            docs.into_iter()
                .map(|doc| insert_row(tx, collection, doc))
                .collect()
        })
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        update: &Update,
        upsert: bool,
    ) -> Result<UpdateResult, IhosError> {
        self.db.with_conn(|conn| {
            let target = {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY seq ASC",
                    )
                    .map_err(storage_err("Failed to prepare update"))?;
                let mut rows = stmt
                    .query(rusqlite::params![collection])
                    .map_err(storage_err("Failed to query documents"))?;
                let mut target = None;
                while let Some(row) = rows.next().map_err(storage_err("Failed to read row"))? {
                    let id: String = row.get(0).map_err(storage_err("Bad id column"))?;
                    let body: String = row.get(1).map_err(storage_err("Bad body column"))?;
                    let doc = decode_body(id.clone(), &body)?;
                    if matches_filter(&doc, filter) {
                        target = Some((id, doc));
                        break;
                    }
                }
                target
            };

            match target {
                Some((id, mut doc)) => {
                    let before = doc.clone();
                    apply_update(&mut doc, update);
                    let modified = doc != before;
                    if modified {
                        doc.remove(ID_FIELD);
                        let body = serde_json::to_string(&doc)?;
                        conn.execute(
                            "UPDATE documents SET body = ?1, updated_at = strftime('%s', 'now')
                             WHERE id = ?2",
                            rusqlite::params![body, id],
                        )
                        .map_err(storage_err("Failed to update document"))?;
                    }
                    Ok(UpdateResult {
                        matched: 1,
                        modified: u64::from(modified),
                        upserted_id: None,
                    })
                }
                None if upsert => {
                    let mut doc = filter.clone();
                    apply_update(&mut doc, update);
                    let id = insert_row(conn, collection, doc)?;
                    debug!(collection, id = %id, "upserted document");
                    Ok(UpdateResult {
                        matched: 0,
                        modified: 0,
                        upserted_id: Some(id),
                    })
                }
                None => Ok(UpdateResult::default()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (Arc<Database>, SqliteDocumentStore) {
        let db = Arc::new(Database::in_memory().unwrap());
        (db.clone(), SqliteDocumentStore::new(db))
    }

    fn row_count(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
                .map_err(|e| IhosError::Storage(e.to_string()))
        })
        .unwrap()
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_insert_and_find_one() {
        let (db, store) = store();
        let id = store
            .insert_one("rooms", doc(json!({"name": "A", "capacity": 8})))
            .unwrap();
        assert_eq!(row_count(&db), 1);

        let found = store
            .find_one("rooms", &doc(json!({"name": "A"})))
            .unwrap()
            .unwrap();
        assert_eq!(found["capacity"], json!(8));
        assert_eq!(found[ID_FIELD], json!(id));
    }

    #[test]
    fn test_find_many_filters_and_limits() {
        let (_, store) = store();
        store
            .insert_many(
                "employees",
                vec![
                    doc(json!({"name": "An", "department": "IT"})),
                    doc(json!({"name": "Binh", "department": "HR"})),
                    doc(json!({"name": "Chi", "department": "IT"})),
                ],
            )
            .unwrap();
        store
            .insert_one("other", doc(json!({"department": "IT"})))
            .unwrap();

        let it = store
            .find_many("employees", &doc(json!({"department": "IT"})), None)
            .unwrap();
        assert_eq!(it.len(), 2);
        assert_eq!(it[0]["name"], json!("An"));
        assert_eq!(it[1]["name"], json!("Chi"));

        let limited = store
            .find_many("employees", &Document::new(), Some(1))
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_insert_keeps_explicit_id() {
        let (_, store) = store();
        let id = store
            .insert_one("c", doc(json!({"_id": "fixed", "v": 1})))
            .unwrap();
        assert_eq!(id, "fixed");
        let found = store.find_one("c", &doc(json!({"_id": "fixed"}))).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn test_update_set_and_push() {
        let (_, store) = store();
        store
            .insert_one("conv", doc(json!({"session_id": "s1", "messages": [1]})))
            .unwrap();

        let update = Update::default()
            .set("updated_at", json!("now"))
            .push_each("messages", vec![json!(2), json!(3)]);
        let result = store
            .update_one("conv", &doc(json!({"session_id": "s1"})), &update, false)
            .unwrap();
        assert_eq!(result.matched, 1);
        assert_eq!(result.modified, 1);

        let found = store
            .find_one("conv", &doc(json!({"session_id": "s1"})))
            .unwrap()
            .unwrap();
        assert_eq!(found["messages"], json!([1, 2, 3]));
        assert_eq!(found["updated_at"], json!("now"));
    }

    #[test]
    fn test_update_without_match_or_upsert_is_noop() {
        let (_, store) = store();
        let result = store
            .update_one(
                "conv",
                &doc(json!({"session_id": "missing"})),
                &Update::default().set("x", json!(1)),
                false,
            )
            .unwrap();
        assert_eq!(result, UpdateResult::default());
        assert!(store.find_many("conv", &Document::new(), None).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_creates_from_filter() {
        let (_, store) = store();
        let update = Update::default().push_each("messages", vec![json!("hi")]);
        let result = store
            .update_one("conv", &doc(json!({"session_id": "s2"})), &update, true)
            .unwrap();
        assert!(result.upserted_id.is_some());

        let found = store
            .find_one("conv", &doc(json!({"session_id": "s2"})))
            .unwrap()
            .unwrap();
        assert_eq!(found["messages"], json!(["hi"]));
    }

    #[test]
    fn test_matches_filter_empty_matches_all() {
        let d = doc(json!({"a": 1}));
        assert!(matches_filter(&d, &Document::new()));
        assert!(!matches_filter(&d, &doc(json!({"a": 2}))));
    }

    #[test]
    fn test_insert_many_is_all_or_nothing() {
        let (db, store) = store();
        let err = store.insert_many(
            "rooms",
            vec![
                doc(json!({"_id": "r1", "name": "A"})),
                doc(json!({"_id": "r1", "name": "B"})),
            ],
        );
        assert!(err.is_err());
        assert_eq!(row_count(&db), 0);
    }
}
