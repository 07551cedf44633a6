//! Milvus / Zilliz Cloud backend over the RESTful v2 API.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use ihos_core::error::IhosError;

use crate::store::{
    CollectionSchema, IndexSpec, Row, SearchHit, SearchRequest, VectorStore, PRIMARY_KEY_FIELD,
    VECTOR_FIELD,
};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Vector store backed by a Milvus server.
///
/// The HTTP client is built on first use and shared by every later call.
#[derive(Debug)]
pub struct MilvusRestStore {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    client: OnceLock<reqwest::Client>,
}

impl MilvusRestStore {
    pub fn new(uri: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: uri.into().trim_end_matches('/').to_string(),
            token,
            timeout,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&reqwest::Client, IhosError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| IhosError::Vector(format!("Failed to build HTTP client: {}", e)))?;
        info!(uri = %self.base_url, "Milvus client initialised");
        Ok(self.client.get_or_init(|| client))
    }

    async fn call(&self, path: &str, body: Value) -> Result<Value, IhosError> {
        let url = format!("{}/v2/vectordb/{}", self.base_url, path);
        let mut req = self.client()?.post(&url).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let res = req
            .send()
            .await
            .map_err(|e| IhosError::Vector(format!("{} request failed: {}", path, e)))?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(IhosError::Vector(format!("{} returned {}: {}", path, status, text)));
        }

        let envelope: Envelope = res
            .json()
            .await
            .map_err(|e| IhosError::Vector(format!("{} response decode: {}", path, e)))?;
        if envelope.code != 0 {
            return Err(IhosError::Vector(format!(
                "{} failed ({}): {}",
                path,
                envelope.code,
                envelope.message.unwrap_or_default()
            )));
        }
        debug!(path, "milvus call ok");
        Ok(envelope.data)
    }
}

fn schema_body(name: &str, schema: CollectionSchema) -> Value {
    json!({
        "collectionName": name,
        "schema": {
            "autoId": schema.auto_id,
            "enableDynamicField": true,
            "fields": [
                {"fieldName": PRIMARY_KEY_FIELD, "dataType": "Int64", "isPrimary": true},
                {"fieldName": "doc_id", "dataType": "VarChar", "elementTypeParams": {"max_length": 128}},
                {"fieldName": "chunk_index", "dataType": "Int64"},
                {"fieldName": "text", "dataType": "VarChar", "elementTypeParams": {"max_length": 8192}},
                {"fieldName": VECTOR_FIELD, "dataType": "FloatVector",
                 "elementTypeParams": {"dim": schema.dimension.to_string()}}
            ]
        }
    })
}

fn parse_id(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Milvus reports COSINE scores as similarity; convert to distance.
fn hit_from_value(value: &Value) -> Option<SearchHit> {
    let obj = value.as_object()?;
    let id = obj.get(PRIMARY_KEY_FIELD).and_then(parse_id)?;
    let similarity = obj.get("distance").and_then(Value::as_f64).unwrap_or(0.0);
    let fields: Row = obj
        .iter()
        .filter(|(k, _)| k.as_str() != PRIMARY_KEY_FIELD && k.as_str() != "distance")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Some(SearchHit {
        id,
        distance: (1.0 - similarity) as f32,
        fields,
    })
}

#[async_trait]
impl VectorStore for MilvusRestStore {
    async fn has_collection(&self, name: &str) -> Result<bool, IhosError> {
        let data = self
            .call("collections/has", json!({"collectionName": name}))
            .await?;
        Ok(data.get("has").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn create_collection(&self, name: &str, schema: CollectionSchema) -> Result<(), IhosError> {
        self.call("collections/create", schema_body(name, schema))
            .await?;
        info!(collection = name, dimension = schema.dimension, "Milvus collection created");
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), IhosError> {
        self.call("collections/drop", json!({"collectionName": name}))
            .await?;
        Ok(())
    }

    async fn insert(&self, name: &str, rows: Vec<Row>) -> Result<Vec<i64>, IhosError> {
        let data = self
            .call(
                "entities/insert",
                json!({"collectionName": name, "data": rows}),
            )
            .await?;
        Ok(data
            .get("insertIds")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(parse_id).collect())
            .unwrap_or_default())
    }

    async fn create_index(&self, name: &str, spec: &IndexSpec) -> Result<(), IhosError> {
        let body = json!({
            "collectionName": name,
            "indexParams": [{
                "fieldName": spec.field,
                "indexName": format!("{}_idx", spec.field),
                "metricType": spec.metric_type,
                "indexType": spec.index_type,
            }]
        });
        match self.call("indexes/create", body).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().to_lowercase().contains("already exist") => {
                debug!(collection = name, "index already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn load(&self, name: &str) -> Result<(), IhosError> {
        self.call("collections/load", json!({"collectionName": name}))
            .await?;
        Ok(())
    }

    async fn search(&self, name: &str, request: &SearchRequest) -> Result<Vec<SearchHit>, IhosError> {
        let mut body = json!({
            "collectionName": name,
            "data": [request.vector],
            "annsField": VECTOR_FIELD,
            "limit": request.limit,
            "outputFields": request.output_fields,
            "searchParams": {"metricType": "COSINE"},
        });
        if let Some(filter) = request.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            body["filter"] = json!(filter);
        }

        let data = self.call("entities/search", body).await?;
        let mut hits: Vec<SearchHit> = data
            .as_array()
            .map(|rows| rows.iter().filter_map(hit_from_value).collect())
            .unwrap_or_default();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(hits)
    }
}
