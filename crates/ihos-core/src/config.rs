use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{IhosError, Result};

/// Top-level configuration for the IHOS assistant.
///
/// Loaded from `~/.ihos/config.toml` by default. Secrets and endpoints are
/// usually supplied through the environment and merged in with
/// [`IhosConfig::apply_env_overrides`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IhosConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl IhosConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: IhosConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| IhosError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Merge environment variables over the file values.
    ///
    /// `lookup` is normally `|key| std::env::var(key).ok()`; tests pass a map.
    /// Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GOOGLE_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = get("GEMINI_EMBED_MODEL") {
            self.embedding.model = model;
        }
        if let Some(uri) = get("MILVUS_URL") {
            self.vector.uri = Some(uri);
            self.vector.backend = "milvus".to_string();
        }
        if let Some(token) = get("MILVUS_TOKEN") {
            self.vector.token = Some(token);
        }
        if let Some(user) = get("MILVUS_USER") {
            self.vector.user = Some(user);
        }
        if let Some(password) = get("MILVUS_PASSWORD") {
            self.vector.password = Some(password);
        }
        if let Some(collection) = get("MILVUS_TEXT_COLLECTION") {
            self.vector.collection = collection;
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.ihos/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// When false the assistant runs without a model even if a key is present.
    pub enabled: bool,
    /// API key for the Generative Language API. Usually from `GOOGLE_API_KEY`.
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Overrides the built-in system prompt.
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.0,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 60,
            system_prompt: None,
        }
    }
}

impl LlmConfig {
    /// Whether a model client should be constructed at all.
    pub fn is_available(&self) -> bool {
        self.enabled
            && self
                .api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty())
    }
}

/// Embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Expected vector dimension. Used by the offline mock and for collection creation.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-004".to_string(),
            dimension: 768,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// "memory" or "milvus".
    pub backend: String,
    pub uri: Option<String>,
    pub token: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub collection: String,
    pub metric_type: String,
    pub index_type: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            uri: None,
            token: None,
            user: None,
            password: None,
            collection: "ihos_documents".to_string(),
            metric_type: "COSINE".to_string(),
            index_type: "AUTOINDEX".to_string(),
        }
    }
}

impl VectorConfig {
    /// Bearer token for the vector service: explicit token first, then `user:password`.
    pub fn auth_token(&self) -> Option<String> {
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            return Some(token.to_string());
        }
        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() => {
                Some(format!("{}:{}", user, password))
            }
            _ => None,
        }
    }

    /// True when the remote backend is selected and has an endpoint.
    pub fn use_milvus(&self) -> bool {
        self.backend.eq_ignore_ascii_case("milvus")
            && self.uri.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// Chunking and retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared between consecutive chunks.
    pub overlap: usize,
    pub default_k: usize,
    /// Match text is cut to this many characters in query results.
    pub max_match_chars: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap: 100,
            default_k: 3,
            max_match_chars: 500,
        }
    }
}

/// Orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Lower-case phrases that send a query to structured extraction.
    pub booking_triggers: Vec<String>,
    pub max_query_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            booking_triggers: vec![
                "đặt phòng".to_string(),
                "đặt cho tôi".to_string(),
                "đặt phòng giúp".to_string(),
                "đặt hộ phòng".to_string(),
                "đặt cuộc họp".to_string(),
                "đoặt".to_string(),
            ],
            max_query_chars: 4000,
        }
    }
}

/// Document store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file name inside `general.data_dir`.
    pub database_file: String,
    /// Messages returned by a history lookup; 0 returns everything.
    pub history_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "ihos.db".to_string(),
            history_limit: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = IhosConfig::default();
        assert_eq!(config.general.data_dir, "~/.ihos/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(config.embedding.model, "text-embedding-004");
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.vector.collection, "ihos_documents");
        assert_eq!(config.vector.metric_type, "COSINE");
        assert_eq!(config.knowledge.chunk_size, 800);
        assert_eq!(config.knowledge.overlap, 100);
        assert_eq!(config.knowledge.default_k, 3);
        assert_eq!(config.knowledge.max_match_chars, 500);
        assert_eq!(config.agent.booking_triggers.len(), 6);
        assert_eq!(config.storage.history_limit, 50);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
data_dir = "/srv/ihos"
log_level = "debug"

[llm]
model = "gemini-2.0-pro"
temperature = 0.3

[vector]
backend = "milvus"
uri = "http://localhost:19530"
collection = "docs_test"

[knowledge]
chunk_size = 200
overlap = 20
"#;
        let file = create_temp_config(content);
        let config = IhosConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "/srv/ihos");
        assert_eq!(config.llm.model, "gemini-2.0-pro");
        assert!((config.llm.temperature - 0.3).abs() < f32::EPSILON);
        assert!(config.vector.use_milvus());
        assert_eq!(config.vector.collection, "docs_test");
        assert_eq!(config.knowledge.chunk_size, 200);
        assert_eq!(config.knowledge.overlap, 20);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
log_level = "warn"
"#;
        let file = create_temp_config(content);
        let config = IhosConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.knowledge.chunk_size, 800);
        assert_eq!(config.vector.backend, "memory");
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let file = create_temp_config("[general\nlog_level = ");
        let err = IhosConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, IhosError::Config(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = IhosConfig::load_or_default(Path::new("/nonexistent/ihos/config.toml"));
        assert_eq!(config.general.data_dir, "~/.ihos/data");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = IhosConfig::default();
        config.knowledge.chunk_size = 123;
        config.save(&path).unwrap();

        let reloaded = IhosConfig::load(&path).unwrap();
        assert_eq!(reloaded.knowledge.chunk_size, 123);
        assert_eq!(reloaded.agent.booking_triggers, config.agent.booking_triggers);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GOOGLE_API_KEY", "secret"),
            ("GEMINI_MODEL", "gemini-x"),
            ("MILVUS_URL", "https://milvus.example:443"),
            ("MILVUS_TEXT_COLLECTION", "kb"),
            ("MILVUS_TOKEN", ""),
        ]
        .into_iter()
        .collect();

        let mut config = IhosConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("secret"));
        assert!(config.llm.is_available());
        assert_eq!(config.llm.model, "gemini-x");
        assert!(config.vector.use_milvus());
        assert_eq!(config.vector.collection, "kb");
        assert!(config.vector.token.is_none());
    }

    #[test]
    fn test_llm_unavailable_without_key_or_when_disabled() {
        let mut llm = LlmConfig::default();
        assert!(!llm.is_available());
        llm.api_key = Some("  ".to_string());
        assert!(!llm.is_available());
        llm.api_key = Some("k".to_string());
        llm.enabled = false;
        assert!(!llm.is_available());
    }

    #[test]
    fn test_vector_auth_token_fallback() {
        let mut vector = VectorConfig::default();
        assert!(vector.auth_token().is_none());

        vector.user = Some("root".to_string());
        vector.password = Some("Milvus".to_string());
        assert_eq!(vector.auth_token().as_deref(), Some("root:Milvus"));

        vector.token = Some("tok".to_string());
        assert_eq!(vector.auth_token().as_deref(), Some("tok"));
    }

    #[test]
    fn test_milvus_requires_uri() {
        let vector = VectorConfig {
            backend: "milvus".to_string(),
            ..VectorConfig::default()
        };
        assert!(!vector.use_milvus());
    }
}
