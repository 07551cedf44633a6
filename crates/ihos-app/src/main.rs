//! IHOS application binary - composition root.
//!
//! Ties the IHOS crates into a single executable:
//! 1. Load configuration from TOML, then `.env` and process environment
//! 2. Open storage (SQLite documents, conversations, business records)
//! 3. Pick the vector backend (Milvus or in-memory) and the embedder
//! 4. Build the tool registry, orchestrator and assistant
//! 5. Run the requested subcommand

mod cli;
mod seed;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;

use ihos_agent::{
    builtin_registry, system_prompt, AgentRequest, Assistant, GeminiClient, LanguageModel,
    Orchestrator, ToolContext,
};
use ihos_core::config::IhosConfig;
use ihos_knowledge::{
    DynEmbeddingService, GeminiEmbedding, InMemoryVectorStore, IndexSpec, KnowledgePipeline,
    MilvusRestStore, MockEmbedding, VectorIndexManager, VectorStore,
};
use ihos_storage::{BusinessRepository, ConversationLog, Database, DocumentStore, SqliteDocumentStore};

use cli::{CliArgs, Command};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// File under the data directory holding the in-memory vector collections.
const VECTOR_SNAPSHOT_FILE: &str = "vectors.json";

/// Everything the subcommands need.
struct Services {
    assistant: Assistant,
    knowledge: Arc<KnowledgePipeline>,
    repository: BusinessRepository,
    /// In-memory vector store and its snapshot path, when Milvus is not in use.
    snapshot: Option<(InMemoryVectorStore, PathBuf)>,
}

impl Services {
    /// Persist in-memory vectors so later runs can search them.
    fn save_vectors(&self) -> AppResult<()> {
        if let Some((store, path)) = &self.snapshot {
            store.save_snapshot(path)?;
            tracing::info!(path = %path.display(), "Vector snapshot saved");
        }
        Ok(())
    }
}

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

fn build_embedder(config: &IhosConfig) -> AppResult<Arc<dyn DynEmbeddingService>> {
    match config.llm.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => {
            let embedder = GeminiEmbedding::new(
                key,
                config.llm.base_url.as_str(),
                config.embedding.model.as_str(),
                config.embedding.dimension,
                Duration::from_secs(config.llm.timeout_secs),
            )?;
            tracing::info!(model = %config.embedding.model, "Gemini embeddings enabled");
            Ok(Arc::new(embedder))
        }
        None => {
            tracing::warn!("GOOGLE_API_KEY not set; using mock embeddings");
            Ok(Arc::new(MockEmbedding::with_dimensions(config.embedding.dimension)))
        }
    }
}

/// The configured vector store, plus the in-memory store and its snapshot
/// path when Milvus is not selected.
fn build_vector_store(
    config: &IhosConfig,
    data_dir: &Path,
) -> AppResult<(Arc<dyn VectorStore>, Option<(InMemoryVectorStore, PathBuf)>)> {
    match config.vector.uri.as_deref() {
        Some(uri) if config.vector.use_milvus() => {
            tracing::info!(uri, collection = %config.vector.collection, "Using Milvus vector store");
            let store = MilvusRestStore::new(
                uri,
                config.vector.auth_token(),
                Duration::from_secs(config.llm.timeout_secs),
            );
            Ok((Arc::new(store), None))
        }
        _ => {
            let path = data_dir.join(VECTOR_SNAPSHOT_FILE);
            let store = InMemoryVectorStore::load_snapshot(&path)?;
            tracing::info!(snapshot = %path.display(), "Using in-memory vector store");
            Ok((Arc::new(store.clone()), Some((store, path))))
        }
    }
}

fn build_model(config: &IhosConfig) -> Option<Arc<dyn LanguageModel>> {
    if !config.llm.is_available() {
        tracing::warn!("Language model not configured; answers fall back to echo");
        return None;
    }
    let prompt = config.llm.system_prompt.clone().unwrap_or_else(system_prompt);
    match GeminiClient::from_config(&config.llm, Some(prompt)) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "Language model unavailable");
            None
        }
    }
}

fn build_services(config: &IhosConfig, data_dir: &Path) -> AppResult<Services> {
    let db_path = data_dir.join(&config.storage.database_file);
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let documents: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(db));
    let repository = BusinessRepository::new(Arc::clone(&documents));
    let conversations = ConversationLog::new(documents);

    let index_spec = IndexSpec {
        metric_type: config.vector.metric_type.clone(),
        index_type: config.vector.index_type.clone(),
        ..IndexSpec::default()
    };
    let (vectors, snapshot) = build_vector_store(config, data_dir)?;
    let index = Arc::new(VectorIndexManager::new(
        vectors,
        config.vector.collection.clone(),
        index_spec,
    ));
    let knowledge = Arc::new(
        KnowledgePipeline::new(build_embedder(config)?, index)
            .with_max_match_chars(config.knowledge.max_match_chars),
    );

    let tools = builtin_registry(ToolContext {
        repository: Some(repository.clone()),
        knowledge: Some(Arc::clone(&knowledge)),
        default_k: Some(config.knowledge.default_k),
    });
    tracing::info!(tools = ?tools.names(), "Tool registry ready");

    let orchestrator = Orchestrator::new(build_model(config), tools)
        .with_booking_triggers(config.agent.booking_triggers.clone());
    let assistant = Assistant::new(orchestrator)
        .with_conversation_log(conversations)
        .with_max_query_chars(config.agent.max_query_chars)
        .with_history_limit(config.storage.history_limit);

    Ok(Services {
        assistant,
        knowledge,
        repository,
        snapshot,
    })
}

fn request(query: String, session: Option<String>) -> AgentRequest {
    let request = AgentRequest::new(query);
    match session {
        Some(s) => request.in_session(s),
        None => request,
    }
}

async fn run(command: Command, services: Services, config: &IhosConfig) -> AppResult<()> {
    match command {
        Command::Ask {
            query,
            session,
            json,
        } => {
            let response = services.assistant.invoke(request(query, session)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.output);
            }
        }
        Command::Stream { query, session } => {
            let mut units = services.assistant.stream(request(query, session)).await?;
            let mut stdout = std::io::stdout();
            while let Some(unit) = units.next().await {
                write!(stdout, "{}", unit)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
        Command::Ingest {
            file,
            doc_id,
            chunk_size,
            overlap,
        } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let doc_id = doc_id.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| file.display().to_string())
            });
            let report = services
                .knowledge
                .ingest(
                    &doc_id,
                    &text,
                    chunk_size.unwrap_or(config.knowledge.chunk_size),
                    overlap.unwrap_or(config.knowledge.overlap),
                )
                .await?;
            services.save_vectors()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Search { text, k } => {
            let result = services
                .knowledge
                .query(&text, k.unwrap_or(config.knowledge.default_k))
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::History { session } => {
            for message in services.assistant.history(&session)? {
                println!("[{}] {}", message.role, message.content);
            }
        }
        Command::Seed => {
            let report = seed::seed_demo_data(&services.repository)?;
            println!(
                "Seeded {} rooms, {} employees, {} hospitals",
                report.rooms, report.employees, report.hospitals
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = IhosConfig::load_or_default(&config_file);
    config.apply_env_overrides(|key| std::env::var(key).ok());

    // Tracing.
    let filter = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting IHOS v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = resolve_data_dir(&args.resolve_data_dir(&config.general.data_dir));
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let services = build_services(&config, &data_dir)?;
    run(args.command, services, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_vectors_persist_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let config = IhosConfig::default();

        let first = build_services(&config, dir.path()).unwrap();
        first
            .knowledge
            .ingest("handbook", "quy trình đặt phòng họp tại tầng ba", 800, 100)
            .await
            .unwrap();
        first.save_vectors().unwrap();
        assert!(dir.path().join(VECTOR_SNAPSHOT_FILE).exists());

        let second = build_services(&config, dir.path()).unwrap();
        let result = second
            .knowledge
            .query("quy trình đặt phòng họp", 3)
            .await
            .unwrap();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].doc_id.as_deref(), Some("handbook"));
    }
}
