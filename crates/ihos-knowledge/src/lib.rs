//! IHOS knowledge crate - chunking, embeddings, vector index lifecycle and retrieval.
//!
//! Text is split into overlapping word windows, embedded in one batch,
//! and written to a vector collection owned by [`VectorIndexManager`].
//! Queries embed the question and return the nearest chunks by cosine
//! distance.

pub mod chunker;
pub mod embedding;
pub mod error;
pub mod manager;
pub mod milvus;
pub mod pipeline;
pub mod store;

pub use chunker::{split_text, DEFAULT_CHUNK_SIZE};
pub use embedding::{DynEmbeddingService, EmbeddingService, GeminiEmbedding, MockEmbedding};
pub use error::KnowledgeError;
pub use manager::VectorIndexManager;
pub use milvus::MilvusRestStore;
pub use pipeline::{IngestReport, KnowledgePipeline, QueryMatch, QueryResult};
pub use store::{
    ChunkRecord, CollectionSchema, InMemoryVectorStore, IndexSpec, Row, SearchHit, SearchRequest,
    VectorStore,
};
