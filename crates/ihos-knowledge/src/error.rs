use thiserror::Error;

use ihos_core::error::IhosError;

/// Errors surfaced by ingestion and retrieval.
///
/// Transient store trouble that the index manager can heal (a missing
/// index, the first schema mismatch) never reaches the caller; these
/// variants are what remains once the single retry is spent.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Embedding count mismatch: {chunks} chunks but {embeddings} embeddings")]
    EmbeddingCountMismatch { chunks: usize, embeddings: usize },

    #[error("Schema mismatch persists after migration: {0}")]
    SchemaMismatch(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Core(#[from] IhosError),
}

impl From<KnowledgeError> for IhosError {
    fn from(err: KnowledgeError) -> Self {
        match err {
            KnowledgeError::Core(inner) => inner,
            KnowledgeError::InvalidInput(msg) => IhosError::InvalidInput(msg),
            other => IhosError::Vector(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = KnowledgeError::EmbeddingCountMismatch {
            chunks: 3,
            embeddings: 2,
        };
        assert_eq!(
            err.to_string(),
            "Embedding count mismatch: 3 chunks but 2 embeddings"
        );
        let err = KnowledgeError::Core(IhosError::Vector("down".into()));
        assert_eq!(err.to_string(), "Vector store error: down");
    }

    #[test]
    fn test_into_core_error() {
        let err: IhosError = KnowledgeError::IndexUnavailable("x".into()).into();
        assert!(matches!(err, IhosError::Vector(_)));

        let err: IhosError = KnowledgeError::Core(IhosError::Embedding("quota".into())).into();
        assert!(matches!(err, IhosError::Embedding(_)));
    }
}
