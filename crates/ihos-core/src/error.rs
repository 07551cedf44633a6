use thiserror::Error;

/// Top-level error type for the IHOS assistant.
///
/// Subsystem crates define their own error types and convert into
/// `IhosError` where a failure has to cross a crate boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IhosError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Vector store error: {0}")]
    Vector(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Language model error: {0}")]
    Llm(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<toml::de::Error> for IhosError {
    fn from(err: toml::de::Error) -> Self {
        IhosError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for IhosError {
    fn from(err: toml::ser::Error) -> Self {
        IhosError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for IhosError {
    fn from(err: serde_json::Error) -> Self {
        IhosError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for IHOS operations.
pub type Result<T> = std::result::Result<T, IhosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(IhosError, &str)> = vec![
            (
                IhosError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                IhosError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                IhosError::Vector("collection missing".to_string()),
                "Vector store error: collection missing",
            ),
            (
                IhosError::Embedding("quota".to_string()),
                "Embedding error: quota",
            ),
            (
                IhosError::Llm("timeout".to_string()),
                "Language model error: timeout",
            ),
            (
                IhosError::Api("unauthorized".to_string()),
                "API error: unauthorized",
            ),
            (
                IhosError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
            (
                IhosError::InvalidInput("empty query".to_string()),
                "Invalid input: empty query",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err: IhosError = io_err.into();
        match &err {
            IhosError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io variant"),
        }
        assert!(err.to_string().starts_with("I/O error:"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: IhosError = err.unwrap_err().into();
        assert!(matches!(err, IhosError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: IhosError = err.unwrap_err().into();
        assert!(matches!(err, IhosError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(format!("value={}", value))
        }

        assert_eq!(inner().unwrap(), "value=42");
    }
}
