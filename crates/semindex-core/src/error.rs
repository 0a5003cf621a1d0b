use thiserror::Error;

/// Top-level error type for the semantic index.
///
/// Subsystem failures carry a context string; lifecycle failures that callers
/// may want to match on (degraded medium, invalidated handle, queue shutdown)
/// get their own variants.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IndexError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage medium unavailable")]
    Unavailable,

    #[error("Storage handle invalidated")]
    HandleInvalidated,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Store queue closed")]
    QueueClosed,

    #[error("Store task panicked")]
    TaskPanicked,
}

impl From<toml::de::Error> for IndexError {
    fn from(err: toml::de::Error) -> Self {
        IndexError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for IndexError {
    fn from(err: toml::ser::Error) -> Self {
        IndexError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
