//! Error taxonomy for the indexing engine

use thiserror::Error;

use crate::core::document::OwnerId;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    /// The embedding model could not be loaded. Every operation that needs
    /// embeddings reports this until the process restarts.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("embedding model returned unusable output: {0}")]
    ModelOutput(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("document store error: {0}")]
    DocumentStore(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("timed out after {waited_ms}ms waiting for index rebuild of owner {owner}")]
    RebuildTimedOut { owner: OwnerId, waited_ms: u128 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl IndexError {
    /// True for failures the API layer should report as "service unavailable".
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, IndexError::ModelUnavailable(_))
    }
}
