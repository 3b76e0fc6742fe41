use thiserror::Error;

/// Errors from backing-store operations (used by trait definitions in pulse-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the embedding capability.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding capability unavailable: {0}")]
    Unavailable(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors from episodic/procedural store operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The record was discarded because no embedding could be computed.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("store unavailable: {0}")]
    Store(#[from] RepositoryError),
}

impl From<EmbeddingError> for MemoryError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::Unavailable(msg) => MemoryError::EmbeddingUnavailable(msg),
            EmbeddingError::DimensionMismatch { expected, actual } => {
                MemoryError::DimensionMismatch { expected, actual }
            }
        }
    }
}

/// Per-invocation capability failures. Never fatal to a turn.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("unknown capability '{0}'")]
    Unknown(String),

    #[error("invalid arguments for '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("capability '{name}' failed: {message}")]
    Execution { name: String, message: String },

    #[error("capability '{name}' timed out after {secs}s")]
    Timeout { name: String, secs: u64 },
}
