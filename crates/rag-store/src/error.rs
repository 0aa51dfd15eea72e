//! Store error types.

use thiserror::Error;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Gateway call failed; never retried by the store
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(#[from] rag_embeddings::EmbeddingError),

    /// Zero-norm vector cannot be normalized
    #[error("Degenerate vector: L2 norm is zero")]
    DegenerateVector,

    /// Record keys differ from the schema's field set
    #[error("Schema mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// Table and vector index drifted apart; the store refuses further work
    #[error("Store corrupt: {0}")]
    StoreCorrupt(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Field value does not fit its declared type
    #[error("Invalid value for field `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Schema definition error
    #[error("Schema error: {0}")]
    Schema(String),

    /// No snapshot on disk matches the requested name
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Binary array file is malformed
    #[error("Array format error: {0}")]
    Format(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tabular file error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Settings error
    #[error("Config error: {0}")]
    Config(#[from] rag_types::ConfigError),
}
