//! Embedding error types.

use thiserror::Error;

/// Errors that can occur while calling an embedding gateway.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Remote service failed or refused the request
    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),

    /// Remote service did not answer in time
    #[error("Embedding request timed out after {0} ms")]
    Timeout(u64),

    /// Gateway answered with a zero-length vector
    #[error("Embedding service returned an empty vector")]
    EmptyVector,

    /// Batch answer does not line up with the request
    #[error("Batch size mismatch: sent {sent}, received {received}")]
    BatchMismatch { sent: usize, received: usize },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
