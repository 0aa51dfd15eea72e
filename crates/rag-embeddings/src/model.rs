//! Embedding gateway trait and types.
//!
//! Defines the interface for turning text into vectors.

use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;

/// Vector embedding exactly as the gateway produced it.
///
/// Values are kept raw; normalization is the store's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// The embedding vector
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Get the embedding dimension
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean length of the raw vector.
    pub fn l2_norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Gateway information
#[derive(Debug, Clone)]
pub struct GatewayInfo {
    /// Model or endpoint name
    pub name: String,
    /// Embedding dimension the gateway is expected to return
    pub dimension: usize,
}

/// Trait for embedding gateways.
///
/// Implementations must be thread-safe (Send + Sync). A call may block on
/// network I/O for as long as the implementation allows; the store imposes
/// no timeout of its own.
pub trait EmbeddingGateway: Send + Sync {
    /// Get gateway information
    fn info(&self) -> &GatewayInfo;

    /// Generate embedding for a single text.
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Generate embeddings for multiple texts in one logical request.
    /// Default implementation calls embed() for each text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}
