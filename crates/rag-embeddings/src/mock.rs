//! Mock embedding gateway for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use tracing::debug;

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingGateway, GatewayInfo};

/// Mock gateway that produces deterministic bag-of-words vectors.
///
/// Each lowercase alphanumeric token is hashed (FNV-1a) into one of
/// `dimension` buckets with a hash-derived sign, so identical texts always
/// map to identical vectors and texts sharing words land close together.
/// Pinned vectors and failure injection cover edge cases.
pub struct MockEmbedder {
    info: GatewayInfo,
    pinned: RwLock<HashMap<String, Vec<f32>>>,
    failing: AtomicBool,
    requests: AtomicUsize,
}

impl MockEmbedder {
    /// Create a mock gateway of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            info: GatewayInfo {
                name: "mock-bag-of-words".to_string(),
                dimension,
            },
            pinned: RwLock::new(HashMap::new()),
            failing: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
        }
    }

    /// Always answer `text` with `values`, bypassing the token hash.
    pub fn with_vector(self, text: impl Into<String>, values: Vec<f32>) -> Self {
        self.pin(text, values);
        self
    }

    /// Pin a vector after construction.
    pub fn pin(&self, text: impl Into<String>, values: Vec<f32>) {
        if let Ok(mut pinned) = self.pinned.write() {
            pinned.insert(text.into(), values);
        }
    }

    /// Make every subsequent request fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of logical requests served (a batch counts once).
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), EmbeddingError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable(
                "mock gateway set to fail".to_string(),
            ));
        }
        Ok(())
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Ok(pinned) = self.pinned.read() {
            if let Some(values) = pinned.get(text) {
                return values.clone();
            }
        }

        let mut values = vec![0.0f32; self.info.dimension];
        if values.is_empty() {
            return values;
        }
        for token in tokenize(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.info.dimension as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            values[bucket] += sign;
        }
        values
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EmbeddingGateway for MockEmbedder {
    fn info(&self) -> &GatewayInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.check_available()?;
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(Embedding::new(self.vector_for(text)))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        self.check_available()?;
        self.requests.fetch_add(1, Ordering::SeqCst);
        debug!(count = texts.len(), "Mock batch embedding");
        Ok(texts
            .iter()
            .map(|text| Embedding::new(self.vector_for(text)))
            .collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(PRIME)
    })
}
