//! Positional vector index.
//!
//! Holds (raw, normalized) pairs in insertion order, row-major in two flat
//! buffers. Entry `i` belongs to content table row `i`. The only mutation is
//! `push`; there is no removal or update in place.

use crate::error::StoreError;

/// Index statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of vector entries
    pub vector_count: usize,
    /// Embedding dimension (0 until the first push)
    pub dimension: usize,
    /// Bytes held by both halves
    pub size_bytes: u64,
}

/// Growable sequence of (raw, normalized) vector pairs.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dimension: Option<usize>,
    raw: Vec<f32>,
    normalized: Vec<f32>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index with a dimension fixed up front.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Default::default()
        }
    }

    /// Embedding dimension, fixed by the first push.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Fail unless a vector of `actual` components can be pushed.
    pub fn check_dimension(&self, actual: usize) -> Result<(), StoreError> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(StoreError::DimensionMismatch { expected, actual })
            }
            _ if actual == 0 => Err(StoreError::DimensionMismatch {
                expected: self.dimension.unwrap_or(1),
                actual,
            }),
            _ => Ok(()),
        }
    }

    /// Append an entry at the end.
    pub fn push(&mut self, raw: &[f32], normalized: &[f32]) -> Result<(), StoreError> {
        self.check_dimension(raw.len())?;
        if normalized.len() != raw.len() {
            return Err(StoreError::DimensionMismatch {
                expected: raw.len(),
                actual: normalized.len(),
            });
        }

        self.dimension = Some(raw.len());
        self.raw.extend_from_slice(raw);
        self.normalized.extend_from_slice(normalized);
        Ok(())
    }

    pub fn len(&self) -> usize {
        match self.dimension {
            Some(dim) if dim > 0 => self.raw.len() / dim,
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw vector at position `i`.
    pub fn raw_at(&self, i: usize) -> Option<&[f32]> {
        self.row(&self.raw, i)
    }

    /// Normalized vector at position `i`.
    pub fn normalized_at(&self, i: usize) -> Option<&[f32]> {
        self.row(&self.normalized, i)
    }

    fn row<'a>(&self, buffer: &'a [f32], i: usize) -> Option<&'a [f32]> {
        let dim = self.dimension?;
        if i >= self.len() {
            return None;
        }
        Some(&buffer[i * dim..(i + 1) * dim])
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            vector_count: self.len(),
            dimension: self.dimension.unwrap_or(0),
            size_bytes: ((self.raw.len() + self.normalized.len()) * std::mem::size_of::<f32>())
                as u64,
        }
    }
}
