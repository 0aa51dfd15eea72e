//! Vector normalization and content addressing.
//!
//! The content hash only covers a prefix of the normalized vector. Near
//! duplicate embeddings can therefore collide; a collision means "likely
//! duplicate content" and is how the store deduplicates appends.

use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Content hash parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    /// Leading components of the normalized vector that are hashed
    pub prefix_len: usize,
    /// Hex characters kept from the digest
    pub out_len: usize,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            prefix_len: 30,
            out_len: 16,
        }
    }
}

impl HashParams {
    pub fn new(prefix_len: usize, out_len: usize) -> Self {
        Self {
            prefix_len,
            out_len,
        }
    }
}

/// L2 norm of a vector.
pub fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Divide a vector by its L2 norm.
///
/// Fails with `DegenerateVector` for zero-norm (or non-finite norm) input
/// rather than producing NaNs.
pub fn normalize(raw: &[f32]) -> Result<Vec<f32>, StoreError> {
    let norm = l2_norm(raw);
    if norm == 0.0 || !norm.is_finite() {
        return Err(StoreError::DegenerateVector);
    }
    Ok(raw.iter().map(|x| x / norm).collect())
}

/// Stable short hash of a normalized vector.
///
/// The first `prefix_len` components are written as little-endian f32
/// bytes, digested with SHA-256, and the hex digest is cut to `out_len`
/// characters. Only the values matter, never how the slice is laid out.
pub fn content_hash(normalized: &[f32], params: HashParams) -> String {
    let take = params.prefix_len.min(normalized.len());
    let mut hasher = Sha256::new();
    for value in &normalized[..take] {
        hasher.update(value.to_le_bytes());
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(params.out_len);
    digest
}

/// Euclidean distance between two equal-length vectors.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Dot product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_vector(dim: usize) -> Vec<f32> {
        let mut rng = rand::rng();
        (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect()
    }

    #[test]
    fn test_normalize_3_4_5() {
        let n = normalize(&[3.0, 4.0]).unwrap();
        assert!((n[0] - 0.6).abs() < 1e-6);
        assert!((n[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_unit_length() {
        for dim in [1, 7, 64, 384] {
            let v = random_vector(dim);
            if l2_norm(&v) == 0.0 {
                continue;
            }
            let n = normalize(&v).unwrap();
            assert!((l2_norm(&n) - 1.0).abs() < 1e-5, "dim {}", dim);
        }
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert!(matches!(
            normalize(&[0.0, 0.0, 0.0]),
            Err(StoreError::DegenerateVector)
        ));
        assert!(matches!(normalize(&[]), Err(StoreError::DegenerateVector)));
    }

    #[test]
    fn test_hash_deterministic_and_truncated() {
        let n = normalize(&random_vector(64)).unwrap();
        let a = content_hash(&n, HashParams::default());
        let b = content_hash(&n.clone(), HashParams::default());
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let long = content_hash(&n, HashParams::new(30, 64));
        assert!(long.starts_with(&a));
    }

    #[test]
    fn test_hash_ignores_components_past_prefix() {
        let mut a = vec![0.1f32; 40];
        let mut b = a.clone();
        b[35] = 0.9;
        a[0] = 0.2;
        b[0] = 0.2;
        assert_eq!(
            content_hash(&a, HashParams::default()),
            content_hash(&b, HashParams::default())
        );

        b[5] = 0.3;
        assert_ne!(
            content_hash(&a, HashParams::default()),
            content_hash(&b, HashParams::default())
        );
    }

    #[test]
    fn test_hash_short_vector_uses_all_components() {
        let n = normalize(&[1.0, 2.0]).unwrap();
        assert_eq!(content_hash(&n, HashParams::default()).len(), 16);
    }

    #[test]
    fn test_distance_and_dot() {
        assert!((l2_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert!((dot(&[1.0, 2.0], &[3.0, 4.0]) - 11.0).abs() < 1e-6);
    }
}
