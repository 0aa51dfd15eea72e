//! Two-stage nearest-neighbor search.
//!
//! 1. Coarse: cosine score of every stored normalized vector against the
//!    normalized query; keep the top `M = max(min_candidates, D / divisor)`.
//! 2. Exact: L2 distance between each candidate's raw vector and the raw
//!    query; ascending, first `k`.
//!
//! Survivors are mapped back to records through their content hash, never
//! through their position alone.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::error::StoreError;
use crate::hasher::{content_hash, dot, l2_distance, normalize, HashParams};
use crate::index::VectorIndex;
use crate::schema::Record;
use crate::table::ContentTable;

/// Candidate count parameters for the coarse stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryParams {
    /// Lower bound on candidates kept by the cosine prefilter
    pub min_candidates: usize,
    /// Candidates grow as dimension / candidate_divisor
    pub candidate_divisor: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            min_candidates: 20,
            candidate_divisor: 100,
        }
    }
}

impl QueryParams {
    /// `M` for an index of the given dimension (before clamping to its size).
    pub fn candidate_count(&self, dimension: usize) -> usize {
        let scaled = dimension / self.candidate_divisor.max(1);
        self.min_candidates.max(scaled)
    }
}

/// Quartile bucket of a result's distance within its result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DistanceBucket {
    /// At or below the 25th percentile
    Q1,
    Q2,
    Q3,
    /// Above the 75th percentile
    Q4,
}

impl DistanceBucket {
    pub fn assign(distance: f32, stats: &DistanceStats) -> Self {
        if distance <= stats.p25 {
            DistanceBucket::Q1
        } else if distance <= stats.p50 {
            DistanceBucket::Q2
        } else if distance <= stats.p75 {
            DistanceBucket::Q3
        } else {
            DistanceBucket::Q4
        }
    }
}

/// Descriptive statistics over the returned distances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DistanceStats {
    pub count: usize,
    pub min: f32,
    pub p25: f32,
    pub p50: f32,
    pub p75: f32,
    pub max: f32,
    pub mean: f32,
    /// Sample standard deviation; 0 with fewer than two distances
    pub std: f32,
}

impl DistanceStats {
    pub fn from_distances(distances: &[f32]) -> Self {
        if distances.is_empty() {
            return Self::default();
        }

        let mut sorted = distances.to_vec();
        sorted.sort_by(f32::total_cmp);

        let n = sorted.len();
        let mean = sorted.iter().sum::<f32>() / n as f32;
        let std = if n > 1 {
            let sum_sq: f32 = sorted.iter().map(|d| (d - mean) * (d - mean)).sum();
            (sum_sq / (n - 1) as f32).sqrt()
        } else {
            0.0
        };

        Self {
            count: n,
            min: sorted[0],
            p25: quantile(&sorted, 0.25),
            p50: quantile(&sorted, 0.50),
            p75: quantile(&sorted, 0.75),
            max: sorted[n - 1],
            mean,
            std,
        }
    }
}

/// Linear-interpolated quantile of an ascending slice.
fn quantile(sorted: &[f32], q: f32) -> f32 {
    let pos = q * (sorted.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f32)
}

/// One ranked hit.
#[derive(Debug, Clone, Serialize)]
pub struct RankedRecord {
    /// Insertion position in the store
    pub position: usize,
    /// L2 distance between raw vectors
    pub distance: f32,
    pub bucket: DistanceBucket,
    pub record: Record,
}

/// Ranked records plus distance statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResults {
    pub records: Vec<RankedRecord>,
    pub stats: DistanceStats,
    /// Entries kept by the cosine prefilter and reranked by L2
    pub candidates: usize,
    /// Wall-clock time spent in search
    pub elapsed: Duration,
}

impl RankedResults {
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            stats: DistanceStats::default(),
            candidates: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Best hit, if any.
    pub fn first(&self) -> Option<&RankedRecord> {
        self.records.first()
    }
}

fn by_score_desc(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

fn by_distance_asc(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

/// Coarse stage: positions of the `m` best cosine scores, best first.
pub fn coarse_candidates(
    index: &VectorIndex,
    query_normalized: &[f32],
    m: usize,
) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = (0..index.len())
        .filter_map(|i| index.normalized_at(i).map(|n| (i, dot(n, query_normalized))))
        .collect();
    scored.sort_by(by_score_desc);
    scored.truncate(m);
    scored
}

/// Exact stage: candidates ranked by raw L2 distance, first `k`.
pub fn exact_rerank(
    index: &VectorIndex,
    candidates: &[(usize, f32)],
    query_raw: &[f32],
    k: usize,
) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = candidates
        .iter()
        .filter_map(|&(i, _)| index.raw_at(i).map(|raw| (i, l2_distance(raw, query_raw))))
        .collect();
    ranked.sort_by(by_distance_asc);
    ranked.truncate(k);
    ranked
}

/// Run both stages and assemble ranked records.
///
/// `k` larger than the index returns every entry ranked. A survivor whose
/// content hash is missing from the table means the two structures drifted
/// and is reported as `StoreCorrupt`.
pub fn search(
    index: &VectorIndex,
    table: &ContentTable,
    query_raw: &[f32],
    k: usize,
    params: QueryParams,
    hash_params: HashParams,
) -> Result<RankedResults, StoreError> {
    let started = Instant::now();

    let Some(dimension) = index.dimension() else {
        return Ok(RankedResults::empty());
    };
    if query_raw.len() != dimension {
        return Err(StoreError::DimensionMismatch {
            expected: dimension,
            actual: query_raw.len(),
        });
    }
    if k == 0 || index.is_empty() {
        return Ok(RankedResults::empty());
    }

    let query_normalized = normalize(query_raw)?;
    let m = params.candidate_count(dimension).min(index.len());
    let candidates = coarse_candidates(index, &query_normalized, m);
    let ranked = exact_rerank(index, &candidates, query_raw, k);

    let distances: Vec<f32> = ranked.iter().map(|&(_, d)| d).collect();
    let stats = DistanceStats::from_distances(&distances);

    let mut records = Vec::with_capacity(ranked.len());
    for (position, distance) in ranked {
        let normalized = index.normalized_at(position).ok_or_else(|| {
            StoreError::StoreCorrupt(format!("vector position {} out of range", position))
        })?;
        let hash = content_hash(normalized, hash_params);
        let record = table.lookup(&hash).ok_or_else(|| {
            StoreError::StoreCorrupt(format!(
                "vector at position {} hashes to {} which is not in the content table",
                position, hash
            ))
        })?;
        records.push(RankedRecord {
            position,
            distance,
            bucket: DistanceBucket::assign(distance, &stats),
            record: record.clone(),
        });
    }

    let elapsed = started.elapsed();
    debug!(
        candidates = candidates.len(),
        returned = records.len(),
        elapsed_us = elapsed.as_micros() as u64,
        "Search complete"
    );

    Ok(RankedResults {
        records,
        stats,
        candidates: candidates.len(),
        elapsed,
    })
}
