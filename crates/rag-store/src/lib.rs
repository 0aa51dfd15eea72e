//! # rag-store
//!
//! Vector-indexed content store for retrieval-augmented generation.
//!
//! A [`Store`] keeps a schema-validated [`ContentTable`] and a
//! [`VectorIndex`] aligned row for row: entry `i` of the index always holds
//! the embedding of table row `i`, and the row's `hash` is the content hash
//! of that embedding.
//!
//! ## Features
//! - Content-addressed append with duplicate skipping
//! - Two-stage search: cosine prefilter, exact L2 rerank, distance statistics
//! - Paired CSV + `.npy` snapshots with per-extension retention
//! - Corruption detection that stops the store instead of returning wrong
//!   neighbors

pub mod error;
pub mod hasher;
pub mod index;
pub mod lifecycle;
pub mod npy;
pub mod query;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod table;

pub use error::StoreError;
pub use hasher::{content_hash, l2_distance, normalize, HashParams};
pub use index::{IndexStats, VectorIndex};
pub use lifecycle::{enforce_retention, RetentionStats};
pub use query::{DistanceBucket, DistanceStats, QueryParams, RankedRecord, RankedResults};
pub use schema::{
    FieldSpec, FieldType, FieldValue, Record, Schema, SchemaFragment, CONTENT_FIELD, HASH_FIELD,
    NAME_FIELD,
};
pub use snapshot::{list_snapshots, SnapshotName, SnapshotPaths};
pub use store::{check_alignment, AppendOutcome, SaveReport, Store, StoreStats};
pub use table::ContentTable;

// Callers build gateways and settings from these.
pub use rag_embeddings::{Embedding, EmbeddingError, EmbeddingGateway, MockEmbedder};
pub use rag_types::{RetentionConfig, StoreSettings};
