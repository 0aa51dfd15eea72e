//! # rag-embeddings
//!
//! The embedding gateway boundary for the RAG content store.
//!
//! The store never talks to a model directly. It is handed an
//! [`EmbeddingGateway`] that turns text into a fixed-length float vector and
//! treats every call as a possibly slow, possibly failing remote operation.
//! Retry, backoff and timeouts belong to the gateway implementation.
//!
//! ## Features
//! - `Embedding`: raw (unnormalized) gateway output
//! - `EmbeddingGateway`: single and batch embedding
//! - `MockEmbedder`: deterministic offline gateway for tests and demos

pub mod error;
pub mod mock;
pub mod model;

pub use error::EmbeddingError;
pub use mock::MockEmbedder;
pub use model::{Embedding, EmbeddingGateway, GatewayInfo};
