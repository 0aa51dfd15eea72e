//! # rag-types
//!
//! Shared configuration types for the RAG content store.
//!
//! - Settings: layered store configuration (defaults, file, env)
//! - Retention: snapshot file retention policy
//!
//! ## Usage
//!
//! ```rust
//! use rag_types::StoreSettings;
//!
//! let settings = StoreSettings::default();
//! assert_eq!(settings.hash_prefix_len, 30);
//! ```

pub mod config;
pub mod error;

pub use config::{RetentionConfig, StoreSettings};
pub use error::ConfigError;
