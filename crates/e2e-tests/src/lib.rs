//! End-to-end test infrastructure for the RAG content store.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering append, query, save and load through the public API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use tracing_subscriber::EnvFilter;

use rag_embeddings::MockEmbedder;
use rag_store::{AppendOutcome, Record, Schema, Store};
use rag_types::{RetentionConfig, StoreSettings};

/// Embedding dimension used by the harness gateway.
pub const TEST_DIMENSION: usize = 64;

/// Store name used by the harness helpers.
pub const TEST_STORE: &str = "questions";

/// Shared test harness for E2E tests.
///
/// Owns a temp snapshot directory, settings pointing at it, and a mock
/// gateway shared by every store the harness builds.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Snapshot directory
    pub data_dir: PathBuf,
    pub settings: StoreSettings,
    pub gateway: Arc<MockEmbedder>,
}

impl TestHarness {
    /// Create a new test harness with temp directory and default settings.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join("snapshots");
        let settings = StoreSettings::with_data_dir(&data_dir);
        init_tracing(&settings.log_level);

        Self {
            _temp_dir: temp_dir,
            data_dir,
            settings,
            gateway: Arc::new(MockEmbedder::new(TEST_DIMENSION)),
        }
    }

    /// Harness whose saves keep at most `max_files` files per extension.
    pub fn with_max_files(max_files: usize) -> Self {
        let mut harness = Self::new();
        harness.settings.retention = RetentionConfig::default().with_max_files(max_files);
        harness
    }

    /// Fresh store named [`TEST_STORE`] with the base schema.
    pub fn create_store(&self) -> Store {
        Store::create(
            TEST_STORE,
            &self.settings,
            Schema::base(),
            self.gateway.clone(),
        )
        .expect("Failed to create store")
    }

    /// Load [`TEST_STORE`] from its latest snapshot.
    pub fn load_store(&self) -> Result<Store, rag_store::StoreError> {
        Store::load(
            TEST_STORE,
            &self.settings,
            Schema::base(),
            self.gateway.clone(),
        )
    }

    /// Load a labelled snapshot into a store named [`TEST_STORE`].
    pub fn load_label(&self, label: &str) -> Result<Store, rag_store::StoreError> {
        Store::load_named(
            TEST_STORE,
            &self.settings,
            Schema::base(),
            self.gateway.clone(),
            label,
        )
    }

    /// Files in the snapshot directory with the given extension, sorted.
    pub fn files_with_extension(&self, extension: &str) -> Vec<String> {
        list_files(&self.data_dir, extension)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a test-friendly subscriber once.
///
/// `RUST_LOG` wins over `default_level` (normally `StoreSettings::log_level`).
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Ten distinct short questions.
pub fn sample_questions() -> Vec<&'static str> {
    vec![
        "Why is the sky blue?",
        "How does a plane fly?",
        "What makes a rainbow appear?",
        "Why do cats purr?",
        "How do magnets work?",
        "Why is the ocean salty?",
        "How do bees make honey?",
        "What causes thunder?",
        "Why do leaves change color?",
        "Why do we dream?",
    ]
}

/// Append every text with empty metadata.
pub fn append_all(store: &mut Store, texts: &[&str]) -> Vec<AppendOutcome> {
    texts
        .iter()
        .map(|text| {
            store
                .append(text, Record::new())
                .expect("Failed to append text")
        })
        .collect()
}

/// Random vector with components in `[-1, 1)`, never all zero.
pub fn random_vector(dimension: usize) -> Vec<f32> {
    let mut rng = rand::rng();
    loop {
        let v: Vec<f32> = (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect();
        if v.iter().any(|x| *x != 0.0) {
            return v;
        }
    }
}

/// Sorted names of files in `dir` ending in `.{extension}`.
pub fn list_files(dir: &Path, extension: &str) -> Vec<String> {
    let suffix = format!(".{}", extension);
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .filter(|name| name.ends_with(&suffix))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
