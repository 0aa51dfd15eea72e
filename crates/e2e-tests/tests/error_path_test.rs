//! End-to-end error path tests.
//!
//! Gateway failures, rejected records and tampered snapshots must surface
//! as errors without changing what the store holds.

use std::fs;

use pretty_assertions::assert_eq;

use e2e_tests::{append_all, sample_questions, TestHarness, TEST_DIMENSION};
use rag_store::{EmbeddingError, Record, StoreError};

/// Gateway outages reach the caller unchanged and leave the store intact.
#[test]
fn test_gateway_failure_surfaces() {
    let harness = TestHarness::new();
    let mut store = harness.create_store();
    append_all(&mut store, &sample_questions()[..3]);

    harness.gateway.set_failing(true);
    assert!(matches!(
        store.append("How do magnets work?", Record::new()),
        Err(StoreError::EmbeddingUnavailable(EmbeddingError::Unavailable(_)))
    ));
    assert!(matches!(
        store.query("Why is the sky blue?", 3),
        Err(StoreError::EmbeddingUnavailable(_))
    ));
    assert_eq!(store.len(), 4);
    assert!(!store.is_corrupt());

    // Recovers once the gateway does.
    harness.gateway.set_failing(false);
    assert!(store.query("Why is the sky blue?", 3).is_ok());
}

/// Zero vectors, empty vectors and wrong dimensions are rejected per call.
#[test]
fn test_bad_vectors_rejected() {
    let harness = TestHarness::new();
    let mut store = harness.create_store();
    harness.gateway.pin("silence", vec![0.0; TEST_DIMENSION]);
    harness.gateway.pin("void", Vec::new());
    harness.gateway.pin("tiny", vec![0.5; 3]);

    assert!(matches!(
        store.append("silence", Record::new()),
        Err(StoreError::DegenerateVector)
    ));
    assert!(matches!(
        store.append("void", Record::new()),
        Err(StoreError::EmbeddingUnavailable(EmbeddingError::EmptyVector))
    ));
    assert!(matches!(
        store.append("tiny", Record::new()),
        Err(StoreError::DimensionMismatch { actual: 3, .. })
    ));
    assert!(matches!(
        store.query("tiny", 1),
        Err(StoreError::DimensionMismatch { .. })
    ));

    assert_eq!(store.len(), 1);
    assert!(store.verify().is_ok());
}

/// Unknown metadata fields are rejected before anything is written.
#[test]
fn test_schema_mismatch_rejected() {
    let harness = TestHarness::new();
    let mut store = harness.create_store();

    match store.append("Why do cats purr?", Record::new().with("mood", "happy")) {
        Err(StoreError::SchemaMismatch {
            missing,
            unexpected,
        }) => {
            assert!(missing.is_empty());
            assert_eq!(unexpected, vec!["mood".to_string()]);
        }
        other => panic!("expected schema mismatch, got {:?}", other),
    }
    assert_eq!(store.len(), 1);
}

/// A table row whose hash no longer matches its vector refuses to load.
#[test]
fn test_tampered_hash_refused() {
    let harness = TestHarness::new();
    let mut store = harness.create_store();
    append_all(&mut store, &sample_questions()[..3]);
    let report = store.save_as("tampered").expect("save");

    let hash = store
        .records()
        .nth(2)
        .and_then(|r| r.hash())
        .expect("hash of row 2")
        .to_string();
    let csv = fs::read_to_string(&report.table_path).expect("read csv");
    fs::write(&report.table_path, csv.replace(&hash, "0000000000000000")).expect("write csv");

    assert!(matches!(
        harness.load_label("tampered"),
        Err(StoreError::StoreCorrupt(_))
    ));
}

/// A table with fewer rows than the vector file refuses to load.
#[test]
fn test_row_count_mismatch_refused() {
    let harness = TestHarness::new();
    let mut store = harness.create_store();
    append_all(&mut store, &sample_questions()[..3]);
    let report = store.save_as("short").expect("save");

    let csv = fs::read_to_string(&report.table_path).expect("read csv");
    let kept: Vec<&str> = csv.lines().take(3).collect();
    fs::write(&report.table_path, kept.join("\n") + "\n").expect("write csv");

    assert!(matches!(
        harness.load_label("short"),
        Err(StoreError::StoreCorrupt(_))
    ));
}

/// A truncated vector file is a format error.
#[test]
fn test_truncated_vector_file_refused() {
    let harness = TestHarness::new();
    let mut store = harness.create_store();
    append_all(&mut store, &sample_questions()[..2]);
    let report = store.save_as("truncated").expect("save");

    let bytes = fs::read(&report.vector_path).expect("read npy");
    fs::write(&report.vector_path, &bytes[..bytes.len() - 8]).expect("write npy");

    assert!(matches!(
        harness.load_label("truncated"),
        Err(StoreError::Format(_))
    ));
}

/// A failed reload leaves the live store as it was; a good one replaces it.
#[test]
fn test_reload_from_known_good_snapshot() {
    let harness = TestHarness::new();
    let mut store = harness.create_store();
    append_all(&mut store, &sample_questions()[..2]);
    store.save_as("good").expect("save good");
    let bad = store.save_as("bad").expect("save bad");
    fs::remove_file(&bad.vector_path).expect("remove npy");
    append_all(&mut store, &sample_questions()[2..4]);

    assert!(matches!(
        store.reload_named("bad"),
        Err(StoreError::StoreCorrupt(_))
    ));
    assert_eq!(store.len(), 5);

    store.reload_named("good").expect("reload good");
    assert_eq!(store.len(), 3);
    assert!(store.verify().is_ok());
}
