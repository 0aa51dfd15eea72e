//! End-to-end snapshot tests: round-trip, retention and resolution.

use std::thread::sleep;
use std::time::Duration;

use pretty_assertions::assert_eq;

use e2e_tests::{append_all, sample_questions, TestHarness, TEST_STORE};
use rag_store::{list_snapshots, Record, StoreError};

/// save() then load() reproduces the same rows, hashes and vectors.
#[test]
fn test_save_load_round_trip() {
    // 1. Build and save a store
    let harness = TestHarness::new();
    let mut store = harness.create_store();
    append_all(&mut store, &sample_questions());
    let report = store.save().expect("save");
    assert_eq!(report.rows, 11);

    // 2. Load into a fresh store of the same name
    let loaded = harness.load_store().expect("load");

    // 3. Compare both halves
    assert_eq!(loaded.len(), store.len());
    assert_eq!(loaded.dimension(), store.dimension());
    for (position, (a, b)) in loaded.records().zip(store.records()).enumerate() {
        assert_eq!(a, b);
        assert_eq!(loaded.raw_vector(position), store.raw_vector(position));
    }
    assert!(loaded.verify().is_ok());

    // 4. The loaded store keeps working
    let results = loaded.query("Why do we dream?", 1).expect("query");
    assert_eq!(
        results.first().and_then(|r| r.record.content()),
        Some("Why do we dream?")
    );
}

/// Metadata columns survive a round trip with their types.
#[test]
fn test_round_trip_with_schema_fragment() {
    let harness = TestHarness::new();
    let fragment_path = harness.data_dir.with_file_name("fields.toml");
    std::fs::write(
        &fragment_path,
        r#"
[[fields]]
name = "topic"
type = "category"
default = "general"

[[fields]]
name = "rank"
type = "integer"
default = 0
"#,
    )
    .expect("write schema fragment");

    let mut settings = harness.settings.clone();
    settings.store_name = "facts".to_string();
    settings.schema_files = vec![fragment_path.to_string_lossy().to_string()];

    let mut store =
        rag_store::Store::from_settings(&settings, harness.gateway.clone()).expect("open");
    store
        .append(
            "Why is the ocean salty?",
            Record::new().with("topic", "science").with("rank", 3i64),
        )
        .expect("append with metadata");
    store
        .append("How do bees make honey?", Record::new())
        .expect("append with defaults");
    store.save().expect("save");

    let reopened =
        rag_store::Store::from_settings(&settings, harness.gateway.clone()).expect("reopen");
    assert_eq!(reopened.len(), 3);
    let rows: Vec<(Option<&str>, Option<String>)> = reopened
        .records()
        .skip(1)
        .map(|r| (r.get_str("topic"), r.get("rank").map(|v| v.render())))
        .collect();
    assert_eq!(
        rows,
        vec![
            (Some("science"), Some("3".to_string())),
            (Some("general"), Some("0".to_string())),
        ]
    );
}

/// Six saves with max_files = 4 leave the four newest files per extension.
#[test]
fn test_retention_after_six_saves() {
    let harness = TestHarness::with_max_files(4);
    let mut store = harness.create_store();

    let mut bases = Vec::new();
    for question in sample_questions().into_iter().take(6) {
        store.append(question, Record::new()).expect("append");
        bases.push(store.save().expect("save").base);
        sleep(Duration::from_millis(20));
    }

    let csv = harness.files_with_extension("csv");
    let npy = harness.files_with_extension("npy");
    assert_eq!(csv.len(), 4);
    assert_eq!(npy.len(), 4);

    let expected: Vec<String> = bases[2..].iter().map(|b| format!("{}.csv", b)).collect();
    assert_eq!(csv, expected);

    let listed: Vec<String> = list_snapshots(&harness.data_dir, TEST_STORE)
        .expect("list")
        .iter()
        .map(|s| s.base())
        .collect();
    assert_eq!(listed, bases[2..].to_vec());

    // The newest snapshot is the one that loads.
    let loaded = harness.load_store().expect("load");
    assert_eq!(loaded.len(), 7);
}

/// A labelled snapshot loads independently of timestamped ones.
#[test]
fn test_save_as_label() {
    let harness = TestHarness::new();
    let mut store = harness.create_store();
    append_all(&mut store, &sample_questions()[..2]);
    store.save_as("golden").expect("save_as");
    append_all(&mut store, &sample_questions()[2..4]);
    store.save().expect("save");

    assert_eq!(harness.load_label("golden").expect("load golden").len(), 3);
    assert_eq!(harness.load_store().expect("load latest").len(), 5);
}

/// Loading with no snapshot is SnapshotNotFound; open() creates instead.
#[test]
fn test_missing_snapshot() {
    let harness = TestHarness::new();
    assert!(matches!(
        harness.load_store(),
        Err(StoreError::SnapshotNotFound(_))
    ));

    let store = rag_store::Store::open(
        TEST_STORE,
        &harness.settings,
        rag_store::Schema::base(),
        harness.gateway.clone(),
    )
    .expect("open creates");
    assert_eq!(store.len(), 1);
}

/// Deleting the vector half of the latest snapshot is a hard load error.
#[test]
fn test_missing_vector_file_refused() {
    let harness = TestHarness::new();
    let mut store = harness.create_store();
    let report = store.save().expect("save");
    std::fs::remove_file(&report.vector_path).expect("remove npy");

    assert!(matches!(
        harness.load_store(),
        Err(StoreError::StoreCorrupt(_))
    ));
}

/// The latest table and latest vector file must belong to the same snapshot.
#[test]
fn test_divergent_latest_pair_refused() {
    let harness = TestHarness::new();
    let mut store = harness.create_store();
    store.save().expect("first save");
    store.append("How do magnets work?", Record::new()).expect("append");
    let second = store.save().expect("second save");
    std::fs::remove_file(&second.table_path).expect("remove csv");

    assert!(matches!(
        harness.load_store(),
        Err(StoreError::StoreCorrupt(_))
    ));
}
