//! The store: one content table and one vector index kept in lockstep.
//!
//! Every mutation goes through [`Store::append`] (or its batch form), which
//! inserts the table row and the vector entry as one unit and re-checks
//! alignment afterwards. Any drift poisons the store: every later operation
//! fails with `StoreCorrupt` until a good snapshot is reloaded.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Utc};
use rag_embeddings::{Embedding, EmbeddingError, EmbeddingGateway};
use rag_types::StoreSettings;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::hasher::{content_hash, normalize, HashParams};
use crate::index::VectorIndex;
use crate::lifecycle::{enforce_retention, RetentionStats};
use crate::query::{search, QueryParams, RankedResults};
use crate::schema::{FieldValue, Record, Schema, CONTENT_FIELD, HASH_FIELD, NAME_FIELD};
use crate::snapshot::{self, SnapshotName};
use crate::table::ContentTable;

/// Result of a successful append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AppendOutcome {
    /// New record stored at `position`
    Inserted { hash: String, position: usize },
    /// Content with this hash is already stored; nothing changed
    DuplicateSkipped(String),
}

impl AppendOutcome {
    pub fn hash(&self) -> &str {
        match self {
            AppendOutcome::Inserted { hash, .. } => hash,
            AppendOutcome::DuplicateSkipped(hash) => hash,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, AppendOutcome::Inserted { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppendOutcome::DuplicateSkipped(_))
    }
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub name: String,
    /// Records, bootstrap included
    pub records: usize,
    /// Embedding dimension (0 before the first vector)
    pub dimension: usize,
    /// Bytes held by the vector index
    pub vector_bytes: u64,
    pub corrupt: bool,
    /// Base name of the last snapshot saved or loaded
    pub last_snapshot: Option<String>,
}

/// What a save wrote and what retention removed.
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub base: String,
    pub table_path: PathBuf,
    pub vector_path: PathBuf,
    pub rows: usize,
    pub retention: RetentionStats,
}

/// Check that table row `i` carries the hash of vector entry `i` for all `i`.
pub fn check_alignment(
    table: &ContentTable,
    index: &VectorIndex,
    hash_params: HashParams,
) -> Result<(), StoreError> {
    if table.len() != index.len() {
        return Err(StoreError::StoreCorrupt(format!(
            "{} table rows vs {} vectors",
            table.len(),
            index.len()
        )));
    }
    for position in 0..index.len() {
        let expected = index
            .normalized_at(position)
            .map(|normalized| content_hash(normalized, hash_params));
        let actual = table.row_at(position).and_then(Record::hash);
        if expected.as_deref() != actual {
            return Err(StoreError::StoreCorrupt(format!(
                "hash mismatch at position {}: vector {:?}, table {:?}",
                position, expected, actual
            )));
        }
    }
    Ok(())
}

fn check_store_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(StoreError::InvalidValue {
            field: NAME_FIELD.to_string(),
            reason: format!("invalid store name {:?}", name),
        });
    }
    Ok(())
}

fn check_store_schema(schema: &Schema) -> Result<(), StoreError> {
    for field in [HASH_FIELD, CONTENT_FIELD, NAME_FIELD] {
        if schema.field(field).is_none() {
            return Err(StoreError::Schema(format!(
                "store schema must declare `{}`",
                field
            )));
        }
    }
    if schema.key_field() != Some(HASH_FIELD) {
        return Err(StoreError::Schema(format!(
            "store schema must be keyed by `{}`",
            HASH_FIELD
        )));
    }
    Ok(())
}

/// Vector-indexed content store.
pub struct Store {
    name: String,
    data_dir: PathBuf,
    settings: StoreSettings,
    gateway: Arc<dyn EmbeddingGateway>,
    table: ContentTable,
    index: VectorIndex,
    hash_params: HashParams,
    query_params: QueryParams,
    corrupt: OnceLock<String>,
    last_saved: Option<DateTime<Utc>>,
    last_snapshot: Option<String>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("data_dir", &self.data_dir)
            .field("gateway", &self.gateway.info())
            .field("records", &self.table.len())
            .field("dimension", &self.index.dimension())
            .field("corrupt", &self.corrupt.get())
            .finish_non_exhaustive()
    }
}

impl Store {
    fn empty(
        name: &str,
        settings: &StoreSettings,
        schema: Schema,
        gateway: Arc<dyn EmbeddingGateway>,
    ) -> Result<Self, StoreError> {
        settings.validate()?;
        check_store_name(name)?;
        check_store_schema(&schema)?;

        Ok(Self {
            name: name.to_string(),
            data_dir: settings.expanded_data_dir(),
            settings: settings.clone(),
            gateway,
            table: ContentTable::new(schema),
            index: VectorIndex::new(),
            hash_params: HashParams::new(settings.hash_prefix_len, settings.hash_len),
            query_params: QueryParams {
                min_candidates: settings.min_candidates,
                candidate_divisor: settings.candidate_divisor,
            },
            corrupt: OnceLock::new(),
            last_saved: None,
            last_snapshot: None,
        })
    }

    /// Create a fresh store holding only its bootstrap record.
    ///
    /// The bootstrap record's content and name are the store name, embedded
    /// through the gateway like any other record.
    pub fn create(
        name: &str,
        settings: &StoreSettings,
        schema: Schema,
        gateway: Arc<dyn EmbeddingGateway>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::empty(name, settings, schema, gateway)?;

        let bootstrap = store.table.schema().bootstrap_record(name)?;
        let embedding = store.gateway.embed(name)?;
        store.insert_embedded(name, bootstrap, embedding)?;

        info!(
            store = %store.name,
            dimension = store.index.dimension().unwrap_or(0),
            "Created store"
        );
        Ok(store)
    }

    /// Load the latest snapshot for `name`, or create the store if none exists.
    pub fn open(
        name: &str,
        settings: &StoreSettings,
        schema: Schema,
        gateway: Arc<dyn EmbeddingGateway>,
    ) -> Result<Self, StoreError> {
        match Self::load(name, settings, schema.clone(), gateway.clone()) {
            Err(StoreError::SnapshotNotFound(what)) => {
                info!(store = %name, snapshot = %what, "No snapshot found, creating store");
                Self::create(name, settings, schema, gateway)
            }
            other => other,
        }
    }

    /// Open the store named by `settings.store_name` with the base schema
    /// unioned with `settings.schema_files`.
    pub fn from_settings(
        settings: &StoreSettings,
        gateway: Arc<dyn EmbeddingGateway>,
    ) -> Result<Self, StoreError> {
        let schema = Schema::from_files(settings.schema_files.as_slice())?;
        Self::open(&settings.store_name, settings, schema, gateway)
    }

    /// Load the latest snapshot saved under the store's own name.
    pub fn load(
        name: &str,
        settings: &StoreSettings,
        schema: Schema,
        gateway: Arc<dyn EmbeddingGateway>,
    ) -> Result<Self, StoreError> {
        Self::load_named(name, settings, schema, gateway, name)
    }

    /// Load the latest snapshot saved under `label`.
    ///
    /// Missing snapshots are `SnapshotNotFound`; half a snapshot, a row
    /// count mismatch or a hash mismatch is `StoreCorrupt`.
    pub fn load_named(
        name: &str,
        settings: &StoreSettings,
        schema: Schema,
        gateway: Arc<dyn EmbeddingGateway>,
        label: &str,
    ) -> Result<Self, StoreError> {
        let mut store = Self::empty(name, settings, schema, gateway)?;
        store.restore(label)?;
        Ok(store)
    }

    /// Replace in-memory state with the latest snapshot under the store's
    /// name. Clears corruption on success; leaves state untouched on failure.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let label = self.name.clone();
        self.restore(&label)
    }

    /// Like [`Store::reload`] for an explicit snapshot label.
    pub fn reload_named(&mut self, label: &str) -> Result<(), StoreError> {
        self.restore(label)
    }

    fn restore(&mut self, label: &str) -> Result<(), StoreError> {
        let paths = snapshot::resolve_pair(&self.data_dir, label)?;
        let (table, index) = snapshot::load_snapshot(&paths, self.table.schema())?;
        check_alignment(&table, &index, self.hash_params)?;

        if let Some(dimension) = index.dimension() {
            let expected = self.gateway.info().dimension;
            if expected != dimension {
                warn!(
                    store = %self.name,
                    snapshot_dimension = dimension,
                    gateway_dimension = expected,
                    "Snapshot dimension differs from gateway; appends will be rejected"
                );
            }
        }

        if let Some(ts) = paths.name.timestamp {
            let ts = ts.and_utc();
            self.last_saved = Some(self.last_saved.map_or(ts, |prev| prev.max(ts)));
        }
        self.table = table;
        self.index = index;
        self.corrupt = OnceLock::new();
        self.last_snapshot = Some(paths.name.base());

        info!(
            store = %self.name,
            snapshot = %paths.name.base(),
            records = self.table.len(),
            "Loaded store"
        );
        Ok(())
    }

    fn ensure_healthy(&self) -> Result<(), StoreError> {
        match self.corrupt.get() {
            Some(reason) => Err(StoreError::StoreCorrupt(reason.clone())),
            None => Ok(()),
        }
    }

    fn poison(&self, reason: String) -> StoreError {
        error!(store = %self.name, reason = %reason, "Store corrupt, refusing further operations");
        let _ = self.corrupt.set(reason.clone());
        StoreError::StoreCorrupt(reason)
    }

    fn build_record(&self, text: &str, metadata: Record, hash: &str) -> Result<Record, StoreError> {
        let schema = self.table.schema();
        let mut record = metadata;
        record.insert(CONTENT_FIELD, FieldValue::Text(text.to_string()));
        record.insert(HASH_FIELD, FieldValue::Text(hash.to_string()));
        record.insert(NAME_FIELD, FieldValue::Category(self.name.clone()));
        schema.apply_defaults(&mut record)?;
        schema.conform(&mut record)?;
        schema.validate(&record)?;
        Ok(record)
    }

    /// Insert one embedded text. Everything that can be rejected is checked
    /// before the table is touched.
    fn insert_embedded(
        &mut self,
        text: &str,
        metadata: Record,
        embedding: Embedding,
    ) -> Result<AppendOutcome, StoreError> {
        if embedding.is_empty() {
            return Err(EmbeddingError::EmptyVector.into());
        }
        self.index.check_dimension(embedding.dimension())?;
        let normalized = normalize(&embedding.values)?;
        let hash = content_hash(&normalized, self.hash_params);

        if self.table.contains(&hash) {
            debug!(store = %self.name, hash = %hash, "Duplicate content skipped");
            return Ok(AppendOutcome::DuplicateSkipped(hash));
        }

        let record = self.build_record(text, metadata, &hash)?;
        let position = self.table.len();
        self.table.append(record)?;

        if let Err(e) = self.index.push(&embedding.values, &normalized) {
            return Err(self.poison(format!(
                "vector push failed after table append at position {}: {}",
                position, e
            )));
        }
        self.check_tail(position, &hash)?;

        debug!(store = %self.name, hash = %hash, position, "Appended record");
        Ok(AppendOutcome::Inserted { hash, position })
    }

    fn check_tail(&self, position: usize, hash: &str) -> Result<(), StoreError> {
        let vector_hash = self
            .index
            .normalized_at(position)
            .map(|normalized| content_hash(normalized, self.hash_params));
        let aligned = self.table.len() == self.index.len()
            && self.table.key_at(position) == Some(hash)
            && vector_hash.as_deref() == Some(hash);
        if !aligned {
            return Err(self.poison(format!(
                "misaligned after append at position {}: {} rows, {} vectors",
                position,
                self.table.len(),
                self.index.len()
            )));
        }
        Ok(())
    }

    /// Embed `text` and store it with `metadata`.
    ///
    /// `content`, `hash` and `name` are set by the store and override any
    /// caller-supplied values. Declared defaults fill omitted fields.
    pub fn append(&mut self, text: &str, metadata: Record) -> Result<AppendOutcome, StoreError> {
        self.ensure_healthy()?;
        let embedding = self.gateway.embed(text)?;
        self.insert_embedded(text, metadata, embedding)
    }

    /// Append several texts with a single gateway request.
    ///
    /// Items are inserted in order; the first failing item stops the batch
    /// and earlier items stay stored.
    pub fn append_batch(
        &mut self,
        items: Vec<(String, Record)>,
    ) -> Result<Vec<AppendOutcome>, StoreError> {
        self.ensure_healthy()?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = items.iter().map(|(text, _)| text.as_str()).collect();
        let embeddings = self.gateway.embed_batch(&texts)?;
        if embeddings.len() != items.len() {
            return Err(EmbeddingError::BatchMismatch {
                sent: items.len(),
                received: embeddings.len(),
            }
            .into());
        }

        let mut outcomes = Vec::with_capacity(items.len());
        for ((text, metadata), embedding) in items.into_iter().zip(embeddings) {
            outcomes.push(self.insert_embedded(&text, metadata, embedding)?);
        }

        let inserted = outcomes.iter().filter(|o| o.is_inserted()).count();
        info!(
            store = %self.name,
            inserted,
            skipped = outcomes.len() - inserted,
            "Appended batch"
        );
        Ok(outcomes)
    }

    /// Embed `text` and return its `k` nearest records.
    pub fn query(&self, text: &str, k: usize) -> Result<RankedResults, StoreError> {
        self.ensure_healthy()?;
        let embedding = self.gateway.embed(text)?;
        self.query_vector(&embedding, k)
    }

    /// [`Store::query`] with the configured default `k`.
    pub fn query_default(&self, text: &str) -> Result<RankedResults, StoreError> {
        self.query(text, self.settings.default_top_k)
    }

    /// Nearest records to an already embedded query.
    pub fn query_vector(&self, embedding: &Embedding, k: usize) -> Result<RankedResults, StoreError> {
        self.ensure_healthy()?;
        if embedding.is_empty() {
            return Err(EmbeddingError::EmptyVector.into());
        }

        let results = match search(
            &self.index,
            &self.table,
            &embedding.values,
            k,
            self.query_params,
            self.hash_params,
        ) {
            Err(StoreError::StoreCorrupt(reason)) => return Err(self.poison(reason)),
            other => other?,
        };

        debug!(
            store = %self.name,
            k,
            results = results.len(),
            candidates = results.candidates,
            elapsed_us = results.elapsed.as_micros() as u64,
            "Query complete"
        );
        Ok(results)
    }

    /// Record stored under `hash`.
    pub fn get(&self, hash: &str) -> Result<Option<&Record>, StoreError> {
        self.ensure_healthy()?;
        Ok(self.table.lookup(hash))
    }

    /// Records in insertion order, bootstrap first.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.table.iter()
    }

    /// Raw vector stored at `position`.
    pub fn raw_vector(&self, position: usize) -> Option<&[f32]> {
        self.index.raw_at(position)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.index.dimension()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        self.table.schema()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn is_corrupt(&self) -> bool {
        self.corrupt.get().is_some()
    }

    /// Why the store refuses operations, if it does.
    pub fn corruption_reason(&self) -> Option<&str> {
        self.corrupt.get().map(String::as_str)
    }

    /// Full alignment check; poisons the store on failure.
    pub fn verify(&self) -> Result<(), StoreError> {
        self.ensure_healthy()?;
        match check_alignment(&self.table, &self.index, self.hash_params) {
            Err(StoreError::StoreCorrupt(reason)) => Err(self.poison(reason)),
            other => other,
        }
    }

    pub fn stats(&self) -> StoreStats {
        let index = self.index.stats();
        StoreStats {
            name: self.name.clone(),
            records: self.table.len(),
            dimension: index.dimension,
            vector_bytes: index.size_bytes,
            corrupt: self.is_corrupt(),
            last_snapshot: self.last_snapshot.clone(),
        }
    }

    /// Snapshot time that is strictly later than any previous one.
    fn next_snapshot_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let now = DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now);
        let at = match self.last_saved {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        self.last_saved = Some(at);
        at
    }

    /// Write a timestamped snapshot, then apply retention.
    pub fn save(&mut self) -> Result<SaveReport, StoreError> {
        self.ensure_healthy()?;
        let at = self.next_snapshot_time();
        self.write_snapshot(SnapshotName::timestamped(self.name.clone(), at))
    }

    /// Write a snapshot under an explicit label, then apply retention.
    pub fn save_as(&mut self, label: &str) -> Result<SaveReport, StoreError> {
        self.ensure_healthy()?;
        check_store_name(label)?;
        self.write_snapshot(SnapshotName::named(label))
    }

    fn write_snapshot(&mut self, name: SnapshotName) -> Result<SaveReport, StoreError> {
        let paths = match snapshot::save_snapshot(&self.data_dir, name, &self.table, &self.index) {
            Err(StoreError::StoreCorrupt(reason)) => return Err(self.poison(reason)),
            other => other?,
        };

        let retention = enforce_retention(&self.data_dir, &self.settings.retention)?;
        if retention.has_errors() {
            warn!(
                store = %self.name,
                errors = ?retention.errors,
                "Retention left files behind"
            );
        }

        let base = paths.name.base();
        self.last_snapshot = Some(base.clone());
        Ok(SaveReport {
            base,
            table_path: paths.table,
            vector_path: paths.vectors,
            rows: self.table.len(),
            retention,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType, SchemaFragment};
    use rag_embeddings::MockEmbedder;
    use rag_types::RetentionConfig;
    use tempfile::TempDir;

    const DIM: usize = 16;

    fn settings(temp: &TempDir) -> StoreSettings {
        StoreSettings::with_data_dir(temp.path())
    }

    fn new_store(temp: &TempDir) -> (Store, Arc<MockEmbedder>) {
        let mock = Arc::new(MockEmbedder::new(DIM));
        let store = Store::create("docs", &settings(temp), Schema::base(), mock.clone()).unwrap();
        (store, mock)
    }

    #[test]
    fn test_create_inserts_bootstrap() {
        let temp = TempDir::new().unwrap();
        let (store, _mock) = new_store(&temp);

        assert_eq!(store.len(), 1);
        assert_eq!(store.dimension(), Some(DIM));
        let bootstrap = store.records().next().unwrap();
        assert_eq!(bootstrap.content(), Some("docs"));
        assert_eq!(bootstrap.get_str(NAME_FIELD), Some("docs"));
        assert!(store.verify().is_ok());
    }

    #[test]
    fn test_append_then_duplicate() {
        let temp = TempDir::new().unwrap();
        let (mut store, _mock) = new_store(&temp);

        let first = store.append("How does a plane fly?", Record::new()).unwrap();
        let second = store.append("How does a plane fly?", Record::new()).unwrap();

        assert!(first.is_inserted());
        assert_eq!(second, AppendOutcome::DuplicateSkipped(first.hash().to_string()));
        assert_eq!(store.len(), 2);
        let stored = store.get(first.hash()).unwrap().unwrap();
        assert_eq!(stored.content(), Some("How does a plane fly?"));
    }

    #[test]
    fn test_metadata_defaults_and_coercion() {
        let temp = TempDir::new().unwrap();
        let schema = Schema::base()
            .with_fragment(SchemaFragment::new(vec![
                FieldSpec::new("source", FieldType::Category).with_default("manual"),
                FieldSpec::new("score", FieldType::Float),
            ]))
            .unwrap();
        let mock = Arc::new(MockEmbedder::new(DIM));
        let mut store = Store::create("docs", &settings(&temp), schema, mock).unwrap();

        let outcome = store
            .append("Why do we dream?", Record::new().with("score", 3i64))
            .unwrap();
        let record = store.get(outcome.hash()).unwrap().unwrap();
        assert_eq!(record.get("source"), Some(&FieldValue::Category("manual".into())));
        assert_eq!(record.get("score"), Some(&FieldValue::Float(3.0)));
    }

    #[test]
    fn test_schema_mismatch_leaves_store_unchanged() {
        let temp = TempDir::new().unwrap();
        let (mut store, _mock) = new_store(&temp);

        let result = store.append("hello", Record::new().with("colour", "red"));
        assert!(matches!(result, Err(StoreError::SchemaMismatch { .. })));
        assert_eq!(store.len(), 1);
        assert!(!store.is_corrupt());
    }

    #[test]
    fn test_degenerate_and_empty_vectors() {
        let temp = TempDir::new().unwrap();
        let (mut store, mock) = new_store(&temp);
        mock.pin("zeros", vec![0.0; DIM]);
        mock.pin("nothing", Vec::new());

        assert!(matches!(
            store.append("zeros", Record::new()),
            Err(StoreError::DegenerateVector)
        ));
        assert!(matches!(
            store.append("nothing", Record::new()),
            Err(StoreError::EmbeddingUnavailable(EmbeddingError::EmptyVector))
        ));
        assert_eq!(store.len(), 1);
        assert!(!store.is_corrupt());
    }

    #[test]
    fn test_dimension_change_rejected_before_mutation() {
        let temp = TempDir::new().unwrap();
        let (mut store, mock) = new_store(&temp);
        mock.pin("short", vec![1.0; DIM / 2]);

        assert!(matches!(
            store.append("short", Record::new()),
            Err(StoreError::DimensionMismatch { expected: DIM, actual }) if actual == DIM / 2
        ));
        assert_eq!(store.len(), 1);
        assert!(store.verify().is_ok());
    }

    #[test]
    fn test_gateway_failure_surfaces() {
        let temp = TempDir::new().unwrap();
        let (mut store, mock) = new_store(&temp);
        mock.set_failing(true);

        assert!(matches!(
            store.append("anything", Record::new()),
            Err(StoreError::EmbeddingUnavailable(_))
        ));
        assert!(matches!(
            store.query("anything", 3),
            Err(StoreError::EmbeddingUnavailable(_))
        ));

        mock.set_failing(false);
        assert!(store.append("anything", Record::new()).unwrap().is_inserted());
    }

    #[test]
    fn test_drift_poisons_store() {
        let temp = TempDir::new().unwrap();
        let (mut store, _mock) = new_store(&temp);
        store.append("first", Record::new()).unwrap();

        // Grow the index behind the table's back.
        store.index.push(&[1.0; DIM], &[0.25; DIM]).unwrap();

        assert!(matches!(store.verify(), Err(StoreError::StoreCorrupt(_))));
        assert!(store.is_corrupt());
        assert!(store
            .corruption_reason()
            .is_some_and(|reason| reason.contains("2 table rows vs 3 vectors")));
        assert!(matches!(
            store.append("second", Record::new()),
            Err(StoreError::StoreCorrupt(_))
        ));
        assert!(matches!(store.query("first", 1), Err(StoreError::StoreCorrupt(_))));
        assert!(matches!(store.get("x"), Err(StoreError::StoreCorrupt(_))));
        assert!(matches!(store.save(), Err(StoreError::StoreCorrupt(_))));
    }

    #[test]
    fn test_reload_clears_corruption() {
        let temp = TempDir::new().unwrap();
        let (mut store, _mock) = new_store(&temp);
        store.append("first", Record::new()).unwrap();
        store.save().unwrap();

        store.index.push(&[1.0; DIM], &[0.25; DIM]).unwrap();
        assert!(store.verify().is_err());

        store.reload().unwrap();
        assert!(!store.is_corrupt());
        assert_eq!(store.corruption_reason(), None);
        assert_eq!(store.len(), 2);
        assert!(store.query("first", 1).is_ok());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let (mut store, mock) = new_store(&temp);
        store.append("Why is the sky blue?", Record::new()).unwrap();
        store.append("How does a plane fly?", Record::new()).unwrap();
        let report = store.save().unwrap();
        assert_eq!(report.rows, 3);
        assert!(report.table_path.exists());
        assert!(report.vector_path.exists());

        let loaded = Store::load("docs", &settings(&temp), Schema::base(), mock).unwrap();
        assert_eq!(loaded.len(), 3);
        for (a, b) in loaded.records().zip(store.records()) {
            assert_eq!(a, b);
        }
        for i in 0..3 {
            assert_eq!(loaded.raw_vector(i), store.raw_vector(i));
        }
        assert_eq!(loaded.stats().last_snapshot, Some(report.base));
    }

    #[test]
    fn test_save_names_strictly_increase() {
        let temp = TempDir::new().unwrap();
        let (mut store, _mock) = new_store(&temp);

        let first = store.save().unwrap().base;
        let second = store.save().unwrap().base;
        assert!(second > first, "{} should sort after {}", second, first);
    }

    #[test]
    fn test_save_as_and_load_named() {
        let temp = TempDir::new().unwrap();
        let (mut store, mock) = new_store(&temp);
        store.append("pinned copy", Record::new()).unwrap();
        let report = store.save_as("golden").unwrap();
        assert_eq!(report.base, "golden");

        let loaded =
            Store::load_named("docs", &settings(&temp), Schema::base(), mock, "golden").unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_open_creates_then_loads() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockEmbedder::new(DIM));

        let mut store = Store::open("docs", &settings(&temp), Schema::base(), mock.clone()).unwrap();
        assert_eq!(store.len(), 1);
        store.append("kept", Record::new()).unwrap();
        store.save().unwrap();

        let reopened = Store::open("docs", &settings(&temp), Schema::base(), mock).unwrap();
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn test_load_missing_snapshot() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockEmbedder::new(DIM));
        assert!(matches!(
            Store::load("docs", &settings(&temp), Schema::base(), mock),
            Err(StoreError::SnapshotNotFound(_))
        ));
    }

    #[test]
    fn test_append_batch_skips_duplicates() {
        let temp = TempDir::new().unwrap();
        let (mut store, mock) = new_store(&temp);
        let before = mock.request_count();

        let outcomes = store
            .append_batch(vec![
                ("alpha beta".to_string(), Record::new()),
                ("gamma delta".to_string(), Record::new()),
                ("alpha beta".to_string(), Record::new()),
            ])
            .unwrap();

        assert_eq!(mock.request_count(), before + 1);
        assert_eq!(
            outcomes.iter().map(|o| o.is_inserted()).collect::<Vec<_>>(),
            vec![true, true, false]
        );
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_query_vector_exact_match() {
        let temp = TempDir::new().unwrap();
        let (mut store, _mock) = new_store(&temp);
        for text in ["red apples", "green pears", "blue berries"] {
            store.append(text, Record::new()).unwrap();
        }

        let target = Embedding::new(store.raw_vector(2).unwrap().to_vec());
        let results = store.query_vector(&target, 1).unwrap();
        assert_eq!(results.len(), 1);
        let hit = results.first().unwrap();
        assert_eq!(hit.position, 2);
        assert!(hit.distance.abs() < 1e-6);
        assert_eq!(hit.record.content(), Some("green pears"));
    }

    #[test]
    fn test_results_serialize() {
        let temp = TempDir::new().unwrap();
        let (mut store, _mock) = new_store(&temp);
        store.append("Why is the sky blue?", Record::new()).unwrap();

        let results = store.query("Why is the sky blue?", 2).unwrap();
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["records"][0]["record"]["content"], "Why is the sky blue?");
        assert_eq!(json["records"][0]["bucket"], "Q1");
        assert_eq!(json["stats"]["count"], 2);

        let stats = serde_json::to_value(store.stats()).unwrap();
        assert_eq!(stats["records"], 2);
        assert_eq!(stats["corrupt"], false);
    }

    #[test]
    fn test_query_default_uses_configured_k() {
        let temp = TempDir::new().unwrap();
        let mut settings = settings(&temp);
        settings.default_top_k = 2;
        let mock = Arc::new(MockEmbedder::new(DIM));
        let mut store = Store::create("docs", &settings, Schema::base(), mock).unwrap();
        for text in ["one fish", "two fish", "red fish", "blue fish"] {
            store.append(text, Record::new()).unwrap();
        }

        assert_eq!(store.query_default("fish").unwrap().len(), 2);
    }

    #[test]
    fn test_retention_runs_after_save() {
        let temp = TempDir::new().unwrap();
        let mut settings = settings(&temp);
        settings.retention = RetentionConfig::default().with_max_files(2);
        let mock = Arc::new(MockEmbedder::new(DIM));
        let mut store = Store::create("docs", &settings, Schema::base(), mock).unwrap();

        let mut deleted = 0;
        for _ in 0..4 {
            deleted += store.save().unwrap().retention.total_deleted();
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        assert_eq!(deleted, 4);
        assert_eq!(snapshot::list_snapshots(temp.path(), "docs").unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_store_name_and_schema() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockEmbedder::new(DIM));
        assert!(Store::create("", &settings(&temp), Schema::base(), mock.clone()).is_err());
        assert!(matches!(
            Store::create("docs", &settings(&temp), Schema::empty(), mock),
            Err(StoreError::Schema(_))
        ));
    }
}
