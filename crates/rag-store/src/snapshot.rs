//! Snapshot files.
//!
//! A snapshot is a pair of files sharing one base name in the data
//! directory: `{base}.csv` for the content table and `{base}.npy` for the
//! vector index. The base is either a logical label (`docs`) or a label
//! with a timestamp suffix (`docs-20240115T103000123456`).
//!
//! Resolution runs the same procedure on each extension independently and
//! then requires both to land on the same base. Anything else is a
//! half-restored store and is refused.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::index::VectorIndex;
use crate::npy;
use crate::schema::{FieldValue, Record, Schema};
use crate::table::ContentTable;

/// Extension of the tabular file.
pub const TABLE_EXTENSION: &str = "csv";
/// Extension of the binary array file.
pub const VECTOR_EXTENSION: &str = "npy";
/// Timestamp suffix format (UTC, microseconds, no separators).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%6f";

/// Parsed snapshot base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotName {
    pub label: String,
    pub timestamp: Option<NaiveDateTime>,
}

impl SnapshotName {
    pub fn named(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            timestamp: None,
        }
    }

    pub fn timestamped(label: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            label: label.into(),
            timestamp: Some(at.naive_utc()),
        }
    }

    /// Parse a file stem; a trailing `-{timestamp}` is split off when it
    /// matches [`TIMESTAMP_FORMAT`].
    pub fn parse(stem: &str) -> Self {
        if let Some((label, suffix)) = stem.rsplit_once('-') {
            if let Ok(ts) = NaiveDateTime::parse_from_str(suffix, TIMESTAMP_FORMAT) {
                if !label.is_empty() {
                    return Self {
                        label: label.to_string(),
                        timestamp: Some(ts),
                    };
                }
            }
        }
        Self::named(stem)
    }

    /// Base file name without extension.
    pub fn base(&self) -> String {
        match self.timestamp {
            Some(ts) => format!("{}-{}", self.label, ts.format(TIMESTAMP_FORMAT)),
            None => self.label.clone(),
        }
    }

    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.base(), extension)
    }

    pub fn path(&self, dir: &Path, extension: &str) -> PathBuf {
        dir.join(self.file_name(extension))
    }
}

/// Paths of one complete snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub name: SnapshotName,
    pub table: PathBuf,
    pub vectors: PathBuf,
}

impl SnapshotPaths {
    pub fn new(dir: &Path, name: SnapshotName) -> Self {
        Self {
            table: name.path(dir, TABLE_EXTENSION),
            vectors: name.path(dir, VECTOR_EXTENSION),
            name,
        }
    }
}

struct Candidate {
    name: SnapshotName,
    recency: DateTime<Utc>,
    file_name: String,
}

/// Snapshots for `label` with the given extension, oldest first.
///
/// Timestamped names order by their timestamp; plain logical names fall
/// back to the file's modification time. The file name breaks ties.
fn candidates(dir: &Path, label: &str, extension: &str) -> Result<Vec<Candidate>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let name = SnapshotName::parse(stem);
        if name.label != label {
            continue;
        }
        let recency = match name.timestamp {
            Some(ts) => ts.and_utc(),
            None => entry
                .metadata()?
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| DateTime::<Utc>::from(SystemTime::UNIX_EPOCH)),
        };
        found.push(Candidate {
            name,
            recency,
            file_name: entry.file_name().to_string_lossy().to_string(),
        });
    }

    found.sort_by(|a, b| {
        a.recency
            .cmp(&b.recency)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
    Ok(found)
}

/// Latest snapshot name for `label` among files with `extension`.
pub fn resolve_latest(
    dir: &Path,
    label: &str,
    extension: &str,
) -> Result<Option<SnapshotName>, StoreError> {
    Ok(candidates(dir, label, extension)?.pop().map(|c| c.name))
}

/// Resolve the latest complete snapshot for `label`.
pub fn resolve_pair(dir: &Path, label: &str) -> Result<SnapshotPaths, StoreError> {
    let table = resolve_latest(dir, label, TABLE_EXTENSION)?;
    let vectors = resolve_latest(dir, label, VECTOR_EXTENSION)?;

    match (table, vectors) {
        (None, None) => Err(StoreError::SnapshotNotFound(format!(
            "{} in {}",
            label,
            dir.display()
        ))),
        (Some(t), None) => Err(StoreError::StoreCorrupt(format!(
            "snapshot {} has a table file but no vector file",
            t.base()
        ))),
        (None, Some(v)) => Err(StoreError::StoreCorrupt(format!(
            "snapshot {} has a vector file but no table file",
            v.base()
        ))),
        (Some(t), Some(v)) if t.base() != v.base() => Err(StoreError::StoreCorrupt(format!(
            "latest table snapshot {} and latest vector snapshot {} differ",
            t.base(),
            v.base()
        ))),
        (Some(t), Some(_)) => Ok(SnapshotPaths::new(dir, t)),
    }
}

/// Complete snapshots for `label`, oldest first.
pub fn list_snapshots(dir: &Path, label: &str) -> Result<Vec<SnapshotName>, StoreError> {
    let vectors: Vec<String> = candidates(dir, label, VECTOR_EXTENSION)?
        .into_iter()
        .map(|c| c.name.base())
        .collect();
    Ok(candidates(dir, label, TABLE_EXTENSION)?
        .into_iter()
        .map(|c| c.name)
        .filter(|name| vectors.contains(&name.base()))
        .collect())
}

/// Write the table as CSV, one column per schema field in schema order.
pub fn write_table<W: std::io::Write>(writer: W, table: &ContentTable) -> Result<(), StoreError> {
    let schema = table.schema();
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(schema.field_names())?;

    for record in table.iter() {
        let row: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| record.get(&f.name).map(FieldValue::render).unwrap_or_default())
            .collect();
        csv.write_record(&row)?;
    }
    csv.flush()?;
    Ok(())
}

/// Read a CSV table written by [`write_table`] under `schema`.
///
/// The header must name exactly the schema's fields (in any order).
pub fn read_table<R: std::io::Read>(reader: R, schema: &Schema) -> Result<ContentTable, StoreError> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers: Vec<String> = csv.headers()?.iter().map(str::to_string).collect();

    let mut missing: Vec<String> = schema
        .field_names()
        .into_iter()
        .filter(|name| !headers.iter().any(|h| h == name))
        .map(str::to_string)
        .collect();
    let mut unexpected: Vec<String> = headers
        .iter()
        .filter(|h| schema.field(h).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() || !unexpected.is_empty() {
        missing.sort();
        unexpected.sort();
        return Err(StoreError::SchemaMismatch {
            missing,
            unexpected,
        });
    }

    let mut table = ContentTable::new(schema.clone());
    for (row_number, row) in csv.records().enumerate() {
        let row = row?;
        let mut record = Record::new();
        for (column, cell) in headers.iter().zip(row.iter()) {
            // Header check above guarantees the field exists.
            let Some(spec) = schema.field(column) else {
                continue;
            };
            let value = FieldValue::parse(spec.field_type, cell).map_err(|reason| {
                StoreError::InvalidValue {
                    field: column.clone(),
                    reason: format!("row {}: {}", row_number, reason),
                }
            })?;
            record.insert(column.clone(), value);
        }
        table.append(record)?;
    }
    Ok(table)
}

/// Write both halves of a snapshot.
///
/// Refuses to write a pair whose halves already disagree in length.
pub fn save_snapshot(
    dir: &Path,
    name: SnapshotName,
    table: &ContentTable,
    index: &VectorIndex,
) -> Result<SnapshotPaths, StoreError> {
    if table.len() != index.len() {
        return Err(StoreError::StoreCorrupt(format!(
            "refusing to save: {} table rows vs {} vectors",
            table.len(),
            index.len()
        )));
    }

    fs::create_dir_all(dir)?;
    let paths = SnapshotPaths::new(dir, name);

    write_table(BufWriter::new(File::create(&paths.table)?), table)?;
    npy::write_index(BufWriter::new(File::create(&paths.vectors)?), index)?;

    info!(
        base = %paths.name.base(),
        rows = table.len(),
        dir = ?dir,
        "Saved snapshot"
    );
    Ok(paths)
}

/// Read both halves of a snapshot.
///
/// Row count mismatch between the two files is `StoreCorrupt`; per-row
/// hash alignment is checked by the caller.
pub fn load_snapshot(
    paths: &SnapshotPaths,
    schema: &Schema,
) -> Result<(ContentTable, VectorIndex), StoreError> {
    if !paths.table.exists() || !paths.vectors.exists() {
        return Err(StoreError::StoreCorrupt(format!(
            "snapshot {} is missing one of its files",
            paths.name.base()
        )));
    }

    let table = read_table(BufReader::new(File::open(&paths.table)?), schema)?;
    let index = npy::read_index(BufReader::new(File::open(&paths.vectors)?))?;

    if table.len() != index.len() {
        return Err(StoreError::StoreCorrupt(format!(
            "snapshot {} has {} table rows but {} vectors",
            paths.name.base(),
            table.len(),
            index.len()
        )));
    }

    debug!(base = %paths.name.base(), rows = table.len(), "Loaded snapshot files");
    Ok((table, index))
}
