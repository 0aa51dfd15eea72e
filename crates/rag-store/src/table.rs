//! Content table.
//!
//! Records live in an append-only vector so that position `i` always lines
//! up with vector index entry `i`. A separate key -> position map serves
//! lookups; the two roles are never folded into one structure.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::error::StoreError;
use crate::schema::{FieldType, FieldValue, Record, Schema};

/// Ordered, schema-validated record collection.
#[derive(Debug, Clone)]
pub struct ContentTable {
    schema: Schema,
    rows: Vec<Record>,
    keys: Vec<String>,
    positions: HashMap<String, usize>,
    categories: HashMap<String, BTreeSet<String>>,
    next_seq: u64,
}

impl ContentTable {
    pub fn new(schema: Schema) -> Self {
        let categories = schema
            .fields()
            .iter()
            .filter(|f| f.field_type == FieldType::Category)
            .map(|f| (f.name.clone(), BTreeSet::new()))
            .collect();

        Self {
            schema,
            rows: Vec::new(),
            keys: Vec::new(),
            positions: HashMap::new(),
            categories,
            next_seq: 0,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Key a record would be stored under, without inserting it.
    fn key_for(&self, record: &Record) -> String {
        self.schema
            .key_field()
            .and_then(|field| record.get(field))
            .map(FieldValue::render)
            .unwrap_or_else(|| self.next_seq.to_string())
    }

    /// Validate and insert a record, returning its key.
    ///
    /// Novel category values extend the column's category set; they are
    /// never rejected. A key that is already present is refused so the
    /// key -> position map stays one-to-one.
    pub fn append(&mut self, record: Record) -> Result<String, StoreError> {
        self.schema.validate(&record)?;

        let key = self.key_for(&record);
        if self.positions.contains_key(&key) {
            return Err(StoreError::InvalidValue {
                field: self
                    .schema
                    .key_field()
                    .unwrap_or("<sequence>")
                    .to_string(),
                reason: format!("duplicate key {}", key),
            });
        }

        for (column, known) in self.categories.iter_mut() {
            if let Some(FieldValue::Category(value)) = record.get(column) {
                if known.insert(value.clone()) {
                    debug!(column = %column, value = %value, "Extended category set");
                }
            }
        }

        let position = self.rows.len();
        self.rows.push(record);
        self.keys.push(key.clone());
        self.positions.insert(key.clone(), position);
        self.next_seq += 1;
        Ok(key)
    }

    pub fn lookup(&self, key: &str) -> Option<&Record> {
        self.positions.get(key).map(|&pos| &self.rows[pos])
    }

    /// Position of the record stored under `key`.
    pub fn position_of(&self, key: &str) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    /// Record at insertion position `position`.
    pub fn row_at(&self, position: usize) -> Option<&Record> {
        self.rows.get(position)
    }

    /// Key of the record at insertion position `position`.
    pub fn key_at(&self, position: usize) -> Option<&str> {
        self.keys.get(position).map(String::as_str)
    }

    /// Known values of a category column.
    pub fn categories(&self, column: &str) -> Option<&BTreeSet<String>> {
        self.categories.get(column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter()
    }
}
