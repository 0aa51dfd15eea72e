//! Content schema and typed records.
//!
//! A schema is the ordered union of a base fragment (`hash`, `content`,
//! `name`) and any number of caller fragments loaded from TOML:
//!
//! ```toml
//! [[fields]]
//! name = "source"
//! type = "category"
//! default = "user"
//! ```
//!
//! Every record's key set must equal the schema's field set exactly.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Field holding the content hash; the table's lookup key.
pub const HASH_FIELD: &str = "hash";
/// Field holding the embedded text.
pub const CONTENT_FIELD: &str = "content";
/// Field holding the owning store's name.
pub const NAME_FIELD: &str = "name";

/// Declared semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[serde(alias = "str", alias = "string")]
    Text,
    #[serde(alias = "int")]
    Integer,
    Float,
    #[serde(alias = "bool")]
    Boolean,
    Category,
    #[serde(alias = "datetime")]
    Timestamp,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Category => "category",
            FieldType::Timestamp => "timestamp",
        }
    }

    /// Zero value used when a field has no declared default.
    pub fn empty_value(&self) -> FieldValue {
        match self {
            FieldType::Text => FieldValue::Text(String::new()),
            FieldType::Integer => FieldValue::Integer(0),
            FieldType::Float => FieldValue::Float(0.0),
            FieldType::Boolean => FieldValue::Boolean(false),
            FieldType::Category => FieldValue::Category(String::new()),
            FieldType::Timestamp => FieldValue::Timestamp(DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}

/// Typed field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Category(String),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Text(_) => FieldType::Text,
            FieldValue::Integer(_) => FieldType::Integer,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::Category(_) => FieldType::Category,
            FieldValue::Timestamp(_) => FieldType::Timestamp,
        }
    }

    /// Text view for text and category values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Category(s) => Some(s),
            _ => None,
        }
    }

    /// Parse the textual form written to the tabular file.
    pub fn parse(field_type: FieldType, raw: &str) -> Result<Self, String> {
        match field_type {
            FieldType::Text => Ok(FieldValue::Text(raw.to_string())),
            FieldType::Category => Ok(FieldValue::Category(raw.to_string())),
            FieldType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|e| format!("not an integer ({}): {:?}", e, raw)),
            FieldType::Float => raw
                .trim()
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|e| format!("not a float ({}): {:?}", e, raw)),
            FieldType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(FieldValue::Boolean(true)),
                "false" | "0" => Ok(FieldValue::Boolean(false)),
                _ => Err(format!("not a boolean: {:?}", raw)),
            },
            FieldType::Timestamp => DateTime::parse_from_rfc3339(raw.trim())
                .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|e| format!("not an RFC 3339 timestamp ({}): {:?}", e, raw)),
        }
    }

    /// Textual form for the tabular file; inverse of [`FieldValue::parse`].
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) | FieldValue::Category(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Timestamp(ts) => ts.to_rfc3339(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

/// One record: field name -> typed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field (builder pattern).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Text view of a text or category field.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The record's content hash, when assigned.
    pub fn hash(&self) -> Option<&str> {
        self.get_str(HASH_FIELD)
    }

    /// The embedded text.
    pub fn content(&self) -> Option<&str> {
        self.get_str(CONTENT_FIELD)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    /// Default in textual form, parsed with the field's type
    pub default: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn default_value(&self) -> Result<Option<FieldValue>, StoreError> {
        self.default
            .as_deref()
            .map(|raw| {
                FieldValue::parse(self.field_type, raw).map_err(|reason| {
                    StoreError::InvalidValue {
                        field: self.name.clone(),
                        reason: format!("bad default: {}", reason),
                    }
                })
            })
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
struct RawFragment {
    #[serde(default)]
    fields: Vec<RawFieldSpec>,
}

#[derive(Debug, Deserialize)]
struct RawFieldSpec {
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default)]
    default: Option<toml::Value>,
}

/// A declarative list of fields, loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaFragment {
    pub fields: Vec<FieldSpec>,
}

impl SchemaFragment {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, StoreError> {
        let raw: RawFragment =
            toml::from_str(source).map_err(|e| StoreError::Schema(e.to_string()))?;
        let fields = raw
            .fields
            .into_iter()
            .map(|f| FieldSpec {
                name: f.name,
                field_type: f.field_type,
                default: f.default.map(|v| match v {
                    toml::Value::String(s) => s,
                    other => other.to_string(),
                }),
            })
            .collect();
        Ok(Self { fields })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
            .map_err(|e| StoreError::Schema(format!("{}: {}", path.display(), e)))
    }
}

/// The active schema: ordered field declarations plus the lookup key.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    key_field: Option<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::base()
    }
}

impl Schema {
    /// Schema with no fields and no key; records get sequential keys.
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            key_field: None,
        }
    }

    /// `hash` (key), `content` and `name`.
    pub fn base() -> Self {
        Self {
            fields: vec![
                FieldSpec::new(HASH_FIELD, FieldType::Text),
                FieldSpec::new(CONTENT_FIELD, FieldType::Text),
                FieldSpec::new(NAME_FIELD, FieldType::Category),
            ],
            key_field: Some(HASH_FIELD.to_string()),
        }
    }

    /// Base schema unioned with fragments read from `paths`.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, StoreError> {
        let mut schema = Self::base();
        for path in paths {
            schema.extend(SchemaFragment::from_file(path)?)?;
        }
        Ok(schema)
    }

    /// Union a fragment into the schema.
    ///
    /// Re-declaring a field with the same type is a no-op; with a different
    /// type it is an error.
    pub fn extend(&mut self, fragment: SchemaFragment) -> Result<(), StoreError> {
        for spec in fragment.fields {
            spec.default_value()?;
            match self.fields.iter().find(|f| f.name == spec.name) {
                Some(existing) if existing.field_type != spec.field_type => {
                    return Err(StoreError::Schema(format!(
                        "field `{}` declared as both {} and {}",
                        spec.name,
                        existing.field_type.as_str(),
                        spec.field_type.as_str()
                    )));
                }
                Some(_) => {}
                None => self.fields.push(spec),
            }
        }
        Ok(())
    }

    /// Builder form of [`Schema::extend`].
    pub fn with_fragment(mut self, fragment: SchemaFragment) -> Result<Self, StoreError> {
        self.extend(fragment)?;
        Ok(self)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in declaration order (the tabular column order).
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn key_field(&self) -> Option<&str> {
        self.key_field.as_deref()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check a record's key set and value types against the schema.
    pub fn validate(&self, record: &Record) -> Result<(), StoreError> {
        let mut missing: Vec<String> = self
            .fields
            .iter()
            .filter(|f| !record.contains(&f.name))
            .map(|f| f.name.clone())
            .collect();
        let mut unexpected: Vec<String> = record
            .keys()
            .filter(|k| self.field(k).is_none())
            .map(str::to_string)
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            missing.sort();
            unexpected.sort();
            return Err(StoreError::SchemaMismatch {
                missing,
                unexpected,
            });
        }

        for spec in &self.fields {
            if let Some(value) = record.get(&spec.name) {
                if value.field_type() != spec.field_type {
                    return Err(StoreError::InvalidValue {
                        field: spec.name.clone(),
                        reason: format!(
                            "expected {}, got {}",
                            spec.field_type.as_str(),
                            value.field_type().as_str()
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Fill fields that have a declared default and were not supplied.
    pub fn apply_defaults(&self, record: &mut Record) -> Result<(), StoreError> {
        for spec in &self.fields {
            if record.contains(&spec.name) {
                continue;
            }
            if let Some(value) = spec.default_value()? {
                record.insert(spec.name.clone(), value);
            }
        }
        Ok(())
    }

    /// Coerce loosely typed caller values onto declared types.
    ///
    /// Text becomes Category, Integer becomes Float, and text in a typed
    /// column is parsed. Anything else is left for [`Schema::validate`].
    pub fn conform(&self, record: &mut Record) -> Result<(), StoreError> {
        for spec in &self.fields {
            let Some(value) = record.fields.get_mut(&spec.name) else {
                continue;
            };
            let coerced = match (spec.field_type, &*value) {
                (FieldType::Category, FieldValue::Text(s)) => Some(FieldValue::Category(s.clone())),
                (FieldType::Text, FieldValue::Category(s)) => Some(FieldValue::Text(s.clone())),
                (FieldType::Float, FieldValue::Integer(i)) => Some(FieldValue::Float(*i as f64)),
                (
                    FieldType::Integer
                    | FieldType::Float
                    | FieldType::Boolean
                    | FieldType::Timestamp,
                    FieldValue::Text(s),
                ) => Some(FieldValue::parse(spec.field_type, s).map_err(|reason| {
                    StoreError::InvalidValue {
                        field: spec.name.clone(),
                        reason,
                    }
                })?),
                _ => None,
            };
            if let Some(coerced) = coerced {
                *value = coerced;
            }
        }
        Ok(())
    }

    /// The store's self-describing zero-th record.
    ///
    /// Declared defaults (or the type's empty value) everywhere, with
    /// `content` and `name` set to the store name. `hash` is left empty
    /// for the store to assign.
    pub fn bootstrap_record(&self, store_name: &str) -> Result<Record, StoreError> {
        let mut record = Record::new();
        for spec in &self.fields {
            let value = match spec.default_value()? {
                Some(value) => value,
                None => spec.field_type.empty_value(),
            };
            record.insert(spec.name.clone(), value);
        }
        if self.field(CONTENT_FIELD).is_some() {
            record.insert(CONTENT_FIELD, FieldValue::Text(store_name.to_string()));
        }
        if self.field(NAME_FIELD).is_some() {
            record.insert(NAME_FIELD, FieldValue::Category(store_name.to_string()));
        }
        self.conform(&mut record)?;
        Ok(record)
    }
}
