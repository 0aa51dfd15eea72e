//! Configuration loading for the RAG content store.
//!
//! Layered config: defaults -> user config file -> explicit config file -> env vars.
//! The user config file lives at ~/.config/rag-store/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Snapshot retention policy.
///
/// After every save, only the newest `max_files` files of each extension in
/// the snapshot directory survive; older ones are deleted oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Run retention cleanup after saves.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Files kept per extension.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Extensions (without the dot) subject to cleanup.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_files() -> usize {
    4
}

fn default_extensions() -> Vec<String> {
    vec!["csv".to_string(), "npy".to_string()]
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_files: default_max_files(),
            extensions: default_extensions(),
        }
    }
}

impl RetentionConfig {
    /// Retention that never deletes anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Builder-style override of `max_files`.
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }
}

/// Store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Directory holding snapshot files
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Logical store name; also the snapshot file prefix
    #[serde(default = "default_store_name")]
    pub store_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Schema fragments (TOML) unioned with the base schema
    #[serde(default)]
    pub schema_files: Vec<String>,

    /// Number of leading normalized components fed to the content hash
    #[serde(default = "default_hash_prefix_len")]
    pub hash_prefix_len: usize,

    /// Hex characters kept from the SHA-256 digest
    #[serde(default = "default_hash_len")]
    pub hash_len: usize,

    /// Floor for the cosine prefilter candidate count
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,

    /// Candidate count grows as dimension / candidate_divisor
    #[serde(default = "default_candidate_divisor")]
    pub candidate_divisor: usize,

    /// Result count used when callers do not pass one
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Snapshot retention
    #[serde(default)]
    pub retention: RetentionConfig,
}

fn default_data_dir() -> String {
    ProjectDirs::from("", "", "rag-store")
        .map(|p| p.data_local_dir().join("snapshots"))
        .unwrap_or_else(|| PathBuf::from("./snapshots"))
        .to_string_lossy()
        .to_string()
}

fn default_store_name() -> String {
    "default".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_hash_prefix_len() -> usize {
    30
}

fn default_hash_len() -> usize {
    16
}

fn default_min_candidates() -> usize {
    20
}

fn default_candidate_divisor() -> usize {
    100
}

fn default_top_k() -> usize {
    5
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store_name: default_store_name(),
            log_level: default_log_level(),
            schema_files: Vec::new(),
            hash_prefix_len: default_hash_prefix_len(),
            hash_len: default_hash_len(),
            min_candidates: default_min_candidates(),
            candidate_divisor: default_candidate_divisor(),
            default_top_k: default_top_k(),
            retention: RetentionConfig::default(),
        }
    }
}

impl StoreSettings {
    /// Settings rooted at an explicit snapshot directory, defaults elsewhere.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into().to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/rag-store/config.toml)
    /// 3. Explicit config file (optional, required when given)
    /// 4. Environment variables (RAG_*, `__` for nesting)
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "rag-store")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("data_dir", default_data_dir())?
            .set_default("store_name", default_store_name())?
            .set_default("log_level", default_log_level())?
            .set_default("schema_files", Vec::<String>::new())?
            .set_default("hash_prefix_len", default_hash_prefix_len() as i64)?
            .set_default("hash_len", default_hash_len() as i64)?
            .set_default("min_candidates", default_min_candidates() as i64)?
            .set_default("candidate_divisor", default_candidate_divisor() as i64)?
            .set_default("default_top_k", default_top_k() as i64)?
            .set_default("retention.enabled", true)?
            .set_default("retention.max_files", default_max_files() as i64)?
            .set_default("retention.extensions", default_extensions())?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // RAG_STORE_NAME, RAG_RETENTION__MAX_FILES, RAG_SCHEMA_FILES=a.toml,b.toml
        builder = builder.add_source(
            Environment::with_prefix("RAG")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("schema_files")
                .with_list_parse_key("retention.extensions")
                .try_parsing(true),
        );

        let settings: StoreSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hash_prefix_len == 0 {
            return Err(ConfigError::Invalid {
                field: "hash_prefix_len",
                reason: "must be > 0".to_string(),
            });
        }
        if !(1..=64).contains(&self.hash_len) {
            return Err(ConfigError::Invalid {
                field: "hash_len",
                reason: format!("must be 1-64, got {}", self.hash_len),
            });
        }
        if self.min_candidates == 0 {
            return Err(ConfigError::Invalid {
                field: "min_candidates",
                reason: "must be > 0".to_string(),
            });
        }
        if self.candidate_divisor == 0 {
            return Err(ConfigError::Invalid {
                field: "candidate_divisor",
                reason: "must be > 0".to_string(),
            });
        }
        if self.retention.enabled && self.retention.max_files == 0 {
            return Err(ConfigError::Invalid {
                field: "retention.max_files",
                reason: "must be > 0 when retention is enabled".to_string(),
            });
        }
        if self.retention.enabled && self.retention.extensions.is_empty() {
            return Err(ConfigError::Invalid {
                field: "retention.extensions",
                reason: "must list at least one extension when retention is enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Snapshot directory with a leading `~/` expanded.
    pub fn expanded_data_dir(&self) -> PathBuf {
        if let Some(rest) = self.data_dir.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.data_dir)
    }
}
