//! Snapshot retention.
//!
//! After each save the snapshot directory is trimmed per extension: files
//! are ranked by creation time (modification time where the platform has
//! no creation time, file name on ties) and only the newest `max_files`
//! survive. Deletion failures are collected, never fatal.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rag_types::RetentionConfig;
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// Statistics from a retention pass.
#[derive(Debug, Clone, Default)]
pub struct RetentionStats {
    /// Files removed, oldest first per extension
    pub deleted: Vec<PathBuf>,
    /// Files left in place across all extensions
    pub kept: usize,
    pub errors: Vec<String>,
}

impl RetentionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_deleted(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

struct SnapshotFile {
    path: PathBuf,
    created: SystemTime,
    file_name: String,
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<SnapshotFile>, StoreError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let metadata = entry.metadata()?;
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push(SnapshotFile {
            path,
            created,
            file_name: entry.file_name().to_string_lossy().to_string(),
        });
    }
    Ok(files)
}

/// Keep the newest `config.max_files` files of each configured extension
/// in `dir` and delete the rest.
pub fn enforce_retention(dir: &Path, config: &RetentionConfig) -> Result<RetentionStats, StoreError> {
    let mut stats = RetentionStats::new();
    if !config.enabled || !dir.exists() {
        return Ok(stats);
    }

    for extension in &config.extensions {
        let mut files = files_with_extension(dir, extension)?;
        // Newest first
        files.sort_by(|a, b| {
            b.created
                .cmp(&a.created)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });

        let surplus = files.split_off(files.len().min(config.max_files));
        stats.kept += files.len();

        for file in surplus.into_iter().rev() {
            match fs::remove_file(&file.path) {
                Ok(()) => {
                    debug!(path = ?file.path, "Deleted old snapshot file");
                    stats.deleted.push(file.path);
                }
                Err(e) => {
                    warn!(path = ?file.path, error = %e, "Failed to delete snapshot file");
                    stats
                        .errors
                        .push(format!("{}: {}", file.path.display(), e));
                }
            }
        }
    }

    if !stats.is_empty() {
        info!(
            deleted = stats.total_deleted(),
            kept = stats.kept,
            errors = stats.errors.len(),
            "Retention pass complete"
        );
    }
    Ok(stats)
}
