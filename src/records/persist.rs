//! One JSON file per author.
//!
//! `<dir>/<author_id>.json` holds the author attributes and the embedded
//! article list. Files are always rewritten whole: a patch loads the record,
//! transforms it, and writes it back through a temporary file followed by a
//! rename, so readers never observe a half-written record.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::records::{AuthorId, AuthorRecord, EntityKind, RecordFailure};

const RECORD_EXTENSION: &str = "json";

/// Records read from a directory, plus the files that could not be read.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub records: Vec<AuthorRecord>,
    pub failures: Vec<RecordFailure>,
}

/// Directory-backed author record store
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the given author.
    #[must_use]
    pub fn path_for(&self, id: &AuthorId) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    fn record_files(&self) -> StoreResult<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Err(StoreError::Persistence {
                path: self.dir.clone(),
                reason: "record directory does not exist".to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| StoreError::Persistence {
                path: self.dir.clone(),
                reason: e.to_string(),
            })?;
            let path = entry.path();
            if entry.file_type().is_file()
                && path.extension().is_some_and(|ext| ext == RECORD_EXTENSION)
            {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Identities of every stored author, sorted.
    pub fn list_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .record_files()?
            .iter()
            .filter_map(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .collect())
    }

    /// Reads every record file. Unreadable or malformed files are reported
    /// as failures and do not stop the scan.
    pub fn load_all(&self) -> StoreResult<LoadReport> {
        let mut report = LoadReport::default();
        for path in self.record_files()? {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            match read_record(&path) {
                Ok(record) => report.records.push(record),
                Err(error) => {
                    tracing::warn!("Skipping {}: {error}", path.display());
                    report
                        .failures
                        .push(RecordFailure::new(EntityKind::Author, stem, error));
                }
            }
        }
        tracing::debug!(
            "Loaded {} author records from {} ({} failed)",
            report.records.len(),
            self.dir.display(),
            report.failures.len()
        );
        Ok(report)
    }

    pub fn load(&self, id: &AuthorId) -> StoreResult<AuthorRecord> {
        read_record(&self.path_for(id))
    }

    /// Serializes the whole record and replaces the file atomically.
    pub fn save(&self, record: &AuthorRecord) -> StoreResult<PathBuf> {
        let id = AuthorId::new(record.id.clone())?;
        let path = self.path_for(&id);
        let persistence = |reason: String| StoreError::Persistence {
            path: path.clone(),
            reason,
        };

        std::fs::create_dir_all(&self.dir).map_err(|e| persistence(e.to_string()))?;
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| persistence(format!("Failed to serialize record: {e}")))?;

        let tmp = self.dir.join(format!(".{id}.{RECORD_EXTENSION}.tmp"));
        std::fs::write(&tmp, json).map_err(|e| persistence(e.to_string()))?;
        std::fs::rename(&tmp, &path).map_err(|e| persistence(e.to_string()))?;

        Ok(path)
    }

    /// Loads a record, applies `patch`, and writes the result back whole.
    pub fn patch<F>(&self, id: &AuthorId, patch: F) -> StoreResult<AuthorRecord>
    where
        F: FnOnce(AuthorRecord) -> StoreResult<AuthorRecord>,
    {
        let patched = patch(self.load(id)?)?;
        if patched.id != id.as_str() {
            return Err(StoreError::InvalidRecord {
                id: patched.id,
                reason: format!("patch changed the author identity from '{id}'"),
            });
        }
        self.save(&patched)?;
        Ok(patched)
    }
}

fn read_record(path: &Path) -> StoreResult<AuthorRecord> {
    let json = std::fs::read_to_string(path).map_err(|e| StoreError::Persistence {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&json).map_err(|e| StoreError::InvalidRecord {
        id: path.display().to_string(),
        reason: e.to_string(),
    })
}
