use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::model::node::PositionRow;

/// Error type for metadata storage
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("could not read {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },
    #[error("could not write {path}: {source}")]
    WriteError { path: PathBuf, source: io::Error },
    #[error("malformed metadata file {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("could not encode metadata: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("metadata store lock poisoned")]
    Poisoned,
}

/// Where a filter's serialized tree lives between sessions
pub trait FilterMetadataStore {
    fn get(&self, filter: &str) -> Result<Option<String>, StoreError>;

    fn put(&self, filter: &str, tree: &str) -> Result<(), StoreError>;

    /// Persist the tree together with its flattened position table. Stores
    /// that keep only the text can rely on the default.
    fn put_record(
        &self,
        filter: &str,
        tree: &str,
        _positions: &[PositionRow],
    ) -> Result<(), StoreError> {
        self.put(filter, tree)
    }
}

impl<T: FilterMetadataStore + ?Sized> FilterMetadataStore for Arc<T> {
    fn get(&self, filter: &str) -> Result<Option<String>, StoreError> {
        (**self).get(filter)
    }

    fn put(&self, filter: &str, tree: &str) -> Result<(), StoreError> {
        (**self).put(filter, tree)
    }

    fn put_record(
        &self,
        filter: &str,
        tree: &str,
        positions: &[PositionRow],
    ) -> Result<(), StoreError> {
        (**self).put_record(filter, tree, positions)
    }
}

/// Everything persisted for one filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRecord {
    pub tree: String,
    #[serde(default)]
    pub positions: Vec<PositionRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl FilterRecord {
    fn new(tree: &str, positions: &[PositionRow]) -> Self {
        FilterRecord {
            tree: tree.to_string(),
            positions: positions.to_vec(),
            updated: Some(Utc::now()),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store, mostly for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, FilterRecord>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn record(&self, filter: &str) -> Option<FilterRecord> {
        self.records.lock().ok()?.get(filter).cloned()
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }
}

impl FilterMetadataStore for MemoryStore {
    fn get(&self, filter: &str) -> Result<Option<String>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(filter).map(|r| r.tree.clone()))
    }

    fn put(&self, filter: &str, tree: &str) -> Result<(), StoreError> {
        self.put_record(filter, tree, &[])
    }

    fn put_record(
        &self,
        filter: &str,
        tree: &str,
        positions: &[PositionRow],
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.insert(filter.to_string(), FilterRecord::new(tree, positions));
        *self.writes.lock().map_err(|_| StoreError::Poisoned)? += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON directory store
// ---------------------------------------------------------------------------

/// One JSON file per filter inside a directory.
///
/// Files are replaced atomically, so a reader sees either the old or the new
/// record. Cross-process writers should hold the filter's
/// [`FileLock`](crate::io::lock::FileLock).
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonDirStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `filter`
    pub fn record_path(&self, filter: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_filter_key(filter)))
    }

    /// Read the full record for a filter, if one was ever written
    pub fn record(&self, filter: &str) -> Result<Option<FilterRecord>, StoreError> {
        let path = self.record_path(filter);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::ReadError { path, source }),
        };
        let record = serde_json::from_str(&content)
            .map_err(|source| StoreError::Malformed { path, source })?;
        Ok(Some(record))
    }
}

impl FilterMetadataStore for JsonDirStore {
    fn get(&self, filter: &str) -> Result<Option<String>, StoreError> {
        Ok(self.record(filter)?.map(|r| r.tree))
    }

    fn put(&self, filter: &str, tree: &str) -> Result<(), StoreError> {
        self.put_record(filter, tree, &[])
    }

    fn put_record(
        &self,
        filter: &str,
        tree: &str,
        positions: &[PositionRow],
    ) -> Result<(), StoreError> {
        let path = self.record_path(filter);
        let content = serde_json::to_string_pretty(&FilterRecord::new(tree, positions))?;
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::WriteError {
            path: self.dir.clone(),
            source,
        })?;
        atomic_write(&path, content.as_bytes())
            .map_err(|source| StoreError::WriteError { path, source })
    }
}

/// Write `content` to `path` atomically using a temp file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Turn a filter key into a file name stem: ASCII letters, digits, `-` and
/// `_` pass through; every other byte becomes `%XX`.
pub fn encode_filter_key(filter: &str) -> String {
    let mut out = String::with_capacity(filter.len());
    for b in filter.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    if out.is_empty() {
        out.push('%');
    }
    out
}
