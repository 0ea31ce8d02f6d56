//! Trusted snapshot of policy file hashes and where it is persisted
//!
//! The snapshot is the single source of trust. A missing snapshot is a
//! distinct state (never initialized) and is represented as `None`, not as an
//! empty record list.

use crate::error::{GateError, Result};
use crate::integrity::hasher::hash_file;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Trusted hash of one policy file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityRecord {
    /// Absolute path of the policy file
    pub path: String,
    /// SHA-256 of the file contents, 64 lowercase hex characters
    pub hash: String,
    /// File modification time when it was hashed
    pub last_modified: DateTime<Utc>,
}

impl IntegrityRecord {
    /// Hash a file on disk into a record
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let hash = hash_file(path)?;
        let last_modified = std::fs::metadata(path)?
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(IntegrityRecord {
            path: path.to_string_lossy().into_owned(),
            hash,
            last_modified,
        })
    }
}

/// The full set of trusted records
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegritySnapshot {
    pub records: Vec<IntegrityRecord>,
}

impl IntegritySnapshot {
    pub fn new(records: Vec<IntegrityRecord>) -> Self {
        IntegritySnapshot { records }
    }

    /// Record for a path, if tracked
    pub fn get(&self, path: &str) -> Option<&IntegrityRecord> {
        self.records.iter().find(|record| record.path == path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First path that appears more than once
    fn duplicate_path(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .map(|record| record.path.as_str())
            .find(|path| !seen.insert(*path))
    }
}

/// Read-all / write-all persistence for the trusted snapshot
pub trait SnapshotStore {
    /// Load the snapshot, or `None` if one has never been saved
    fn load(&self) -> Result<Option<IntegritySnapshot>>;

    /// Replace the snapshot as a single unit
    fn save(&self, snapshot: &IntegritySnapshot) -> Result<()>;

    /// Human-readable location for messages
    fn location(&self) -> String;
}

/// Snapshot stored as a JSON list at a fixed path
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSnapshotStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<IntegritySnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| {
            GateError::SnapshotRead {
                path: self.path.clone(),
                source,
            }
        })?;

        let snapshot: IntegritySnapshot =
            serde_json::from_str(&content).map_err(|source| GateError::SnapshotParse {
                path: self.path.clone(),
                source,
            })?;

        if let Some(duplicate) = snapshot.duplicate_path() {
            return Err(GateError::SnapshotDuplicate {
                path: self.path.clone(),
                duplicate: duplicate.to_string(),
            });
        }

        debug!(
            "Loaded integrity snapshot with {} records from {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &IntegritySnapshot) -> Result<()> {
        let write_error = |source: std::io::Error| GateError::SnapshotWrite {
            path: self.path.clone(),
            source,
        };

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(write_error)?;

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| write_error(std::io::Error::other(e)))?;

        // Write beside the target and rename over it so readers never see a partial file
        let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(write_error)?;
        staged.write_all(json.as_bytes()).map_err(write_error)?;
        staged.write_all(b"\n").map_err(write_error)?;
        staged.as_file().sync_all().map_err(write_error)?;
        staged
            .persist(&self.path)
            .map_err(|e| write_error(e.error))?;

        debug!(
            "Saved integrity snapshot with {} records to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process snapshot store for tests and embedding
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<IntegritySnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot
    pub fn with_snapshot(snapshot: IntegritySnapshot) -> Self {
        MemorySnapshotStore {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }

    /// Current contents without going through the trait
    pub fn current(&self) -> Option<IntegritySnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<IntegritySnapshot>> {
        Ok(self.current())
    }

    fn save(&self, snapshot: &IntegritySnapshot) -> Result<()> {
        *self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for &S {
    fn load(&self) -> Result<Option<IntegritySnapshot>> {
        (**self).load()
    }

    fn save(&self, snapshot: &IntegritySnapshot) -> Result<()> {
        (**self).save(snapshot)
    }

    fn location(&self) -> String {
        (**self).location()
    }
}
