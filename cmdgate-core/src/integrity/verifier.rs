//! Policy integrity verification against the trusted snapshot
//!
//! Every existing policy candidate is tracked, not only the one the loader
//! picks, so editing the global file while a project file shadows it is
//! still detected.

use crate::error::{GateError, Result};
use crate::integrity::hasher::short_hash;
use crate::integrity::snapshot::{IntegrityRecord, IntegritySnapshot, SnapshotStore};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of comparing policy files on disk with the trusted snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// True when nothing was added, changed or removed
    pub valid: bool,
    /// True when no snapshot has ever been saved
    pub is_first_run: bool,
    /// Tracked files whose content hash differs
    pub changed_files: BTreeSet<String>,
    /// Existing policy files the snapshot does not know about
    pub new_files: BTreeSet<String>,
    /// Tracked files that no longer exist
    pub deleted_files: BTreeSet<String>,
    /// One human-readable line per classified file
    pub errors: Vec<String>,
}

impl VerificationResult {
    fn first_run() -> Self {
        VerificationResult {
            valid: true,
            is_first_run: true,
            ..Default::default()
        }
    }
}

/// Trust lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustState {
    /// No snapshot has been saved yet
    Uninitialized,
    /// Files on disk match the snapshot
    Approved,
    /// Files were added, changed or removed since the last approval
    Tampered(VerificationResult),
}

/// Hashes policy files and checks them against the persisted snapshot
#[derive(Debug)]
pub struct IntegrityStore<S> {
    candidates: Vec<PathBuf>,
    store: S,
}

impl<S: SnapshotStore> IntegrityStore<S> {
    /// Track `candidates` (in search order) and persist trust through `store`
    pub fn new(candidates: Vec<PathBuf>, store: S) -> Self {
        IntegrityStore { candidates, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// All candidate policy files that currently exist, in search order
    pub fn discover_files(&self) -> Vec<PathBuf> {
        self.candidates
            .iter()
            .filter(|path| path.is_file())
            .cloned()
            .collect()
    }

    /// Hash every discovered policy file
    pub fn compute_records(&self) -> Result<Vec<IntegrityRecord>> {
        self.discover_files()
            .iter()
            .map(|path| {
                IntegrityRecord::from_file(path).map_err(|source| GateError::IntegrityRead {
                    path: path.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Load the persisted snapshot, `None` if never initialized
    pub fn load_snapshot(&self) -> Result<Option<IntegritySnapshot>> {
        self.store.load()
    }

    /// Persist `records` as the new trusted snapshot
    pub fn save_snapshot(&self, records: Vec<IntegrityRecord>) -> Result<IntegritySnapshot> {
        let snapshot = IntegritySnapshot::new(records);
        self.store.save(&snapshot)?;
        Ok(snapshot)
    }

    /// Rehash the files that exist right now and persist them as trusted
    pub fn update_and_persist(&self) -> Result<IntegritySnapshot> {
        let records = self.compute_records()?;
        let snapshot = self.save_snapshot(records)?;
        info!(
            "Trusted snapshot updated with {} policy files at {}",
            snapshot.len(),
            self.store.location()
        );
        Ok(snapshot)
    }

    /// Compare policy files on disk with the trusted snapshot
    ///
    /// A read failure on any discovered file is an error, never "unchanged".
    pub fn verify(&self) -> Result<VerificationResult> {
        let Some(snapshot) = self.store.load()? else {
            debug!("No integrity snapshot at {}", self.store.location());
            return Ok(VerificationResult::first_run());
        };

        let mut result = VerificationResult::default();

        for record in self.compute_records()? {
            match snapshot.get(&record.path) {
                None => {
                    result.errors.push(format!(
                        "New policy file not in trusted snapshot: {}",
                        record.path
                    ));
                    result.new_files.insert(record.path);
                }
                Some(trusted) if trusted.hash != record.hash => {
                    result.errors.push(format!(
                        "Policy file modified: {} (expected hash {}, current hash {})",
                        record.path,
                        short_hash(&trusted.hash),
                        short_hash(&record.hash)
                    ));
                    result.changed_files.insert(record.path);
                }
                Some(_) => {
                    debug!("Policy file unchanged: {}", record.path);
                }
            }
        }

        // Same test as discovery: a directory in place of a tracked file counts as deleted
        for trusted in &snapshot.records {
            if !Path::new(&trusted.path).is_file() {
                result.errors.push(format!(
                    "Trusted policy file was deleted or is no longer a regular file: {}",
                    trusted.path
                ));
                result.deleted_files.insert(trusted.path.clone());
            }
        }

        result.valid = result.changed_files.is_empty()
            && result.new_files.is_empty()
            && result.deleted_files.is_empty();

        if result.valid {
            debug!("All {} trusted policy files verified", snapshot.len());
        } else {
            warn!(
                target: "security",
                changed = result.changed_files.len(),
                new = result.new_files.len(),
                deleted = result.deleted_files.len(),
                "Policy files differ from trusted snapshot"
            );
        }

        Ok(result)
    }

    /// Current position in the trust lifecycle
    pub fn state(&self) -> Result<TrustState> {
        let result = self.verify()?;
        Ok(if result.is_first_run {
            TrustState::Uninitialized
        } else if result.valid {
            TrustState::Approved
        } else {
            TrustState::Tampered(result)
        })
    }
}
