//! Error types for the gate, with clear, actionable messages
//!
//! Configuration errors are fatal to an invocation. Integrity errors are also
//! fatal, but the gate converts them into a fail-closed denial instead of
//! surfacing them as crashes.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by policy loading and the integrity store
#[derive(Error, Debug)]
pub enum GateError {
    /// None of the candidate policy files exist
    #[error("No policy file found.\n\nSearched:\n{}\n\nCreate one of these files with a top-level `commands` mapping.", format_paths(.searched))]
    ConfigNotFound { searched: Vec<PathBuf> },

    /// The policy file is not valid YAML
    #[error("Failed to parse policy file {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    /// The policy file parsed but does not have the expected structure
    #[error("Invalid policy file {path}: {message}")]
    ConfigSchema { path: PathBuf, message: String },

    /// The policy file exists but could not be read
    #[error("Failed to read policy file {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tracked policy file could not be hashed
    #[error("Failed to read policy file for integrity verification: {path}")]
    IntegrityRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The trusted snapshot exists but could not be read
    #[error("Failed to read integrity snapshot from {path}")]
    SnapshotRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The trusted snapshot is not valid JSON or has the wrong shape
    #[error("Failed to parse integrity snapshot {path} (corrupted or invalid format).\n\nTo re-establish trust, run:\n  cmdgate approve")]
    SnapshotParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The snapshot contains the same path twice
    #[error("Integrity snapshot {path} lists {duplicate} more than once.\n\nTo re-establish trust, run:\n  cmdgate approve")]
    SnapshotDuplicate { path: PathBuf, duplicate: String },

    /// The trusted snapshot could not be written
    #[error("Failed to write integrity snapshot to {path}")]
    SnapshotWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

impl GateError {
    /// True for errors that mean the trust state cannot be established.
    ///
    /// The gate treats these as a tampered state and denies.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            GateError::IntegrityRead { .. }
                | GateError::SnapshotRead { .. }
                | GateError::SnapshotParse { .. }
                | GateError::SnapshotDuplicate { .. }
        )
    }

    /// True for policy-layer errors (missing, unparsable or malformed policy)
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            GateError::ConfigNotFound { .. }
                | GateError::ConfigParse { .. }
                | GateError::ConfigSchema { .. }
                | GateError::ConfigRead { .. }
        )
    }

    /// Message including every `source` in the chain, on one line
    pub fn display_chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }

    /// Log security-critical errors to the `security` target
    pub fn log_if_security_critical(&self) {
        if self.is_integrity_failure() {
            tracing::error!(target: "security", "INTEGRITY FAILURE: {}", self);
        }
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
