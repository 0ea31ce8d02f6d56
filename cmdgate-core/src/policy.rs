//! Policy file loading
//!
//! The policy is a plain allowlist: command name -> ordered argument patterns.
//!
//! ```yaml
//! commands:
//!   git:
//!     patterns:
//!       - "status"
//!       - "log *"
//!   ls:
//!     patterns:
//!       - ""
//! ```
//!
//! The first existing candidate file wins. Files are never merged.

use crate::error::{GateError, Result};
use serde::Serialize;
use serde_yaml_ng::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Allowed argument patterns for one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct CommandRule {
    /// Patterns in declaration order. An empty string allows the bare command.
    pub patterns: Vec<String>,
}

/// The full command allowlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Policy {
    /// Command name -> rule
    pub commands: BTreeMap<String, CommandRule>,

    /// File this policy was loaded from
    #[serde(skip)]
    pub source: PathBuf,
}

impl Policy {
    /// Parse and validate policy YAML. `origin` is used in error messages.
    pub fn from_yaml_str(content: &str, origin: impl AsRef<Path>) -> Result<Self> {
        let origin = origin.as_ref();

        let document: Value =
            serde_yaml_ng::from_str(content).map_err(|source| GateError::ConfigParse {
                path: origin.to_path_buf(),
                source,
            })?;

        let schema_error = |message: String| GateError::ConfigSchema {
            path: origin.to_path_buf(),
            message,
        };

        let root = document
            .as_mapping()
            .ok_or_else(|| schema_error("expected a mapping with a `commands` key".into()))?;
        let commands = root
            .get("commands")
            .ok_or_else(|| schema_error("missing `commands` mapping".into()))?
            .as_mapping()
            .ok_or_else(|| schema_error("`commands` must be a mapping".into()))?;

        let mut policy = Policy {
            commands: BTreeMap::new(),
            source: origin.to_path_buf(),
        };

        for (name, rule) in commands {
            let name = name
                .as_str()
                .ok_or_else(|| schema_error(format!("command name {name:?} is not a string")))?;
            let rule = parse_rule(name, rule).map_err(schema_error)?;
            policy.commands.insert(name.to_string(), rule);
        }

        Ok(policy)
    }

    /// Rule for a command, if configured
    pub fn command(&self, name: &str) -> Option<&CommandRule> {
        self.commands.get(name)
    }
}

fn parse_rule(name: &str, rule: &Value) -> std::result::Result<CommandRule, String> {
    let rule: &Mapping = rule
        .as_mapping()
        .ok_or_else(|| format!("command `{name}` must be a mapping with a `patterns` list"))?;
    let patterns = rule
        .get("patterns")
        .ok_or_else(|| format!("command `{name}` is missing `patterns`"))?
        .as_sequence()
        .ok_or_else(|| format!("`patterns` for command `{name}` must be a list"))?;

    let patterns = patterns
        .iter()
        .enumerate()
        .map(|(idx, pattern)| {
            pattern.as_str().map(str::to_string).ok_or_else(|| {
                format!(
                    "pattern #{} for command `{name}` is not a string (quote it in YAML)",
                    idx + 1
                )
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(CommandRule { patterns })
}

/// Loads the policy from the first existing candidate file
#[derive(Debug, Clone)]
pub struct PolicyLoader {
    candidates: Vec<PathBuf>,
}

impl PolicyLoader {
    /// Create a loader over candidates in priority order
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        PolicyLoader { candidates }
    }

    /// Candidate paths in priority order
    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// First candidate that exists on disk
    pub fn locate(&self) -> Option<&Path> {
        self.candidates
            .iter()
            .map(PathBuf::as_path)
            .find(|path| path.is_file())
    }

    /// Load and validate the policy
    pub fn load(&self) -> Result<Policy> {
        let path = self.locate().ok_or_else(|| GateError::ConfigNotFound {
            searched: self.candidates.clone(),
        })?;
        Self::load_from(path)
    }

    /// Load a specific policy file
    pub fn load_from(path: &Path) -> Result<Policy> {
        debug!("Loading policy from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|source| GateError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let policy = Policy::from_yaml_str(&content, path)?;
        debug!("Loaded {} command rules", policy.commands.len());
        Ok(policy)
    }
}
