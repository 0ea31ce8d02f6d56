//! Policy and snapshot location discovery
//!
//! Two policy candidates are searched in a fixed order: the project-local file
//! first, then the global file in the operator's config directory. The trusted
//! snapshot always lives in the global config directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Environment variable that overrides the global config directory
pub const CONFIG_DIR_ENV: &str = "CMDGATE_CONFIG_DIR";

/// Directory holding the project-local policy, relative to the project root
pub const PROJECT_DIR_NAME: &str = ".cmdgate";

/// Policy file name, both project-local and global
pub const POLICY_FILE_NAME: &str = "policy.yml";

/// Snapshot file name inside the global config directory
pub const SNAPSHOT_FILE_NAME: &str = "integrity.json";

/// Resolved locations used by the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePaths {
    /// `<project>/.cmdgate/policy.yml`
    pub project_policy: PathBuf,
    /// `<config>/cmdgate/policy.yml`
    pub global_policy: PathBuf,
    /// `<config>/cmdgate/integrity.json`
    pub snapshot: PathBuf,
}

impl GatePaths {
    /// Build paths from an explicit project root and global cmdgate directory
    pub fn new(project_root: impl AsRef<Path>, global_dir: impl AsRef<Path>) -> Self {
        let project_root = project_root.as_ref();
        let global_dir = global_dir.as_ref();
        GatePaths {
            project_policy: project_root.join(PROJECT_DIR_NAME).join(POLICY_FILE_NAME),
            global_policy: global_dir.join(POLICY_FILE_NAME),
            snapshot: global_dir.join(SNAPSHOT_FILE_NAME),
        }
    }

    /// Discover paths for a project, honoring overrides
    ///
    /// Resolution order for the global directory:
    /// 1. `global_override` (CLI flag), used as the cmdgate directory itself
    /// 2. `CMDGATE_CONFIG_DIR`, used as the cmdgate directory itself
    /// 3. Platform config directory joined with `cmdgate`
    pub fn discover(project_root: &Path, global_override: Option<PathBuf>) -> Result<Self> {
        trace!("Discovering cmdgate paths");

        let project_root = absolute(project_root)?;

        let global_dir = match global_override {
            Some(dir) => {
                debug!("Using --config-dir override: {}", dir.display());
                absolute(&dir)?
            }
            None => match std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
                Some(dir) => {
                    debug!("Using {} override: {:?}", CONFIG_DIR_ENV, dir);
                    absolute(Path::new(&dir))?
                }
                None => absolute(&platform_config_dir()?.join("cmdgate"))?,
            },
        };

        let paths = Self::new(&project_root, &global_dir);
        debug!(
            project_policy = %paths.project_policy.display(),
            global_policy = %paths.global_policy.display(),
            snapshot = %paths.snapshot.display(),
            "Resolved cmdgate paths"
        );
        Ok(paths)
    }

    /// Policy candidates in priority order
    pub fn policy_candidates(&self) -> Vec<PathBuf> {
        vec![self.project_policy.clone(), self.global_policy.clone()]
    }
}

/// Make a path absolute without requiring it to exist
///
/// The deepest existing ancestor is canonicalized, so the result is the same
/// before and after the missing tail gets created.
fn absolute(path: &Path) -> Result<PathBuf> {
    let path = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve path: {}", path.display()))?;

    let mut existing = path.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(path),
        }
    }

    let mut resolved = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    resolved.extend(missing.iter().rev());
    Ok(resolved)
}

/// Get the platform-specific config directory
fn platform_config_dir() -> Result<PathBuf> {
    use directories::BaseDirs;

    // On Linux: ~/.config/
    // On macOS: ~/Library/Application Support/
    // On Windows: %APPDATA%\
    if let Some(base) = BaseDirs::new() {
        return Ok(base.config_dir().to_path_buf());
    }

    #[cfg(unix)]
    {
        if let Ok(home) = std::env::var("HOME") {
            return Ok(PathBuf::from(home).join(".config"));
        }
    }

    Err(anyhow::anyhow!(
        "Could not determine platform config directory (set {CONFIG_DIR_ENV})"
    ))
}
