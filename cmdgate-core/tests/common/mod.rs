//! Shared fixtures for integration tests
//!
//! Each test gets its own project directory and global config directory, so
//! nothing touches the real `~/.config/cmdgate`.

#![allow(dead_code)]

use cmdgate_core::integrity::FileSnapshotStore;
use cmdgate_core::{AuthorizationGate, GateOptions, GatePaths, IntegrityStore};
use std::fs;
use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Isolated project + global config directories
pub struct TestEnv {
    pub project: TempDir,
    pub config: TempDir,
    pub paths: GatePaths,
}

impl TestEnv {
    pub fn new() -> Self {
        init_test_logging();
        let project = TempDir::new().expect("project dir");
        let config = TempDir::new().expect("config dir");
        let paths = GatePaths::new(project.path(), config.path().join("cmdgate"));
        TestEnv {
            project,
            config,
            paths,
        }
    }

    pub fn write_project_policy(&self, content: &str) {
        write_file(&self.paths.project_policy, content);
    }

    pub fn write_global_policy(&self, content: &str) {
        write_file(&self.paths.global_policy, content);
    }

    pub fn gate(&self) -> AuthorizationGate<FileSnapshotStore> {
        AuthorizationGate::from_paths(&self.paths, GateOptions::default())
    }

    pub fn integrity(&self) -> IntegrityStore<FileSnapshotStore> {
        IntegrityStore::new(
            self.paths.policy_candidates(),
            FileSnapshotStore::new(&self.paths.snapshot),
        )
    }

    pub fn path_key(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }
}

fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
    fs::write(path, content).expect("write policy");
}

/// Policy allowing `echo hello` only
pub const ECHO_HELLO: &str = r#"commands:
  echo:
    patterns:
      - "hello"
"#;

/// ECHO_HELLO widened to allow anything
pub const ECHO_ANYTHING: &str = r#"commands:
  echo:
    patterns:
      - "hello"
      - "*"
"#;
