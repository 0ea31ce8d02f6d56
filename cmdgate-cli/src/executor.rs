//! Runs an authorized command as a direct child process
//!
//! No shell is involved: the program is looked up on PATH and receives the
//! arguments exactly as given. stdin, stdout and stderr are inherited.

use anyhow::{Context, Result};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Exit code when the program could not be started
pub const EXIT_SPAWN_FAILED: u8 = 127;

/// Spawn `program` with `args` and wait for it
pub async fn run(program: &str, args: &[String]) -> Result<ExitStatus> {
    debug!("Spawning '{}' with {} argument(s)", program, args.len());

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("Failed to start '{program}'"))?;

    let status = child
        .wait()
        .await
        .with_context(|| format!("Failed to wait for '{program}'"))?;

    debug!("'{}' exited with {}", program, status);
    Ok(status)
}

/// Exit code to forward for a finished child
///
/// On Unix a child killed by a signal maps to 128 + signal number, like a shell.
pub fn exit_code(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return u8::try_from(code).unwrap_or(1);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return u8::try_from(128 + signal).unwrap_or(u8::MAX);
        }
    }

    1
}
