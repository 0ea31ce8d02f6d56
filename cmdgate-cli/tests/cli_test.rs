//! Drives the compiled `cmdgate` binary against isolated project and config directories

use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const ECHO_HELLO: &str = "commands:\n  echo:\n    patterns:\n      - \"hello\"\n";
const ECHO_ANYTHING: &str =
    "commands:\n  echo:\n    patterns:\n      - \"hello\"\n      - \"*\"\n";

struct Sandbox {
    project: TempDir,
    config: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Sandbox {
            project: TempDir::new().unwrap(),
            config: TempDir::new().unwrap(),
        }
    }

    fn with_policy(content: &str) -> Self {
        let sandbox = Sandbox::new();
        sandbox.write_policy(content);
        sandbox
    }

    fn write_policy(&self, content: &str) {
        let dir = self.project.path().join(".cmdgate");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("policy.yml"), content).unwrap();
    }

    fn snapshot(&self) -> PathBuf {
        self.config.path().join("integrity.json")
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_cmdgate"));
        cmd.arg("--project-dir")
            .arg(self.project.path())
            .arg("--config-dir")
            .arg(self.config.path())
            .args(args)
            .env_remove("CMDGATE_SKIP_INTEGRITY")
            .env_remove("CMDGATE_CONFIG_DIR");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command(args)
            .stdin(Stdio::null())
            .output()
            .expect("failed to run cmdgate")
    }

    fn run_with_stdin(&self, args: &[&str], stdin: &str) -> Output {
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to spawn cmdgate");
        child
            .stdin
            .take()
            .unwrap()
            .write_all(stdin.as_bytes())
            .unwrap();
        child.wait_with_output().unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_check_first_run_trusts_and_authorizes() {
    let sandbox = Sandbox::with_policy(ECHO_HELLO);

    let output = sandbox.run(&["check", "echo", "hello"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(stdout(&output).contains("Authorized"));
    assert!(sandbox.snapshot().exists());
}

#[test]
fn test_check_denies_unmatched_arguments() {
    let sandbox = Sandbox::with_policy(ECHO_HELLO);

    let output = sandbox.run(&["check", "echo", "goodbye"]);
    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.contains("match no allowed pattern"));
    assert!(out.contains("- \"goodbye\""), "suggestion missing: {out}");
}

#[test]
fn test_check_json_verdict() {
    let sandbox = Sandbox::with_policy(ECHO_HELLO);

    let output = sandbox.run(&["check", "--json", "echo", "hello"]);
    assert_eq!(output.status.code(), Some(0));
    let verdict: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(verdict["verdict"], "authorized");
    assert_eq!(verdict["matched_pattern"], "hello");

    let output = sandbox.run(&["check", "--json", "curl", "example.com"]);
    assert_eq!(output.status.code(), Some(1));
    let verdict: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(verdict["verdict"], "denied");
    assert_eq!(verdict["reason"]["kind"], "not_configured");
    assert_eq!(verdict["reason"]["command"], "curl");
}

#[test]
fn test_missing_policy_is_a_config_error() {
    let sandbox = Sandbox::new();

    let output = sandbox.run(&["check", "echo", "hello"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("policy.yml"));
}

#[test]
fn test_tampered_policy_is_denied_until_approved() {
    let sandbox = Sandbox::with_policy(ECHO_HELLO);
    assert_eq!(sandbox.run(&["check", "echo", "hello"]).status.code(), Some(0));

    sandbox.write_policy(ECHO_ANYTHING);
    let output = sandbox.run(&["check", "echo", "hello"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("cmdgate approve"));

    let output = sandbox.run_with_stdin(&["approve"], "y\n");
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Modified files:"));
    assert!(out.contains("[y/N]"));
    assert!(out.contains("Trusted snapshot updated"));

    let output = sandbox.run(&["check", "echo", "anything"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_declined_approval_keeps_denying() {
    let sandbox = Sandbox::with_policy(ECHO_HELLO);
    sandbox.run(&["check", "echo", "hello"]);
    sandbox.write_policy(ECHO_ANYTHING);

    let output = sandbox.run_with_stdin(&["approve"], "n\n");
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("Approval cancelled"));
    assert_eq!(sandbox.run(&["check", "echo", "hello"]).status.code(), Some(1));

    // Closed stdin is a no as well
    let output = sandbox.run_with_stdin(&["approve"], "");
    assert!(stdout(&output).contains("Approval cancelled"));
    assert_eq!(sandbox.run(&["check", "echo", "hello"]).status.code(), Some(1));
}

#[test]
fn test_skip_integrity_env_trusts_tampered_policy() {
    let sandbox = Sandbox::with_policy(ECHO_HELLO);
    sandbox.run(&["check", "echo", "hello"]);
    sandbox.write_policy(ECHO_ANYTHING);

    let output = sandbox
        .command(&["check", "echo", "anything"])
        .env("CMDGATE_SKIP_INTEGRITY", "1")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let output = sandbox
        .command(&["check", "echo", "anything"])
        .env("CMDGATE_SKIP_INTEGRITY", "false")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_verify_reports_state() {
    let sandbox = Sandbox::with_policy(ECHO_HELLO);

    let output = sandbox.run(&["verify"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("No trusted snapshot yet"));

    sandbox.run(&["check", "echo", "hello"]);
    let output = sandbox.run(&["verify", "--verbose"]);
    assert_eq!(output.status.code(), Some(0));
    let out = stdout(&output);
    assert!(out.contains("match the trusted snapshot"));
    assert!(out.contains("Trusted snapshot (1 file(s))"));

    sandbox.write_policy(ECHO_ANYTHING);
    let output = sandbox.run(&["verify", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["valid"], false);
    assert_eq!(result["isFirstRun"], false);
    assert_eq!(result["changedFiles"].as_array().unwrap().len(), 1);
}

#[test]
fn test_verify_corrupt_snapshot_is_invalid() {
    let sandbox = Sandbox::with_policy(ECHO_HELLO);
    std::fs::write(sandbox.snapshot(), "{ not json").unwrap();

    let output = sandbox.run(&["verify", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["valid"], false);
    assert!(result["errors"][0]
        .as_str()
        .unwrap()
        .contains("integrity snapshot"));
}

#[cfg(unix)]
mod exec {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exec_runs_authorized_command() {
        let sandbox = Sandbox::with_policy(ECHO_HELLO);

        let output = sandbox.run(&["exec", "echo", "hello"]);
        assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
        assert_eq!(stdout(&output), "hello\n");
    }

    #[test]
    fn test_exec_forwards_exit_code() {
        let sandbox = Sandbox::with_policy("commands:\n  sh:\n    patterns: [\"-c *\"]\n");

        let output = sandbox.run(&["exec", "sh", "-c", "exit 3"]);
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_exec_does_not_use_a_shell() {
        let sandbox = Sandbox::with_policy("commands:\n  echo:\n    patterns: [\"*\"]\n");

        let output = sandbox.run(&["exec", "echo", "a;", "echo", "$HOME"]);
        assert_eq!(output.status.code(), Some(0));
        assert_eq!(stdout(&output), "a; echo $HOME\n");
    }

    #[test]
    fn test_exec_denied_does_not_run() {
        let sandbox = Sandbox::with_policy(ECHO_HELLO);

        let output = sandbox.run(&["exec", "echo", "goodbye"]);
        assert_eq!(output.status.code(), Some(126));
        assert_eq!(stdout(&output), "");
        assert!(stderr(&output).contains("denied"));
    }

    #[test]
    fn test_exec_missing_program() {
        let sandbox =
            Sandbox::with_policy("commands:\n  cmdgate-no-such-program:\n    patterns: [\"\"]\n");

        let output = sandbox.run(&["exec", "cmdgate-no-such-program"]);
        assert_eq!(output.status.code(), Some(127));
    }
}
