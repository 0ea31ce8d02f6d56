//! Operator commands for the trusted snapshot: approve and verify

use anyhow::{Context, Result};
use std::io::{self, BufRead, Stdout, Write};
use std::process::ExitCode;

use cmdgate_core::integrity::hasher::short_hash;
use cmdgate_core::{ApprovalWorkflow, Confirm, VerificationResult};

use crate::Gate;

/// Asks yes/no questions on a terminal-style stream pair
///
/// Anything other than `y` or `yes` (case-insensitive) is a no, including
/// end of input and read errors.
pub struct StdinConfirm<R, W> {
    input: R,
    output: W,
}

impl StdinConfirm<io::StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        StdinConfirm::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> StdinConfirm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        StdinConfirm { input, output }
    }
}

impl<R: BufRead, W: Write> Confirm for StdinConfirm<R, W> {
    fn ask(&mut self, question: &str) -> bool {
        if write!(self.output, "{question} [y/N]: ")
            .and_then(|_| self.output.flush())
            .is_err()
        {
            return false;
        }

        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(0) | Err(_) => {
                let _ = writeln!(self.output);
                false
            }
            Ok(_) => is_yes(&answer),
        }
    }
}

fn is_yes(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

/// Show what changed and ask the operator to trust the current policy files
pub fn approve_command(gate: &Gate) -> Result<ExitCode> {
    let mut out = io::stdout();
    ApprovalWorkflow::new(gate.integrity(), StdinConfirm::stdio()).run(&mut out)?;
    Ok(ExitCode::SUCCESS)
}

/// Print the integrity state; exit 1 unless the policy files are trusted
pub fn verify_command(gate: &Gate, json: bool, verbose: bool) -> Result<ExitCode> {
    let result = match gate.verify_integrity() {
        Ok(result) => result,
        Err(e) if e.is_integrity_failure() => VerificationResult {
            valid: false,
            errors: vec![e.display_chain()],
            ..Default::default()
        },
        Err(e) => return Err(e).context("Failed to verify policy integrity"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
        if verbose {
            print_tracked(gate)?;
        }
    }

    Ok(if result.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn print_result(result: &VerificationResult) {
    if result.is_first_run {
        println!("No trusted snapshot yet.");
        println!("The next authorized command trusts the current policy files as they are.");
        println!("Run 'cmdgate approve' to review and trust them now.");
        return;
    }

    if result.valid {
        println!("✅ Policy files match the trusted snapshot");
        return;
    }

    println!("❌ Policy integrity check failed. Every command is denied until re-approval.");
    for line in &result.errors {
        println!("  {line}");
    }
    println!();
    println!("Review the changes, then run 'cmdgate approve'.");
}

fn print_tracked(gate: &Gate) -> Result<()> {
    let files = gate.integrity().discover_files();
    println!();
    match files.first() {
        Some(active) => println!("Policy in effect: {}", active.display()),
        None => println!("Policy in effect: (none found)"),
    }

    // A broken snapshot was already reported above
    let Ok(Some(snapshot)) = gate.integrity().load_snapshot() else {
        return Ok(());
    };

    println!("Trusted snapshot ({} file(s)):", snapshot.len());
    for record in &snapshot.records {
        println!(
            "  {}  {}  {}",
            short_hash(&record.hash),
            record.last_modified.format("%Y-%m-%d %H:%M:%S UTC"),
            record.path
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ask(input: &str) -> (bool, String) {
        let mut output = Vec::new();
        let answer = StdinConfirm::new(Cursor::new(input.as_bytes()), &mut output).ask("Trust?");
        (answer, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_yes_answers() {
        for input in ["y\n", "Y\n", "yes\n", "YES\r\n", "  yes  \n", "y"] {
            assert!(ask(input).0, "{input:?} should be a yes");
        }
    }

    #[test]
    fn test_everything_else_is_no() {
        for input in ["n\n", "\n", "no\n", "yess\n", "ok\n", "y y\n"] {
            assert!(!ask(input).0, "{input:?} should be a no");
        }
    }

    #[test]
    fn test_end_of_input_is_no() {
        let (answer, output) = ask("");
        assert!(!answer);
        assert_eq!(output, "Trust? [y/N]: \n");
    }

    #[test]
    fn test_prompt_format() {
        assert_eq!(ask("y\n").1, "Trust? [y/N]: ");
    }

    #[test]
    fn test_reads_one_line_per_question() {
        let mut output = Vec::new();
        let mut confirm = StdinConfirm::new(Cursor::new(b"y\nn\n".as_slice()), &mut output);
        assert!(confirm.ask("first"));
        assert!(!confirm.ask("second"));
        assert!(!confirm.ask("third"));
    }
}
