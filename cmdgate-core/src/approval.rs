//! Human approval of the current policy files
//!
//! This is the only path from the tampered state back to approved. The
//! operator sees every policy file and what changed, then answers a yes/no
//! question. Anything other than an explicit yes leaves the snapshot alone.

use crate::error::GateError;
use crate::integrity::{
    IntegritySnapshot, IntegrityStore, SnapshotStore, TrustState, VerificationResult,
};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::io::Write;
use tracing::info;

/// Source of yes/no answers
pub trait Confirm {
    /// Ask a question and block until answered. `false` unless explicitly confirmed.
    fn ask(&mut self, question: &str) -> bool;
}

impl<C: Confirm + ?Sized> Confirm for &mut C {
    fn ask(&mut self, question: &str) -> bool {
        (**self).ask(question)
    }
}

/// Pre-recorded answers, for tests and scripted runs
///
/// Once the answers run out every further question is answered "no".
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: VecDeque<bool>,
    asked: Vec<String>,
}

impl ScriptedConfirm {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        ScriptedConfirm {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// Questions asked so far, in order
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Confirm for ScriptedConfirm {
    fn ask(&mut self, question: &str) -> bool {
        self.asked.push(question.to_string());
        self.answers.pop_front().unwrap_or(false)
    }
}

pub const APPROVE_QUESTION: &str = "Approve these policy files as trusted?";
pub const REAPPROVE_QUESTION: &str = "Re-approve the current policy files anyway?";
pub const FORCE_QUESTION: &str =
    "No changes were detected. Overwrite the trusted snapshot with identical hashes?";

/// Result of an approval run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// A fresh snapshot was persisted
    Approved {
        snapshot: IntegritySnapshot,
        /// True when nothing had changed and the operator forced it
        forced: bool,
    },
    /// The operator said no; the snapshot was not touched
    Declined,
}

/// Drives the tampered -> approved transition
pub struct ApprovalWorkflow<'a, S, C> {
    integrity: &'a IntegrityStore<S>,
    confirm: C,
}

impl<'a, S: SnapshotStore, C: Confirm> ApprovalWorkflow<'a, S, C> {
    pub fn new(integrity: &'a IntegrityStore<S>, confirm: C) -> Self {
        ApprovalWorkflow { integrity, confirm }
    }

    /// Show the current state, ask for confirmation and persist on yes
    pub fn run(&mut self, out: &mut impl Write) -> Result<ApprovalOutcome> {
        let files = self.integrity.discover_files();
        writeln!(out, "Policy files:")?;
        if files.is_empty() {
            writeln!(out, "  (none found)")?;
        }
        for file in &files {
            writeln!(out, "  {}", file.display())?;
        }
        writeln!(out)?;

        let already_approved = match self.integrity.state() {
            Ok(TrustState::Uninitialized) => {
                writeln!(out, "No trusted snapshot exists yet.")?;
                false
            }
            Ok(TrustState::Approved) => {
                writeln!(
                    out,
                    "All policy files match the trusted snapshot. Nothing to approve."
                )?;
                true
            }
            Ok(TrustState::Tampered(result)) => {
                describe_changes(out, &result)?;
                false
            }
            Err(e @ GateError::IntegrityRead { .. }) => {
                return Err(e).context("Cannot approve policy files that cannot be read");
            }
            Err(e) if e.is_integrity_failure() => {
                writeln!(out, "The trusted snapshot could not be read:\n{e}")?;
                writeln!(out, "Approving replaces it with the files listed above.")?;
                false
            }
            Err(e) => return Err(e).context("Failed to verify policy files"),
        };
        writeln!(out)?;

        let question = if already_approved {
            REAPPROVE_QUESTION
        } else {
            APPROVE_QUESTION
        };
        if !self.confirm.ask(question) {
            return decline(out);
        }
        if already_approved && !self.confirm.ask(FORCE_QUESTION) {
            return decline(out);
        }

        let snapshot = self
            .integrity
            .update_and_persist()
            .context("Failed to save trusted snapshot")?;

        info!(
            target: "security",
            files = snapshot.len(),
            forced = already_approved,
            "Policy files approved by operator"
        );
        writeln!(
            out,
            "Trusted snapshot updated ({} policy file{}).",
            snapshot.len(),
            if snapshot.len() == 1 { "" } else { "s" }
        )?;

        Ok(ApprovalOutcome::Approved {
            snapshot,
            forced: already_approved,
        })
    }
}

fn describe_changes(out: &mut impl Write, result: &VerificationResult) -> Result<()> {
    writeln!(out, "Detected changes since the last approval:")?;
    if !result.new_files.is_empty() {
        writeln!(out, "  New files:")?;
        for path in &result.new_files {
            writeln!(out, "    + {path}")?;
        }
    }
    if !result.changed_files.is_empty() {
        writeln!(out, "  Modified files:")?;
        for path in &result.changed_files {
            writeln!(out, "    ~ {path}")?;
        }
    }
    if !result.deleted_files.is_empty() {
        writeln!(out, "  Deleted files (will be dropped from tracking):")?;
        for path in &result.deleted_files {
            writeln!(out, "    - {path}")?;
        }
    }
    writeln!(out, "Details:")?;
    for line in &result.errors {
        writeln!(out, "  {line}")?;
    }
    Ok(())
}

fn decline(out: &mut impl Write) -> Result<ApprovalOutcome> {
    writeln!(out, "Approval cancelled. Trusted snapshot unchanged.")?;
    Ok(ApprovalOutcome::Declined)
}
