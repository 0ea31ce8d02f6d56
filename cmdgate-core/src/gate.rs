//! The authorization gate - single entry point for "may this command run?"
//!
//! Order matters: integrity is checked before the policy is even read, so a
//! rewritten allowlist can never authorize anything until an operator has
//! approved it.

use crate::error::{GateError, Result};
use crate::integrity::{
    FileSnapshotStore, IntegritySnapshot, IntegrityStore, SnapshotStore, VerificationResult,
};
use crate::matcher;
use crate::paths::GatePaths;
use crate::policy::{Policy, PolicyLoader};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Why a command was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenyReason {
    /// Policy files differ from the approved snapshot, or trust could not be established
    IntegrityTampered { diagnostics: Vec<String> },

    /// The command has no entry in the policy
    NotConfigured { command: String },

    /// The command is configured but no pattern matches the arguments
    NoPatternMatch {
        command: String,
        arguments: String,
        patterns: Vec<String>,
        /// Literal pattern that would allow this exact invocation
        suggestion: String,
    },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::IntegrityTampered { diagnostics } => {
                writeln!(
                    f,
                    "Policy integrity check failed. No command is allowed until the policy is re-approved."
                )?;
                writeln!(f)?;
                for line in diagnostics {
                    writeln!(f, "  {line}")?;
                }
                writeln!(f)?;
                writeln!(f, "If these changes are expected, review them and run:")?;
                write!(f, "  cmdgate approve")
            }
            DenyReason::NotConfigured { command } => {
                write!(f, "Command '{command}' is not configured in the policy")
            }
            DenyReason::NoPatternMatch {
                command,
                arguments,
                patterns,
                suggestion,
            } => {
                writeln!(
                    f,
                    "Arguments \"{arguments}\" for command '{command}' match no allowed pattern."
                )?;
                writeln!(f)?;
                writeln!(f, "Allowed patterns:")?;
                if patterns.is_empty() {
                    writeln!(f, "  (none)")?;
                }
                for pattern in patterns {
                    writeln!(f, "  - {}", quote(pattern))?;
                }
                writeln!(f)?;
                if suggestion.contains('*') {
                    writeln!(f, "To allow this invocation, add to the policy:")?;
                } else {
                    writeln!(f, "To allow this exact invocation, add to the policy:")?;
                }
                writeln!(f, "  commands:")?;
                writeln!(f, "    {command}:")?;
                writeln!(f, "      patterns:")?;
                writeln!(f, "        - {}", quote(suggestion))?;
                if suggestion.contains('*') {
                    writeln!(
                        f,
                        "Note: `*` in a pattern is a wildcard, so this entry also allows other arguments."
                    )?;
                }
                write!(f, "then run 'cmdgate approve'.")
            }
        }
    }
}

/// YAML-safe double-quoted scalar
fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

/// The gate's answer for one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Allowed; the first matching pattern in declaration order
    Authorized { matched_pattern: String },
    /// Refused
    Denied { reason: DenyReason },
}

impl Verdict {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Verdict::Authorized { .. })
    }

    fn tampered(diagnostics: Vec<String>) -> Self {
        Verdict::Denied {
            reason: DenyReason::IntegrityTampered { diagnostics },
        }
    }
}

/// Runtime switches for the gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateOptions {
    /// Skip integrity verification entirely.
    ///
    /// For non-interactive automation that cannot answer approval prompts.
    /// This disables tamper detection: a rewritten policy is trusted as-is.
    pub skip_integrity: bool,
}

/// Rebuild the argument string patterns are matched against.
///
/// Arguments are joined with single spaces. This is lossy: `["a b"]` and
/// `["a", "b"]` both become `a b` and cannot be told apart by a pattern.
pub fn join_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Integrity check, policy lookup and pattern matching in one place
#[derive(Debug)]
pub struct AuthorizationGate<S> {
    loader: PolicyLoader,
    integrity: IntegrityStore<S>,
    options: GateOptions,
}

impl AuthorizationGate<FileSnapshotStore> {
    /// Gate over the standard file locations
    pub fn from_paths(paths: &GatePaths, options: GateOptions) -> Self {
        let candidates = paths.policy_candidates();
        AuthorizationGate::new(
            PolicyLoader::new(candidates.clone()),
            IntegrityStore::new(candidates, FileSnapshotStore::new(&paths.snapshot)),
            options,
        )
    }
}

impl<S: SnapshotStore> AuthorizationGate<S> {
    pub fn new(loader: PolicyLoader, integrity: IntegrityStore<S>, options: GateOptions) -> Self {
        AuthorizationGate {
            loader,
            integrity,
            options,
        }
    }

    pub fn integrity(&self) -> &IntegrityStore<S> {
        &self.integrity
    }

    pub fn options(&self) -> GateOptions {
        self.options
    }

    /// Decide whether `command` may run with `args`
    ///
    /// Configuration problems (missing, unparsable or malformed policy) are
    /// returned as errors. Integrity failures, including unreadable policy
    /// files or snapshot, are denials.
    pub fn authorize<A: AsRef<str>>(&self, command: &str, args: &[A]) -> Result<Verdict> {
        if self.options.skip_integrity {
            warn!(
                target: "security",
                "Integrity verification skipped: policy tampering will NOT be detected"
            );
        } else if let Some(denied) = self.check_integrity()? {
            return Ok(denied);
        }

        let policy = self.loader.load()?;

        let Some(rule) = policy.command(command) else {
            debug!("Command '{}' not configured", command);
            return Ok(Verdict::Denied {
                reason: DenyReason::NotConfigured {
                    command: command.to_string(),
                },
            });
        };

        let arguments = join_args(args);
        match matcher::first_match(&rule.patterns, &arguments) {
            Some(pattern) => {
                debug!(
                    "Authorized '{} {}' via pattern {:?}",
                    command, arguments, pattern
                );
                Ok(Verdict::Authorized {
                    matched_pattern: pattern.to_string(),
                })
            }
            None => {
                debug!("No pattern for '{}' matches {:?}", command, arguments);
                Ok(Verdict::Denied {
                    reason: DenyReason::NoPatternMatch {
                        command: command.to_string(),
                        suggestion: arguments.clone(),
                        arguments,
                        patterns: rule.patterns.clone(),
                    },
                })
            }
        }
    }

    /// `None` when trusted, or the denial to return
    fn check_integrity(&self) -> Result<Option<Verdict>> {
        let result = match self.integrity.verify() {
            Ok(result) => result,
            Err(e) => return fail_closed(e),
        };

        if result.is_first_run {
            let snapshot = match self.integrity.update_and_persist() {
                Ok(snapshot) => snapshot,
                Err(e) => return fail_closed(e),
            };
            info!(
                "First run: trusting {} policy file(s) as they are now. \
                 After editing the policy, run 'cmdgate approve'.",
                snapshot.len()
            );
            return Ok(None);
        }

        if !result.valid {
            warn!(
                target: "security",
                "Denying: policy files changed since last approval ({} issue(s))",
                result.errors.len()
            );
            return Ok(Some(Verdict::tampered(result.errors)));
        }

        Ok(None)
    }

    /// Compare policy files with the trusted snapshot without side effects
    pub fn verify_integrity(&self) -> Result<VerificationResult> {
        self.integrity.verify()
    }

    /// Trust the policy files as they are now
    pub fn update_and_persist_snapshot(&self) -> Result<IntegritySnapshot> {
        self.integrity.update_and_persist()
    }

    pub fn load_policy(&self) -> Result<Policy> {
        self.loader.load()
    }
}

/// Integrity failures deny; anything else propagates
fn fail_closed(error: GateError) -> Result<Option<Verdict>> {
    if error.is_integrity_failure() {
        error.log_if_security_critical();
        Ok(Some(Verdict::tampered(vec![error.display_chain()])))
    } else {
        Err(error)
    }
}
