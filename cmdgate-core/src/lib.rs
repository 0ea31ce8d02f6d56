//! cmdgate core - command allowlist with policy tamper detection
//!
//! [`gate::AuthorizationGate::authorize`] is the entry point. It refuses every
//! command while the policy files differ from the last human-approved
//! snapshot, then matches the command's arguments against the allowlist.

pub mod approval;
pub mod error;
pub mod gate;
pub mod integrity;
pub mod matcher;
pub mod paths;
pub mod policy;

pub use approval::{ApprovalOutcome, ApprovalWorkflow, Confirm, ScriptedConfirm};
pub use error::{GateError, Result};
pub use gate::{AuthorizationGate, DenyReason, GateOptions, Verdict};
pub use integrity::{IntegrityStore, VerificationResult};
pub use paths::GatePaths;
pub use policy::{CommandRule, Policy, PolicyLoader};
