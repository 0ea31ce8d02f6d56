//! Policy integrity - detects policy files changed since the last human approval
//!
//! Without this the allowlist could be rewritten by the very process it is
//! supposed to restrict. Every existing policy file is hashed with SHA-256 and
//! compared with a persisted snapshot; any added, changed or deleted file puts
//! the gate into the tampered state until an operator approves again.

pub mod hasher;
pub mod snapshot;
pub mod verifier;

pub use snapshot::{
    FileSnapshotStore, IntegrityRecord, IntegritySnapshot, MemorySnapshotStore, SnapshotStore,
};
pub use verifier::{IntegrityStore, TrustState, VerificationResult};
