//! # ibe-attest
//!
//! Attestation records and their signing primitive for Intent-Bound Execution.
//!
//! A tool call is only authorized when a chain of records agrees: an
//! [`IntentDeclaration`] (what the requester wants), an [`AgentPlan`] (how the
//! agent proposes to do it), an [`AlignmentProof`] (declared evidence that the
//! plan serves the intent), a [`ToolCapability`] (what the tool may do), and a
//! single-use [`ExecutionEnvelope`] tying one plan step to all of them.
//!
//! Records are signed as HS256 compact tokens over canonical JSON:
//!
//! ```rust
//! use ibe_attest::jws;
//! use serde_json::json;
//!
//! let secret = b"dev-secret-change-me";
//! let record = json!({"id": "urn:uia:1", "purpose": "Summarize"});
//! let token = jws::sign(secret, &record).unwrap();
//! assert!(jws::verify(secret, &record, &token).unwrap());
//! ```
//!
//! ## Key invariants
//!
//! - **Canonical bytes**: object keys are sorted by byte value at every level,
//!   so key insertion order never changes a signature.
//! - **Self-exclusion**: a record's own signature field is cleared before it
//!   is signed or verified (see [`Attestation::unsigned`]).
//! - **Payload binding**: a token only verifies against the exact record it
//!   was minted for, even when its MAC is valid.

pub mod attestation;
pub mod canonical;
pub mod error;
pub mod jws;
pub mod record;
pub mod tool;

pub use attestation::{Attestation, SignatureStatus};
pub use error::AttestError;
pub use record::{
    AgentPlan, AlignmentProof, CapabilityOperation, Constraints, Evidence, ExecutionEnvelope,
    IntentDeclaration, ModelInfo, OperationEffects, PlanStep, PlanTotals, Principal, Proof,
    RiskBudget, StepAlignment, StepExpected, TimeBound, ToolCapability,
};
pub use tool::{FetchArgs, GenerateArgs, ToolArgs, ToolKind};
