//! # ibe-guard
//!
//! Fail-fast authorization of agent tool calls for Intent-Bound Execution.
//!
//! A [`Guard`] receives a signed [`ExecutionEnvelope`](ibe_attest::ExecutionEnvelope)
//! naming one plan step, together with the intent, plan, alignment proof and
//! tool capability it references. It runs fourteen ordered checks and returns
//! [`Decision::Allow`] or [`Decision::Deny`] with a stable reason tag such as
//! `REPLAY` or `ALIGN-BELOW-THRESHOLD`. The caller only invokes the tool on
//! Allow.
//!
//! ## Key invariants
//!
//! - **Fail fast**: the first failing stage decides; there is no partial allow.
//! - **Expiry dominates**: an expired envelope is denied before anything else
//!   is looked at.
//! - **Single use**: a nonce is accepted once per replay window, even under
//!   concurrent calls on one guard.
//! - **Reproducible evidence**: a `semantic-entailment-v1` proof must match the
//!   guard's own recomputation within 1e-9.
//! - **Denials are values**: `Err` is reserved for records that cannot be
//!   canonicalized.
//!
//! Two leniencies are on by default and switchable through [`Strictness`]:
//! records without an embedded proof are accepted, and a lapsed revocation
//! registry is skipped.

pub mod clock;
pub mod config;
pub mod conformance;
pub mod decision;
pub mod error;
pub mod guard;
pub mod replay;
pub mod revocation;
pub mod scoring;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GuardConfig, GuardSettings, SecretKey, Strictness, VerifierMethod};
pub use decision::{Decision, DenyReason, EvaluationStep, GuardTrace, Stage};
pub use error::{ConfigError, ConformanceError, GuardError};
pub use guard::{envelope_digest, Attestations, Guard};
pub use replay::{ReplayCache, ReplayCheck};
pub use revocation::{RevocationLookup, RevocationRegistry, RevocationSnapshot};
pub use scoring::{AlignmentScorer, ExternalPolicy, ScorerRegistry};
