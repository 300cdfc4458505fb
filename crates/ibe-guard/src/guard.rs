// guard.rs — The fail-fast authorization pipeline.
//
// `Guard::authorize` takes an execution envelope plus the four records it
// references and walks the stages below in order. The first failing stage
// ends evaluation with a deny reason; only a clean pass returns Allow.
//
//   1  expiry                 8  risk budget
//   2  replay                 9  step resolution
//   3  envelope signature    10  data-class permission
//   4  attestation sigs      11  capability lookup (+ TCA signature)
//   5  alignment evidence    12  effect bound
//   6  alignment threshold   13  destination membrane
//   7  revocation            14  argument schema
//
// Stages 2 and 7 touch shared state (replay cache, revocation registry).
// Everything else is a pure function of the inputs and the clock reading
// taken once at entry.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use ibe_attest::canonical::canonical_bytes;
use ibe_attest::{
    AgentPlan, AlignmentProof, AttestError, Attestation, Evidence, ExecutionEnvelope,
    IntentDeclaration, SignatureStatus, ToolArgs, ToolCapability,
};

use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;
use crate::decision::{Decision, DenyReason, EvaluationStep, GuardTrace, Stage};
use crate::error::GuardError;
use crate::replay::{ReplayCache, ReplayCheck};
use crate::revocation::{RevocationLookup, RevocationRegistry, RevocationSnapshot};
use crate::scoring::{evidence_matches, AlignmentScorer, ScorerRegistry, SEMANTIC_ENTAILMENT_V1};

/// The records presented alongside an envelope.
#[derive(Debug, Clone, Copy)]
pub struct Attestations<'a> {
    pub proof: &'a AlignmentProof,
    pub intent: &'a IntentDeclaration,
    pub plan: &'a AgentPlan,
    pub capability: &'a ToolCapability,
}

/// Why evaluation stopped before the end.
enum Halt {
    Deny(DenyReason),
    Fault(GuardError),
}

impl From<AttestError> for Halt {
    fn from(err: AttestError) -> Self {
        Self::Fault(GuardError::Attest(err))
    }
}

/// Collects the per-stage trace while the pipeline runs.
#[derive(Default)]
struct Recorder {
    stages: Vec<EvaluationStep>,
    alignment: Option<Evidence>,
}

impl Recorder {
    fn pass(&mut self, stage: Stage, outcome: impl Into<String>) {
        let outcome = outcome.into();
        tracing::debug!(?stage, %outcome, "stage passed");
        self.stages.push(EvaluationStep {
            stage,
            outcome,
            terminal: false,
        });
    }

    fn deny(&mut self, stage: Stage, reason: DenyReason, detail: impl Into<String>) -> Halt {
        self.stages.push(EvaluationStep {
            stage,
            outcome: format!("failed: {} ({})", reason, detail.into()),
            terminal: true,
        });
        Halt::Deny(reason)
    }
}

/// Authorizes tool calls against signed intent, plan, alignment and
/// capability records.
///
/// A guard owns its replay cache and revocation registry; share one instance
/// (e.g. behind `Arc`) across every caller that must agree on nonce reuse.
pub struct Guard {
    config: GuardConfig,
    scorers: ScorerRegistry,
    replay: ReplayCache,
    revocations: RevocationRegistry,
    clock: Arc<dyn Clock>,
}

impl Guard {
    /// A guard using wall-clock time and the built-in scorers.
    pub fn new(config: GuardConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// A guard reading time from `clock`.
    pub fn with_clock(config: GuardConfig, clock: Arc<dyn Clock>) -> Self {
        let scorers = ScorerRegistry::builtin(config.external_policy.clone());
        Self {
            config,
            scorers,
            replay: ReplayCache::default(),
            revocations: RevocationRegistry::new(),
            clock,
        }
    }

    /// Add or replace a scoring method. Select it with `verifier_method`.
    pub fn register_scorer(&mut self, scorer: Arc<dyn AlignmentScorer>) {
        self.scorers.register(scorer);
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn replay_cache(&self) -> &ReplayCache {
        &self.replay
    }

    pub fn revocations(&self) -> &RevocationRegistry {
        &self.revocations
    }

    /// Atomically replace the revocation registry.
    pub fn set_registry(
        &self,
        issued: DateTime<Utc>,
        expires: DateTime<Utc>,
        revoked: HashMap<String, String>,
    ) {
        self.revocations.set_registry(issued, expires, revoked);
    }

    /// Atomically replace the revocation registry from a snapshot.
    pub fn load_registry(&self, snapshot: RevocationSnapshot) {
        self.revocations.replace(snapshot);
    }

    /// Decide whether the step named by `envelope` may run.
    ///
    /// Denials are returned as `Ok(Decision::Deny { .. })`. `Err` means a
    /// record could not be canonicalized, which is a caller bug.
    pub fn authorize(
        &self,
        envelope: &ExecutionEnvelope,
        proof: &AlignmentProof,
        intent: &IntentDeclaration,
        plan: &AgentPlan,
        capability: &ToolCapability,
    ) -> Result<Decision, GuardError> {
        let records = Attestations {
            proof,
            intent,
            plan,
            capability,
        };
        Ok(self.authorize_with_trace(envelope, records)?.decision)
    }

    /// Like [`authorize`](Self::authorize), but also returns every stage
    /// evaluated, the recomputed alignment, and the envelope digest.
    pub fn authorize_with_trace(
        &self,
        envelope: &ExecutionEnvelope,
        records: Attestations<'_>,
    ) -> Result<GuardTrace, GuardError> {
        let envelope_digest = envelope_digest(envelope)?;
        let now = self.clock.now();
        let mut rec = Recorder::default();

        let decision = match self.evaluate(envelope, records, now, &mut rec) {
            Ok(()) => {
                tracing::info!(
                    envelope = %envelope.id,
                    step = %envelope.apa_step_ref,
                    coverage = rec.alignment.map(|e| e.coverage),
                    "authorized"
                );
                Decision::Allow
            }
            Err(Halt::Deny(reason)) => {
                tracing::warn!(
                    envelope = %envelope.id,
                    step = %envelope.apa_step_ref,
                    reason = %reason,
                    "denied"
                );
                Decision::Deny { reason }
            }
            Err(Halt::Fault(err)) => return Err(err),
        };

        Ok(GuardTrace {
            decision,
            stages: rec.stages,
            alignment: rec.alignment,
            envelope_digest,
        })
    }

    fn evaluate(
        &self,
        envelope: &ExecutionEnvelope,
        records: Attestations<'_>,
        now: DateTime<Utc>,
        rec: &mut Recorder,
    ) -> Result<(), Halt> {
        let Attestations {
            proof,
            intent,
            plan,
            capability,
        } = records;
        let strict = self.config.strict;
        let secret = self.config.secret.as_bytes();

        // 1. Expiry
        if envelope.is_expired_at(now) {
            return Err(rec.deny(
                Stage::Expiry,
                DenyReason::Expired,
                format!("envelope expired at {}", envelope.exp),
            ));
        }
        if strict.enforce_intent_window && now > intent.constraints.time_window.not_after {
            return Err(rec.deny(
                Stage::Expiry,
                DenyReason::IntentExpired,
                format!(
                    "intent window closed at {}",
                    intent.constraints.time_window.not_after
                ),
            ));
        }
        rec.pass(Stage::Expiry, format!("passed: expires {}", envelope.exp));

        // 2. Replay
        if let ReplayCheck::Replayed { first_seen } =
            self.replay.check_and_record(&envelope.nonce, now)
        {
            return Err(rec.deny(
                Stage::Replay,
                DenyReason::Replay,
                format!("nonce first seen at {}", first_seen),
            ));
        }
        rec.pass(Stage::Replay, "passed: nonce recorded");

        // 3. Envelope signature
        match envelope.verify_signature(secret)? {
            SignatureStatus::Valid => rec.pass(Stage::EnvelopeSignature, "passed"),
            SignatureStatus::Unsigned => {
                return Err(rec.deny(
                    Stage::EnvelopeSignature,
                    DenyReason::SignatureInvalid,
                    "envelope is unsigned",
                ))
            }
            SignatureStatus::Invalid => {
                return Err(rec.deny(
                    Stage::EnvelopeSignature,
                    DenyReason::SignatureInvalid,
                    "signature does not verify",
                ))
            }
        }

        // 4. Attestation signatures
        let intent_status =
            check_embedded(intent, secret, strict.require_attestation_proofs)
                .map_err(|halt| deny_signature(rec, halt, DenyReason::IntentSignatureInvalid))?;
        let plan_status = check_embedded(plan, secret, strict.require_attestation_proofs)
            .map_err(|halt| deny_signature(rec, halt, DenyReason::PlanSignatureInvalid))?;
        let proof_status = check_embedded(proof, secret, strict.require_attestation_proofs)
            .map_err(|halt| deny_signature(rec, halt, DenyReason::ProofSignatureInvalid))?;
        rec.pass(
            Stage::AttestationSignatures,
            format!(
                "passed: UIA {:?}, APA {:?}, APR {:?}",
                intent_status, plan_status, proof_status
            ),
        );

        if strict.enforce_reference_binding {
            if let Some(mismatch) = reference_mismatch(envelope, records) {
                return Err(rec.deny(
                    Stage::ReferenceBinding,
                    DenyReason::ReferenceMismatch,
                    mismatch,
                ));
            }
            rec.pass(Stage::ReferenceBinding, "passed");
        }

        // 5. Alignment evidence
        let scorer = self.scorers.resolve(self.config.verifier_method.tag());
        let evidence = scorer.score(intent, plan);
        rec.alignment = Some(evidence);
        if proof.method == SEMANTIC_ENTAILMENT_V1 {
            if !evidence_matches(&proof.evidence, &evidence) {
                return Err(rec.deny(
                    Stage::AlignmentEvidence,
                    DenyReason::EvidenceMismatch,
                    format!(
                        "declared coverage {} risk {}, recomputed coverage {} risk {} with {}",
                        proof.evidence.coverage,
                        proof.evidence.risk,
                        evidence.coverage,
                        evidence.risk,
                        scorer.method()
                    ),
                ));
            }
            rec.pass(
                Stage::AlignmentEvidence,
                format!("passed: reproduced with {}", scorer.method()),
            );
        } else {
            rec.pass(
                Stage::AlignmentEvidence,
                format!(
                    "skipped: declared method '{}' is not compared",
                    proof.method
                ),
            );
        }

        // 6. Alignment threshold (NaN on either side denies)
        let meets_threshold = matches!(
            evidence.coverage.partial_cmp(&self.config.min_alignment),
            Some(Ordering::Greater | Ordering::Equal)
        );
        if !meets_threshold {
            return Err(rec.deny(
                Stage::AlignmentThreshold,
                DenyReason::AlignmentBelowThreshold,
                format!(
                    "coverage {} < minimum {}",
                    evidence.coverage, self.config.min_alignment
                ),
            ));
        }
        rec.pass(
            Stage::AlignmentThreshold,
            format!(
                "passed: coverage {} >= {}",
                evidence.coverage, self.config.min_alignment
            ),
        );

        // 7. Revocation
        match self
            .revocations
            .lookup(&[intent.id.as_str(), plan.id.as_str()], now)
        {
            RevocationLookup::Unset => {
                rec.pass(Stage::Revocation, "skipped: no registry loaded");
            }
            RevocationLookup::Stale { expired_at } => {
                if strict.fail_closed_on_stale_registry {
                    return Err(rec.deny(
                        Stage::Revocation,
                        DenyReason::RegistryStale,
                        format!("registry expired at {}", expired_at),
                    ));
                }
                tracing::warn!(%expired_at, "revocation registry is stale; skipping checks");
                rec.pass(
                    Stage::Revocation,
                    format!("skipped: registry stale since {}", expired_at),
                );
            }
            RevocationLookup::Current {
                revoked: Some((id, reason)),
            } => {
                let tag = if id == intent.id {
                    DenyReason::IntentRevoked
                } else {
                    DenyReason::PlanRevoked
                };
                return Err(rec.deny(
                    Stage::Revocation,
                    tag,
                    format!("'{}' revoked: {}", id, reason),
                ));
            }
            RevocationLookup::Current { revoked: None } => {
                rec.pass(Stage::Revocation, "passed");
            }
        }

        // 8. Risk budget
        let budget = &intent.risk_budget;
        if plan.totals.predicted_writes > budget.max_writes {
            return Err(rec.deny(
                Stage::RiskBudget,
                DenyReason::WritesExceeded,
                format!(
                    "predicted writes {} > max {}",
                    plan.totals.predicted_writes, budget.max_writes
                ),
            ));
        }
        if plan.totals.predicted_records > budget.max_records {
            return Err(rec.deny(
                Stage::RiskBudget,
                DenyReason::RecordsExceeded,
                format!(
                    "predicted records {} > max {}",
                    plan.totals.predicted_records, budget.max_records
                ),
            ));
        }
        if strict.enforce_external_call_budget && budget.max_external_calls > 0 {
            let calls = plan.external_calls();
            if calls > budget.max_external_calls as usize {
                return Err(rec.deny(
                    Stage::RiskBudget,
                    DenyReason::ExternalCallsExceeded,
                    format!(
                        "external calls {} > max {}",
                        calls, budget.max_external_calls
                    ),
                ));
            }
        }
        rec.pass(Stage::RiskBudget, "passed");

        // 9. Step resolution
        let Some(step) = plan.step(&envelope.apa_step_ref) else {
            return Err(rec.deny(
                Stage::StepResolution,
                DenyReason::StepNotFound,
                format!("no step '{}' in plan '{}'", envelope.apa_step_ref, plan.id),
            ));
        };
        rec.pass(
            Stage::StepResolution,
            format!("found: step '{}' calls {}", step.id, step.tool),
        );

        // 10. Data-class permission
        if let Some(class) = step
            .expected
            .data_classes
            .iter()
            .find(|c| !intent.permits_data_class(c))
        {
            return Err(rec.deny(
                Stage::DataClass,
                DenyReason::DataClassNotPermitted,
                format!("data class '{}' not permitted by intent", class),
            ));
        }
        rec.pass(Stage::DataClass, "passed");

        // 11. Capability lookup
        let Some(operation) = capability.operation(&step.tool) else {
            return Err(rec.deny(
                Stage::Capability,
                DenyReason::OperationNotAllowed,
                format!(
                    "capability '{}' declares no '{}' operation",
                    capability.id, step.tool
                ),
            ));
        };
        let capability_status =
            check_embedded(capability, secret, strict.require_attestation_proofs).map_err(
                |halt| deny_signature(rec, halt, DenyReason::CapabilitySignatureInvalid),
            )?;
        rec.pass(
            Stage::Capability,
            format!(
                "found: operation '{}', TCA {:?}",
                operation.name, capability_status
            ),
        );

        // 12. Effect bound
        if step.expected.writes > operation.effects.writes {
            return Err(rec.deny(
                Stage::EffectBound,
                DenyReason::EffectsExceeded,
                format!(
                    "step writes {} > operation max {}",
                    step.expected.writes, operation.effects.writes
                ),
            ));
        }
        rec.pass(Stage::EffectBound, "passed");

        // 13. Destination membrane
        if operation.restricts_destinations() {
            if let Some(url) = step.url_argument() {
                if !operation.allows_destination(url) {
                    return Err(rec.deny(
                        Stage::Destination,
                        DenyReason::DestinationNotAllowed,
                        format!("'{}' matches no allowed destination", url),
                    ));
                }
            }
            rec.pass(Stage::Destination, "passed");
        } else {
            rec.pass(Stage::Destination, "skipped: unrestricted operation");
        }

        // 14. Argument schema
        if let Err(err) = ToolArgs::parse(&step.tool, &step.args) {
            return Err(rec.deny(
                Stage::ArgumentSchema,
                DenyReason::InputSchemaInvalid,
                err.to_string(),
            ));
        }
        rec.pass(Stage::ArgumentSchema, "passed");

        Ok(())
    }
}

/// Check a record's embedded proof. Missing proofs are accepted unless
/// `required`. A `Halt::Deny` here carries a placeholder reason; callers
/// substitute the record's own tag via [`deny_signature`].
fn check_embedded<T: Attestation>(
    record: &T,
    secret: &[u8],
    required: bool,
) -> Result<SignatureStatus, Halt> {
    match record.verify_signature(secret)? {
        SignatureStatus::Valid => Ok(SignatureStatus::Valid),
        SignatureStatus::Unsigned if !required => Ok(SignatureStatus::Unsigned),
        SignatureStatus::Unsigned | SignatureStatus::Invalid => {
            tracing::debug!(kind = T::KIND, id = record.record_id(), "embedded proof rejected");
            Err(Halt::Deny(DenyReason::SignatureInvalid))
        }
    }
}

fn deny_signature(rec: &mut Recorder, halt: Halt, reason: DenyReason) -> Halt {
    match halt {
        Halt::Deny(_) => {
            let stage = if reason == DenyReason::CapabilitySignatureInvalid {
                Stage::Capability
            } else {
                Stage::AttestationSignatures
            };
            rec.deny(stage, reason, "embedded proof missing or invalid")
        }
        fault @ Halt::Fault(_) => fault,
    }
}

/// The first cross-reference that does not line up, if any.
fn reference_mismatch(envelope: &ExecutionEnvelope, records: Attestations<'_>) -> Option<String> {
    let checks = [
        ("envelope uiaRef", envelope.uia_ref.as_str(), records.intent.id.as_str()),
        ("envelope aprRef", envelope.apr_ref.as_str(), records.proof.id.as_str()),
        ("envelope tcaRef", envelope.tca_ref.as_str(), records.capability.id.as_str()),
        ("plan uia", records.plan.uia.as_str(), records.intent.id.as_str()),
        ("proof uia", records.proof.uia.as_str(), records.intent.id.as_str()),
        ("proof apa", records.proof.apa.as_str(), records.plan.id.as_str()),
    ];
    checks
        .iter()
        .find(|(_, got, want)| got != want)
        .map(|(what, got, want)| format!("{} is '{}', expected '{}'", what, got, want))
}

/// Lowercase hex SHA-256 of the envelope's canonical JSON.
pub fn envelope_digest(envelope: &ExecutionEnvelope) -> Result<String, GuardError> {
    let bytes = canonical_bytes(envelope)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
