// conformance.rs — Test-vector conformance suite and golden-file emission.
//
// A vector directory holds JSON fixtures for each record type. The suite
// checks that the pass proof reproduces under semantic entailment, that the
// low-coverage proof does not, and that an expired envelope is denied with
// EXPIRED. When signed golden files are present they are verified too.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use ibe_attest::{
    AgentPlan, AlignmentProof, AttestError, Attestation, ExecutionEnvelope, IntentDeclaration,
    SignatureStatus, ToolCapability,
};

use crate::clock::ManualClock;
use crate::config::GuardConfig;
use crate::decision::{Decision, DenyReason};
use crate::error::ConformanceError;
use crate::guard::Guard;
use crate::scoring::{evidence_matches, AlignmentScorer, SemanticEntailmentScorer, SEMANTIC_ENTAILMENT_V1};

pub const INTENT_VECTOR: &str = "uia_minimal.json";
pub const PLAN_VECTOR: &str = "apa_generate_step.json";
pub const PASS_PROOF_VECTOR: &str = "apr_pass_semantic_entailment_v1.json";
pub const FAIL_PROOF_VECTOR: &str = "apr_fail_low_coverage.json";
pub const EXPIRED_ENVELOPE_VECTOR: &str = "ibe_expired.json";
pub const CAPABILITY_VECTOR: &str = "tca_generate.json";

pub const GOLDEN_INTENT: &str = "golden_uia_signed.json";
pub const GOLDEN_PLAN: &str = "golden_apa_signed.json";
pub const GOLDEN_PROOF: &str = "golden_apr_signed.json";

/// The fixtures the suite runs against.
#[derive(Debug, Clone)]
pub struct VectorSet {
    pub dir: PathBuf,
    pub intent: IntentDeclaration,
    pub plan: AgentPlan,
    pub pass_proof: AlignmentProof,
    pub fail_proof: AlignmentProof,
    pub expired_envelope: ExecutionEnvelope,
    /// Optional; an empty capability is used when absent.
    pub capability: Option<ToolCapability>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConformanceError> {
    let bytes = std::fs::read(path).map_err(|source| ConformanceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ConformanceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ConformanceError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(AttestError::from)?;
    bytes.push(b'\n');
    std::fs::write(path, bytes).map_err(|source| ConformanceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl VectorSet {
    /// Load every vector from `dir`.
    pub fn load(dir: &Path) -> Result<Self, ConformanceError> {
        let capability_path = dir.join(CAPABILITY_VECTOR);
        let capability = if capability_path.exists() {
            Some(read_json(&capability_path)?)
        } else {
            None
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            intent: read_json(&dir.join(INTENT_VECTOR))?,
            plan: read_json(&dir.join(PLAN_VECTOR))?,
            pass_proof: read_json(&dir.join(PASS_PROOF_VECTOR))?,
            fail_proof: read_json(&dir.join(FAIL_PROOF_VECTOR))?,
            expired_envelope: read_json(&dir.join(EXPIRED_ENVELOPE_VECTOR))?,
            capability,
        })
    }
}

/// Outcome of one conformance case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl CaseResult {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for CaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            write!(f, "[PASS] {}", self.name)
        } else {
            write!(f, "[FAIL] {}: {}", self.name, self.detail)
        }
    }
}

/// Results of a conformance run.
#[derive(Debug, Clone, Default)]
pub struct ConformanceReport {
    pub cases: Vec<CaseResult>,
}

impl ConformanceReport {
    pub fn total(&self) -> usize {
        self.cases.len()
    }

    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    pub fn is_success(&self) -> bool {
        self.cases.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.cases.iter().filter(|c| !c.passed)
    }
}

/// Run the suite with wall-clock time.
pub fn run(vectors: &VectorSet, config: &GuardConfig) -> Result<ConformanceReport, ConformanceError> {
    run_at(vectors, config, Utc::now())
}

/// Run the suite as of `now`.
pub fn run_at(
    vectors: &VectorSet,
    config: &GuardConfig,
    now: DateTime<Utc>,
) -> Result<ConformanceReport, ConformanceError> {
    let mut report = ConformanceReport::default();
    let recomputed = SemanticEntailmentScorer.score(&vectors.intent, &vectors.plan);

    let pass = &vectors.pass_proof;
    report.cases.push(
        if pass.method == SEMANTIC_ENTAILMENT_V1 && evidence_matches(&pass.evidence, &recomputed) {
            CaseResult::pass("apr_pass_semantic_entailment_v1", "evidence reproduced")
        } else {
            CaseResult::fail(
                "apr_pass_semantic_entailment_v1",
                format!(
                    "method {} declared coverage={} risk={}, recomputed coverage={} risk={}",
                    pass.method,
                    pass.evidence.coverage,
                    pass.evidence.risk,
                    recomputed.coverage,
                    recomputed.risk
                ),
            )
        },
    );

    let fail = &vectors.fail_proof;
    report.cases.push(
        if fail.method == SEMANTIC_ENTAILMENT_V1 && !evidence_matches(&fail.evidence, &recomputed) {
            CaseResult::pass("apr_fail_low_coverage", "mismatch as expected")
        } else {
            CaseResult::fail(
                "apr_fail_low_coverage",
                format!(
                    "unexpectedly matched coverage={} risk={} (method {})",
                    recomputed.coverage, recomputed.risk, fail.method
                ),
            )
        },
    );

    report.cases.push(expired_case(vectors, config, now)?);

    for (file, status) in golden_statuses(&vectors.dir, config.secret.as_bytes())? {
        report.cases.push(match status {
            SignatureStatus::Valid => CaseResult::pass(file, "signature valid"),
            other => CaseResult::fail(file, format!("signature {:?}", other)),
        });
    }

    Ok(report)
}

fn expired_case(
    vectors: &VectorSet,
    config: &GuardConfig,
    now: DateTime<Utc>,
) -> Result<CaseResult, ConformanceError> {
    let mut envelope = vectors.expired_envelope.clone();
    if envelope.exp >= now {
        envelope.exp = now - Duration::minutes(1);
    }
    let capability = vectors.capability.clone().unwrap_or_else(|| ToolCapability {
        id: envelope.tca_ref.clone(),
        operator: String::new(),
        operations: Vec::new(),
        proof: Default::default(),
    });
    let guard = Guard::with_clock(config.clone(), Arc::new(ManualClock::new(now)));
    let decision = guard.authorize(
        &envelope,
        &vectors.pass_proof,
        &vectors.intent,
        &vectors.plan,
        &capability,
    )?;
    Ok(match decision {
        Decision::Deny {
            reason: DenyReason::Expired,
        } => CaseResult::pass("ibe_expired", "denied EXPIRED"),
        other => CaseResult::fail("ibe_expired", format!("expected DENY EXPIRED, got {}", other)),
    })
}

/// Verify whichever golden files exist in `dir`.
fn golden_statuses(
    dir: &Path,
    secret: &[u8],
) -> Result<Vec<(&'static str, SignatureStatus)>, ConformanceError> {
    let mut statuses = Vec::new();
    let intent = dir.join(GOLDEN_INTENT);
    if intent.exists() {
        let record: IntentDeclaration = read_json(&intent)?;
        statuses.push((GOLDEN_INTENT, record.verify_signature(secret)?));
    }
    let plan = dir.join(GOLDEN_PLAN);
    if plan.exists() {
        let record: AgentPlan = read_json(&plan)?;
        statuses.push((GOLDEN_PLAN, record.verify_signature(secret)?));
    }
    let proof = dir.join(GOLDEN_PROOF);
    if proof.exists() {
        let record: AlignmentProof = read_json(&proof)?;
        statuses.push((GOLDEN_PROOF, record.verify_signature(secret)?));
    }
    Ok(statuses)
}

/// Sign the intent, plan and pass proof with `secret` and write them to `out`
/// as `golden_{uia,apa,apr}_signed.json`. Returns the paths written.
pub fn emit_golden(
    vectors: &VectorSet,
    secret: &[u8],
    out: &Path,
) -> Result<Vec<PathBuf>, ConformanceError> {
    std::fs::create_dir_all(out).map_err(|source| ConformanceError::Io {
        path: out.to_path_buf(),
        source,
    })?;

    let mut intent = vectors.intent.clone();
    intent.seal(secret)?;
    let mut plan = vectors.plan.clone();
    plan.seal(secret)?;
    let mut proof = vectors.pass_proof.clone();
    proof.seal(secret)?;

    let paths = vec![
        out.join(GOLDEN_INTENT),
        out.join(GOLDEN_PLAN),
        out.join(GOLDEN_PROOF),
    ];
    write_json(&paths[0], &intent)?;
    write_json(&paths[1], &plan)?;
    write_json(&paths[2], &proof)?;
    tracing::info!(dir = %out.display(), "golden vectors written");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::test_support::{generate, intent, plan};
    use ibe_attest::record::{ALIGNMENT_PROOF_TYPE, ENVELOPE_TYPE};
    use ibe_attest::{Evidence, Proof};

    fn proof(coverage: f64) -> AlignmentProof {
        AlignmentProof {
            record_type: ALIGNMENT_PROOF_TYPE.to_string(),
            id: "apr-1".to_string(),
            uia: "urn:uia:test".to_string(),
            apa: "apa-test".to_string(),
            method: SEMANTIC_ENTAILMENT_V1.to_string(),
            evidence: Evidence {
                coverage,
                risk: 0.0,
            },
            proof: Proof::default(),
        }
    }

    fn vectors(dir: &Path, now: DateTime<Utc>) -> VectorSet {
        VectorSet {
            dir: dir.to_path_buf(),
            intent: intent("Summarize this text for an executive brief"),
            plan: plan(vec![generate("s1", "executive summary")], 0),
            pass_proof: proof(1.0),
            fail_proof: proof(0.2),
            expired_envelope: ExecutionEnvelope {
                record_type: ENVELOPE_TYPE.to_string(),
                id: "urn:ibe:expired".to_string(),
                uia_ref: "urn:uia:test".to_string(),
                apa_step_ref: "s1".to_string(),
                apr_ref: "apr-1".to_string(),
                tca_ref: "urn:tca:x".to_string(),
                nonce: "n-expired".to_string(),
                exp: now + Duration::hours(1),
                sig: String::new(),
            },
            capability: None,
        }
    }

    #[test]
    fn suite_passes_and_forces_expiry_into_the_past() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let report = run_at(&vectors(dir.path(), now), &GuardConfig::new("s"), now).unwrap();
        assert_eq!(report.total(), 3, "{:?}", report.cases);
        assert!(report.is_success(), "{:?}", report.cases);
    }

    #[test]
    fn matching_fail_vector_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let mut set = vectors(dir.path(), now);
        set.fail_proof = proof(1.0);
        let report = run_at(&set, &GuardConfig::new("s"), now).unwrap();
        assert_eq!(report.passed(), 2);
        let failed: Vec<_> = report.failures().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["apr_fail_low_coverage"]);
        assert!(report.cases[1].to_string().starts_with("[FAIL] apr_fail_low_coverage"));
    }

    #[test]
    fn emitted_golden_files_verify_in_the_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let set = vectors(dir.path(), now);
        let paths = emit_golden(&set, b"golden-secret", dir.path()).unwrap();
        assert_eq!(paths.len(), 3);

        let good = run_at(&set, &GuardConfig::new("golden-secret"), now).unwrap();
        assert_eq!(good.total(), 6);
        assert!(good.is_success(), "{:?}", good.cases);

        let bad = run_at(&set, &GuardConfig::new("other-secret"), now).unwrap();
        assert_eq!(bad.passed(), 3);
    }

    #[test]
    fn missing_vector_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = VectorSet::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConformanceError::Io { .. }));
    }
}
