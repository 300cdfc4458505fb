// conformance_vectors.rs — Runs the shipped test vectors under test-vectors/.

use std::path::PathBuf;

use ibe_attest::{Attestation, SignatureStatus};
use ibe_guard::conformance::{self, VectorSet, GOLDEN_INTENT, GOLDEN_PLAN, GOLDEN_PROOF};
use ibe_guard::{Decision, DenyReason, Guard, GuardConfig};

const DEV_SECRET: &[u8] = b"dev-secret-change-me";

fn vector_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../test-vectors")
}

#[test]
fn shipped_vectors_conform() {
    let vectors = VectorSet::load(&vector_dir()).unwrap();
    let report = conformance::run(&vectors, &GuardConfig::new(DEV_SECRET)).unwrap();
    for case in &report.cases {
        println!("{}", case);
    }
    assert!(report.total() >= 3);
    assert!(report.is_success());
}

#[test]
fn pass_vector_is_authorized_end_to_end() {
    let vectors = VectorSet::load(&vector_dir()).unwrap();
    let capability = vectors.capability.clone().unwrap();
    let guard = Guard::new(GuardConfig::new(DEV_SECRET));

    let mut envelope = ibe_attest::ExecutionEnvelope::issue(
        &vectors.intent.id,
        "s1",
        &vectors.pass_proof.id,
        &capability.id,
        chrono::Utc::now(),
        chrono::Duration::minutes(2),
    );
    envelope.seal(DEV_SECRET).unwrap();

    let decision = guard
        .authorize(
            &envelope,
            &vectors.pass_proof,
            &vectors.intent,
            &vectors.plan,
            &capability,
        )
        .unwrap();
    assert_eq!(decision, Decision::Allow);

    let mut envelope = envelope.clone();
    envelope.nonce = "fresh-nonce".to_string();
    envelope.seal(DEV_SECRET).unwrap();
    let decision = guard
        .authorize(
            &envelope,
            &vectors.fail_proof,
            &vectors.intent,
            &vectors.plan,
            &capability,
        )
        .unwrap();
    assert_eq!(decision, Decision::from(DenyReason::EvidenceMismatch));
}

#[test]
fn golden_emission_round_trips() {
    let vectors = VectorSet::load(&vector_dir()).unwrap();
    let out = tempfile::tempdir().unwrap();
    let written = conformance::emit_golden(&vectors, DEV_SECRET, out.path()).unwrap();
    assert_eq!(written.len(), 3);

    let intent: ibe_attest::IntentDeclaration =
        serde_json::from_slice(&std::fs::read(out.path().join(GOLDEN_INTENT)).unwrap()).unwrap();
    let plan: ibe_attest::AgentPlan =
        serde_json::from_slice(&std::fs::read(out.path().join(GOLDEN_PLAN)).unwrap()).unwrap();
    let proof: ibe_attest::AlignmentProof =
        serde_json::from_slice(&std::fs::read(out.path().join(GOLDEN_PROOF)).unwrap()).unwrap();

    assert_eq!(intent.verify_signature(DEV_SECRET).unwrap(), SignatureStatus::Valid);
    assert_eq!(plan.verify_signature(DEV_SECRET).unwrap(), SignatureStatus::Valid);
    assert_eq!(proof.verify_signature(DEV_SECRET).unwrap(), SignatureStatus::Valid);
    assert_eq!(
        intent.verify_signature(b"wrong").unwrap(),
        SignatureStatus::Invalid
    );

    // The signed records differ from the vectors only in their proof block.
    assert_eq!(intent.unsigned(), vectors.intent.unsigned());
}
