// concurrency.rs — One guard shared across threads.
//
// The replay cache is the only thing standing between a leaked envelope and
// repeated execution, so concurrent callers presenting the same nonce must
// see exactly one Allow. Registry replacement while requests are in flight
// must never produce a torn read.

use std::collections::HashMap;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};
use serde_json::json;

use ibe_attest::record::{ALIGNMENT_PROOF_TYPE, INTENT_TYPE, PLAN_TYPE};
use ibe_attest::{
    AgentPlan, AlignmentProof, Attestation, CapabilityOperation, Constraints, Evidence,
    ExecutionEnvelope, IntentDeclaration, ModelInfo, OperationEffects, PlanStep, PlanTotals,
    Principal, Proof, RiskBudget, StepAlignment, StepExpected, TimeBound, ToolCapability,
};
use ibe_guard::{Decision, DenyReason, Guard, GuardConfig};

const SECRET: &[u8] = b"concurrency-secret";
const THREADS: usize = 16;

struct Records {
    intent: IntentDeclaration,
    plan: AgentPlan,
    proof: AlignmentProof,
    capability: ToolCapability,
}

fn records() -> Records {
    let mut intent = IntentDeclaration {
        record_type: INTENT_TYPE.to_string(),
        id: "urn:uia:concurrent".to_string(),
        subject: Principal {
            id: "user:demo".to_string(),
        },
        purpose: "Summarize this text for an executive brief".to_string(),
        constraints: Constraints {
            data_classes: vec!["derived".to_string()],
            jurisdictions: vec![],
            time_window: TimeBound {
                not_after: Utc::now() + Duration::days(1),
            },
        },
        risk_budget: RiskBudget {
            level: 1,
            max_writes: 0,
            max_records: 100,
            max_external_calls: 0,
        },
        policy_profile: "research-readonly".to_string(),
        proof: Proof::default(),
    };
    let mut plan = AgentPlan {
        record_type: PLAN_TYPE.to_string(),
        id: "urn:apa:concurrent".to_string(),
        uia: intent.id.clone(),
        model: ModelInfo {
            hash: "sha256:demo".to_string(),
            ..ModelInfo::default()
        },
        steps: vec![PlanStep {
            id: "s1".to_string(),
            tool: "ollama.generate".to_string(),
            args: json!({"prompt": "executive summary"})
                .as_object()
                .cloned()
                .unwrap(),
            expected: StepExpected {
                data_classes: vec!["derived".to_string()],
                writes: 0,
            },
            alignment: StepAlignment::default(),
        }],
        totals: PlanTotals {
            predicted_writes: 0,
            predicted_records: 1,
        },
        proof: Proof::default(),
    };
    let mut proof = AlignmentProof {
        record_type: ALIGNMENT_PROOF_TYPE.to_string(),
        id: "urn:apr:concurrent".to_string(),
        uia: intent.id.clone(),
        apa: plan.id.clone(),
        method: "semantic-entailment-v1".to_string(),
        evidence: Evidence {
            coverage: 1.0,
            risk: 0.0,
        },
        proof: Proof::default(),
    };
    let mut capability = ToolCapability {
        id: "urn:tca:concurrent".to_string(),
        operator: "ops".to_string(),
        operations: vec![CapabilityOperation {
            name: "ollama.generate".to_string(),
            effects: OperationEffects::default(),
        }],
        proof: Proof::default(),
    };
    intent.seal(SECRET).unwrap();
    plan.seal(SECRET).unwrap();
    proof.seal(SECRET).unwrap();
    capability.seal(SECRET).unwrap();
    Records {
        intent,
        plan,
        proof,
        capability,
    }
}

fn envelope(records: &Records) -> ExecutionEnvelope {
    let mut envelope = ExecutionEnvelope::issue(
        &records.intent.id,
        "s1",
        &records.proof.id,
        &records.capability.id,
        Utc::now(),
        Duration::minutes(5),
    );
    envelope.seal(SECRET).unwrap();
    envelope
}

#[test]
fn same_nonce_is_allowed_exactly_once_across_threads() {
    let guard = Arc::new(Guard::new(GuardConfig::new(SECRET)));
    let records = Arc::new(records());
    let envelope = Arc::new(envelope(&records));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let guard = Arc::clone(&guard);
            let records = Arc::clone(&records);
            let envelope = Arc::clone(&envelope);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                guard
                    .authorize(
                        &envelope,
                        &records.proof,
                        &records.intent,
                        &records.plan,
                        &records.capability,
                    )
                    .unwrap()
            })
        })
        .collect();

    let decisions: Vec<Decision> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let allowed = decisions.iter().filter(|d| d.is_allowed()).count();
    let replays = decisions
        .iter()
        .filter(|d| d.deny_reason() == Some(DenyReason::Replay))
        .count();
    assert_eq!(allowed, 1);
    assert_eq!(replays, THREADS - 1);
}

#[test]
fn distinct_nonces_are_all_allowed_concurrently() {
    let guard = Arc::new(Guard::new(GuardConfig::new(SECRET)));
    let records = Arc::new(records());

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let guard = Arc::clone(&guard);
            let records = Arc::clone(&records);
            thread::spawn(move || {
                let envelope = envelope(&records);
                guard
                    .authorize(
                        &envelope,
                        &records.proof,
                        &records.intent,
                        &records.plan,
                        &records.capability,
                    )
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Decision::Allow);
    }
    assert_eq!(guard.replay_cache().len(), THREADS);
}

#[test]
fn registry_swaps_during_authorization_are_consistent() {
    let guard = Arc::new(Guard::new(GuardConfig::new(SECRET)));
    let records = Arc::new(records());
    let revoked: HashMap<String, String> =
        [(records.intent.id.clone(), "withdrawn".to_string())].into();

    let writer = {
        let guard = Arc::clone(&guard);
        thread::spawn(move || {
            for i in 0..200 {
                let now = Utc::now();
                let ids = if i % 2 == 0 {
                    revoked.clone()
                } else {
                    HashMap::new()
                };
                guard.set_registry(now, now + Duration::hours(1), ids);
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let guard = Arc::clone(&guard);
            let records = Arc::clone(&records);
            thread::spawn(move || {
                for _ in 0..50 {
                    let decision = guard
                        .authorize(
                            &envelope(&records),
                            &records.proof,
                            &records.intent,
                            &records.plan,
                            &records.capability,
                        )
                        .unwrap();
                    assert!(
                        decision == Decision::Allow
                            || decision.deny_reason() == Some(DenyReason::IntentRevoked),
                        "unexpected {:?}",
                        decision
                    );
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}
