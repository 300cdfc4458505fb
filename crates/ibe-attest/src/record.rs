// record.rs — The attestation record model.
//
// Five record types flow into an authorization decision:
//
//   IntentDeclaration (UIA)  — what the requester wants and the risk budget
//   AgentPlan (APA)          — the ordered tool calls proposed for that intent
//   AlignmentProof (APr)     — declared coverage/risk for the (UIA, APA) pair
//   ToolCapability (TCA)     — operator-issued bound on what a tool may do
//   ExecutionEnvelope (IBE)  — single-use, time-limited token for one step
//
// JSON field names are part of the interop contract (golden vectors are
// signed over them), so every struct pins its wire names with serde.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::tool::ToolKind;

/// `@type` discriminator of an intent declaration.
pub const INTENT_TYPE: &str = "UIA";
/// `@type` discriminator of an agent plan.
pub const PLAN_TYPE: &str = "APA";
/// `@type` discriminator of an alignment proof.
pub const ALIGNMENT_PROOF_TYPE: &str = "APr";
/// `@type` discriminator of an execution envelope.
pub const ENVELOPE_TYPE: &str = "IBE";

/// Accept `null` where a collection or object is expected.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// An embedded signature block.
///
/// `jws` holds the compact token; any other keys are carried through
/// untouched. Before signing or verifying, the whole block is cleared to `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jws: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Proof {
    /// A proof block holding just `token`.
    pub fn with_jws(token: impl Into<String>) -> Self {
        Self {
            jws: Some(token.into()),
            extra: Map::new(),
        }
    }

    /// The embedded token, if one is present. An empty string counts as absent.
    pub fn token(&self) -> Option<&str> {
        self.jws.as_deref().filter(|t| !t.is_empty())
    }
}

// ── Intent Declaration (UIA) ─────────────────────────────────────

/// The principal on whose behalf an intent is declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
}

/// Absolute upper bound on when the intent may be acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBound {
    pub not_after: DateTime<Utc>,
}

/// What data the intent allows to be touched, and until when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_classes: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jurisdictions: Vec<String>,

    pub time_window: TimeBound,
}

/// Upper bounds on a plan's predicted effects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskBudget {
    /// Coarse risk level label (informational).
    pub level: u32,
    pub max_writes: u32,
    pub max_records: u32,
    /// Zero means "not declared".
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_external_calls: u32,
}

/// A signed declaration of purpose, permitted data classes, and risk budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentDeclaration {
    #[serde(rename = "@type")]
    pub record_type: String,
    pub id: String,
    pub subject: Principal,
    pub purpose: String,
    pub constraints: Constraints,
    pub risk_budget: RiskBudget,
    pub policy_profile: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub proof: Proof,
}

impl IntentDeclaration {
    /// Whether `data_class` is among the permitted data classes.
    pub fn permits_data_class(&self, data_class: &str) -> bool {
        self.constraints.data_classes.iter().any(|c| c == data_class)
    }
}

// ── Agent Plan (APA) ─────────────────────────────────────────────

/// Fingerprint of the model / tool chain that produced a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vendor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    pub hash: String,
}

/// Effects a step expects to have.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExpected {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_classes: Vec<String>,
    pub writes: u32,
}

/// The planner's local alignment estimate for a step (informational only).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepAlignment {
    pub score: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub why: String,
}

/// One proposed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub tool: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Map<String, Value>,
    pub expected: StepExpected,
    #[serde(default)]
    pub alignment: StepAlignment,
}

impl PlanStep {
    /// The known tool this step calls, if any.
    pub fn kind(&self) -> Option<ToolKind> {
        ToolKind::from_name(&self.tool)
    }

    /// The lower-cased free-text argument alignment is judged on
    /// (prompt for generation, URL for fetch). `None` for unknown tools or
    /// when the argument is missing or not a string.
    pub fn alignment_text(&self) -> Option<String> {
        let kind = self.kind()?;
        self.args
            .get(kind.text_argument())
            .and_then(Value::as_str)
            .map(str::to_lowercase)
    }

    /// The raw `url` argument, whatever the tool.
    pub fn url_argument(&self) -> Option<&str> {
        self.args.get("url").and_then(Value::as_str)
    }
}

/// Plan-wide predicted totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTotals {
    pub predicted_writes: u32,
    pub predicted_records: u32,
}

/// An ordered sequence of tool calls proposed to satisfy an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPlan {
    #[serde(rename = "@type")]
    pub record_type: String,
    pub id: String,
    /// Id of the intent this plan serves.
    pub uia: String,
    pub model: ModelInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<PlanStep>,
    pub totals: PlanTotals,
    #[serde(default, deserialize_with = "null_as_default")]
    pub proof: Proof,
}

impl AgentPlan {
    /// Look up a step by id.
    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Number of steps that reach outside the process (fetches).
    pub fn external_calls(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.kind() == Some(ToolKind::Fetch))
            .count()
    }
}

// ── Alignment Proof (APr) ────────────────────────────────────────

/// Coverage and risk as produced by a scoring method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub coverage: f64,
    pub risk: f64,
}

/// Declared alignment evidence for an (intent, plan) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentProof {
    #[serde(rename = "@type")]
    pub record_type: String,
    pub id: String,
    pub uia: String,
    pub apa: String,
    /// Scoring method tag, e.g. `semantic-entailment-v1`.
    pub method: String,
    pub evidence: Evidence,
    #[serde(default, deserialize_with = "null_as_default")]
    pub proof: Proof,
}

// ── Tool Capability Attestation (TCA) ────────────────────────────

/// The maximum effect an operator attests an operation may have.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationEffects {
    pub writes: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_classes: Vec<String>,
    /// Destination substrings a `url` argument must contain. Empty = unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destinations: Vec<String>,
}

/// One named operation within a capability attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityOperation {
    pub name: String,
    pub effects: OperationEffects,
}

impl CapabilityOperation {
    /// Whether this operation restricts destinations at all.
    pub fn restricts_destinations(&self) -> bool {
        !self.effects.destinations.is_empty()
    }

    /// Whether `url` contains one of the allowed destinations.
    pub fn allows_destination(&self, url: &str) -> bool {
        self.effects
            .destinations
            .iter()
            .any(|d| url.contains(d.as_str()))
    }
}

/// Operator-issued bounds on what named tool operations may do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCapability {
    pub id: String,
    pub operator: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub operations: Vec<CapabilityOperation>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub proof: Proof,
}

impl ToolCapability {
    /// Find the operation declared for `tool`.
    pub fn operation(&self, tool: &str) -> Option<&CapabilityOperation> {
        self.operations.iter().find(|op| op.name == tool)
    }
}

// ── Execution Envelope (IBE) ─────────────────────────────────────

/// Single-use, time-limited authorization for one plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEnvelope {
    #[serde(rename = "@type")]
    pub record_type: String,
    pub id: String,
    pub uia_ref: String,
    pub apa_step_ref: String,
    pub apr_ref: String,
    pub tca_ref: String,
    pub nonce: String,
    pub exp: DateTime<Utc>,
    /// Compact token over the envelope with this field blanked.
    #[serde(default)]
    pub sig: String,
}

impl ExecutionEnvelope {
    /// Issue an unsigned envelope with a fresh id and nonce, valid for `ttl` from `now`.
    /// An expiry past the representable range saturates at the latest instant.
    pub fn issue(
        intent_id: impl Into<String>,
        step_id: impl Into<String>,
        proof_id: impl Into<String>,
        capability_id: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            record_type: ENVELOPE_TYPE.to_string(),
            id: format!("urn:ibe:{}", Uuid::new_v4()),
            uia_ref: intent_id.into(),
            apa_step_ref: step_id.into(),
            apr_ref: proof_id.into(),
            tca_ref: capability_id.into(),
            nonce: Uuid::new_v4().simple().to_string(),
            exp: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            sig: String::new(),
        }
    }

    /// Whether the envelope is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.exp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn intent_json() -> Value {
        json!({
            "@type": "UIA",
            "id": "urn:uia:1",
            "subject": {"id": "user:demo"},
            "purpose": "Summarize this text for an executive brief",
            "constraints": {
                "dataClasses": ["internal", "derived"],
                "timeWindow": {"notAfter": "2030-01-01T00:00:00Z"}
            },
            "riskBudget": {"level": 1, "maxWrites": 0, "maxRecords": 1000},
            "policyProfile": "research-readonly",
            "proof": {}
        })
    }

    #[test]
    fn intent_wire_names_are_preserved() {
        let intent: IntentDeclaration = serde_json::from_value(intent_json()).unwrap();
        assert_eq!(intent.record_type, "UIA");
        assert_eq!(intent.risk_budget.max_records, 1000);
        assert!(intent.permits_data_class("derived"));
        assert!(!intent.permits_data_class("pii"));

        let back = serde_json::to_value(&intent).unwrap();
        assert_eq!(back, intent_json());
    }

    #[test]
    fn null_proof_and_collections_deserialize_as_empty() {
        let mut raw = intent_json();
        raw["proof"] = Value::Null;
        raw["constraints"]["dataClasses"] = Value::Null;
        let intent: IntentDeclaration = serde_json::from_value(raw).unwrap();
        assert_eq!(intent.proof, Proof::default());
        assert!(intent.constraints.data_classes.is_empty());
    }

    #[test]
    fn proof_keeps_extra_keys_and_treats_empty_token_as_absent() {
        let proof: Proof =
            serde_json::from_value(json!({"jws": "", "type": "hs256"})).unwrap();
        assert_eq!(proof.token(), None);
        assert_eq!(proof.extra.get("type"), Some(&json!("hs256")));
        assert_eq!(Proof::with_jws("a.b.c").token(), Some("a.b.c"));
        assert_eq!(serde_json::to_value(Proof::default()).unwrap(), json!({}));
    }

    #[test]
    fn step_alignment_text_follows_tool() {
        let step: PlanStep = serde_json::from_value(json!({
            "id": "s1",
            "tool": "ollama.generate",
            "args": {"prompt": "Executive SUMMARY please", "url": "https://x"},
            "expected": {"dataClasses": ["derived"], "writes": 0}
        }))
        .unwrap();
        assert_eq!(
            step.alignment_text().as_deref(),
            Some("executive summary please")
        );
        assert_eq!(step.url_argument(), Some("https://x"));

        let unknown = PlanStep {
            tool: "shell.exec".to_string(),
            ..step
        };
        assert_eq!(unknown.alignment_text(), None);
    }

    #[test]
    fn capability_destinations() {
        let op = CapabilityOperation {
            name: "http.get".to_string(),
            effects: OperationEffects {
                writes: 0,
                data_classes: vec![],
                destinations: vec!["example.com".to_string()],
            },
        };
        assert!(op.restricts_destinations());
        assert!(op.allows_destination("https://api.example.com/v1"));
        assert!(!op.allows_destination("https://evil.test/"));

        let serialized = serde_json::to_value(&CapabilityOperation {
            effects: OperationEffects::default(),
            ..op
        })
        .unwrap();
        assert!(serialized["effects"].get("destinations").is_none());
    }

    #[test]
    fn issued_envelope_is_fresh_and_unsigned() {
        let now = Utc::now();
        let a = ExecutionEnvelope::issue("u", "s1", "p", "t", now, Duration::minutes(2));
        let b = ExecutionEnvelope::issue("u", "s1", "p", "t", now, Duration::minutes(2));
        assert_eq!(a.record_type, "IBE");
        assert!(a.id.starts_with("urn:ibe:"));
        assert_ne!(a.nonce, b.nonce);
        assert!(a.sig.is_empty());
        assert!(!a.is_expired_at(now));
        assert!(a.is_expired_at(now + Duration::minutes(3)));
    }

    #[test]
    fn oversized_ttl_saturates_instead_of_overflowing() {
        let now = Utc::now();
        let env = ExecutionEnvelope::issue("u", "s1", "p", "t", now, Duration::MAX);
        assert_eq!(env.exp, DateTime::<Utc>::MAX_UTC);
        assert!(!env.is_expired_at(now));
    }

    #[test]
    fn envelope_wire_names() {
        let env = ExecutionEnvelope::issue(
            "urn:uia:1",
            "s1",
            "apr-1",
            "urn:tca:x",
            Utc::now(),
            Duration::minutes(1),
        );
        let value = serde_json::to_value(&env).unwrap();
        for key in ["@type", "uiaRef", "apaStepRef", "aprRef", "tcaRef", "nonce", "exp", "sig"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
    }
}
