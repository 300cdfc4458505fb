// decision.rs — Authorization outcomes and the per-stage evaluation trace.

use std::fmt;

use serde::{Deserialize, Serialize};

use ibe_attest::Evidence;

/// Why an authorization was denied.
///
/// Serialized as stable string tags; callers surface them verbatim.
/// [`DenyReason::as_tag`] is the one place those tags are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum DenyReason {
    /// The envelope is past its expiry.
    Expired,
    /// The envelope nonce was already consumed inside the replay window.
    Replay,
    /// The envelope signature is missing or does not verify.
    SignatureInvalid,
    IntentSignatureInvalid,
    PlanSignatureInvalid,
    ProofSignatureInvalid,
    /// Declared alignment evidence does not reproduce.
    EvidenceMismatch,
    /// Recomputed coverage is under the configured minimum.
    AlignmentBelowThreshold,
    IntentRevoked,
    PlanRevoked,
    WritesExceeded,
    RecordsExceeded,
    /// The envelope names a step the plan does not contain.
    StepNotFound,
    DataClassNotPermitted,
    /// The capability declares no operation for the step's tool.
    OperationNotAllowed,
    CapabilitySignatureInvalid,
    /// The step expects more writes than the operation allows.
    EffectsExceeded,
    DestinationNotAllowed,
    /// Tool arguments fail their schema, or the tool has none.
    InputSchemaInvalid,

    // Only produced when the matching `Strictness` flag is on.
    /// The intent's time window has closed.
    IntentExpired,
    /// Envelope or record cross-references disagree.
    ReferenceMismatch,
    /// The revocation registry has lapsed.
    RegistryStale,
    ExternalCallsExceeded,
}

impl DenyReason {
    /// Every reason, base pipeline first, then the strict-only ones.
    pub const ALL: [DenyReason; 23] = [
        Self::Expired,
        Self::Replay,
        Self::SignatureInvalid,
        Self::IntentSignatureInvalid,
        Self::PlanSignatureInvalid,
        Self::ProofSignatureInvalid,
        Self::EvidenceMismatch,
        Self::AlignmentBelowThreshold,
        Self::IntentRevoked,
        Self::PlanRevoked,
        Self::WritesExceeded,
        Self::RecordsExceeded,
        Self::StepNotFound,
        Self::DataClassNotPermitted,
        Self::OperationNotAllowed,
        Self::CapabilitySignatureInvalid,
        Self::EffectsExceeded,
        Self::DestinationNotAllowed,
        Self::InputSchemaInvalid,
        Self::IntentExpired,
        Self::ReferenceMismatch,
        Self::RegistryStale,
        Self::ExternalCallsExceeded,
    ];

    /// Parse a stable string tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_tag() == tag)
    }

    /// The stable string tag.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Expired => "EXPIRED",
            Self::Replay => "REPLAY",
            Self::SignatureInvalid => "SIG-INVALID",
            Self::IntentSignatureInvalid => "UIA-SIG-INVALID",
            Self::PlanSignatureInvalid => "APA-SIG-INVALID",
            Self::ProofSignatureInvalid => "APR-SIG-INVALID",
            Self::EvidenceMismatch => "EVIDENCE-MISMATCH",
            Self::AlignmentBelowThreshold => "ALIGN-BELOW-THRESHOLD",
            Self::IntentRevoked => "UIA-REVOKED",
            Self::PlanRevoked => "APA-REVOKED",
            Self::WritesExceeded => "RISK-WRITES-EXCEEDED",
            Self::RecordsExceeded => "RISK-RECORDS-EXCEEDED",
            Self::StepNotFound => "STEP-NOT-FOUND",
            Self::DataClassNotPermitted => "DATA-CLASS-NOT-PERMITTED",
            Self::OperationNotAllowed => "TCA-OP-NOT-ALLOWED",
            Self::CapabilitySignatureInvalid => "TCA-SIG-INVALID",
            Self::EffectsExceeded => "TCA-EFFECTS-EXCEEDED",
            Self::DestinationNotAllowed => "DESTINATION-NOT-ALLOWED",
            Self::InputSchemaInvalid => "INPUT-SCHEMA-INVALID",
            Self::IntentExpired => "UIA-EXPIRED",
            Self::ReferenceMismatch => "REFERENCE-MISMATCH",
            Self::RegistryStale => "REVOCATION-REGISTRY-STALE",
            Self::ExternalCallsExceeded => "RISK-EXTERNAL-CALLS-EXCEEDED",
        }
    }
}

impl From<DenyReason> for &'static str {
    fn from(reason: DenyReason) -> Self {
        reason.as_tag()
    }
}

impl TryFrom<String> for DenyReason {
    type Error = String;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        Self::from_tag(&tag).ok_or_else(|| format!("unknown deny reason '{}'", tag))
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// The result of authorizing one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Every stage passed. The caller may invoke the tool.
    Allow,
    /// A stage failed. The caller must not invoke the tool.
    Deny { reason: DenyReason },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The deny reason, if denied.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow => None,
            Self::Deny { reason } => Some(*reason),
        }
    }
}

impl From<DenyReason> for Decision {
    fn from(reason: DenyReason) -> Self {
        Self::Deny { reason }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("ALLOW"),
            Self::Deny { reason } => write!(f, "DENY {}", reason),
        }
    }
}

/// Pipeline stages, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Expiry,
    Replay,
    EnvelopeSignature,
    AttestationSignatures,
    ReferenceBinding,
    AlignmentEvidence,
    AlignmentThreshold,
    Revocation,
    RiskBudget,
    StepResolution,
    DataClass,
    Capability,
    EffectBound,
    Destination,
    ArgumentSchema,
}

/// What happened at one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStep {
    pub stage: Stage,
    /// "passed", "skipped: ..." or "failed: ...".
    pub outcome: String,
    /// Whether evaluation stopped here.
    pub terminal: bool,
}

/// A decision together with the stages that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardTrace {
    pub decision: Decision,
    /// Stages evaluated, in order. The last is terminal on deny.
    pub stages: Vec<EvaluationStep>,
    /// Recomputed evidence, when evaluation got that far.
    pub alignment: Option<Evidence>,
    /// Lowercase hex SHA-256 of the envelope's canonical JSON.
    pub envelope_digest: String,
}

impl GuardTrace {
    /// The stage that ended evaluation with a denial.
    pub fn terminal_stage(&self) -> Option<Stage> {
        self.stages.iter().find(|s| s.terminal).map(|s| s.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_lists_every_variant_once() {
        // Exhaustive: a new variant fails to compile here until ALL is updated.
        let position = |reason: DenyReason| match reason {
            DenyReason::Expired => 0,
            DenyReason::Replay => 1,
            DenyReason::SignatureInvalid => 2,
            DenyReason::IntentSignatureInvalid => 3,
            DenyReason::PlanSignatureInvalid => 4,
            DenyReason::ProofSignatureInvalid => 5,
            DenyReason::EvidenceMismatch => 6,
            DenyReason::AlignmentBelowThreshold => 7,
            DenyReason::IntentRevoked => 8,
            DenyReason::PlanRevoked => 9,
            DenyReason::WritesExceeded => 10,
            DenyReason::RecordsExceeded => 11,
            DenyReason::StepNotFound => 12,
            DenyReason::DataClassNotPermitted => 13,
            DenyReason::OperationNotAllowed => 14,
            DenyReason::CapabilitySignatureInvalid => 15,
            DenyReason::EffectsExceeded => 16,
            DenyReason::DestinationNotAllowed => 17,
            DenyReason::InputSchemaInvalid => 18,
            DenyReason::IntentExpired => 19,
            DenyReason::ReferenceMismatch => 20,
            DenyReason::RegistryStale => 21,
            DenyReason::ExternalCallsExceeded => 22,
        };
        for (i, reason) in DenyReason::ALL.into_iter().enumerate() {
            assert_eq!(position(reason), i, "{:?} out of place", reason);
        }
        let tags: std::collections::HashSet<_> =
            DenyReason::ALL.iter().map(|r| r.as_tag()).collect();
        assert_eq!(tags.len(), DenyReason::ALL.len());
    }

    #[test]
    fn serde_uses_the_tag() {
        for reason in DenyReason::ALL {
            let json = serde_json::to_value(reason).unwrap();
            assert_eq!(json, serde_json::Value::String(reason.as_tag().to_string()));
            let back: DenyReason = serde_json::from_value(json).unwrap();
            assert_eq!(back, reason);
        }
        assert_eq!(
            serde_json::from_str::<DenyReason>(r#""REPLAY""#).unwrap(),
            DenyReason::Replay
        );
        assert!(serde_json::from_str::<DenyReason>(r#""NOT-A-TAG""#).is_err());
    }

    #[test]
    fn decision_serialization() {
        let allow = serde_json::to_value(Decision::Allow).unwrap();
        assert_eq!(allow, serde_json::json!({"decision": "allow"}));

        let deny = serde_json::to_value(Decision::from(DenyReason::Replay)).unwrap();
        assert_eq!(deny, serde_json::json!({"decision": "deny", "reason": "REPLAY"}));
    }

    #[test]
    fn decision_display_and_accessors() {
        let deny = Decision::from(DenyReason::InputSchemaInvalid);
        assert_eq!(deny.to_string(), "DENY INPUT-SCHEMA-INVALID");
        assert_eq!(deny.deny_reason(), Some(DenyReason::InputSchemaInvalid));
        assert!(!deny.is_allowed());
        assert!(Decision::Allow.is_allowed());
        assert_eq!(Decision::Allow.to_string(), "ALLOW");
    }
}
