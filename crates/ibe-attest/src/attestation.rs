// attestation.rs — Sealing and checking the signature embedded in a record.
//
// Every signable record follows the same rule: clear its own signature field,
// canonicalize, then sign or verify. Keeping that rule in one trait method
// (`unsigned`) is what guarantees sign and verify see identical bytes.

use serde::Serialize;

use crate::error::AttestError;
use crate::jws;
use crate::record::{
    AgentPlan, AlignmentProof, ExecutionEnvelope, IntentDeclaration, Proof, ToolCapability,
};

/// Outcome of checking a record's embedded signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    /// The record carries no signature.
    Unsigned,
    /// The signature verifies against the record.
    Valid,
    /// A signature is present but does not verify.
    Invalid,
}

/// A record that can carry an embedded signature over itself.
pub trait Attestation: Serialize + Clone {
    /// Short record kind used in logs and deny tags (e.g. "UIA").
    const KIND: &'static str;

    /// The record's id.
    fn record_id(&self) -> &str;

    /// The embedded token, if any.
    fn signature(&self) -> Option<&str>;

    /// Store `token` as the embedded signature.
    fn set_signature(&mut self, token: String);

    /// Blank the signature field the way signing expects.
    fn clear_signature(&mut self);

    /// A copy of the record with its signature field cleared.
    fn unsigned(&self) -> Self {
        let mut copy = self.clone();
        copy.clear_signature();
        copy
    }

    /// Sign the record in place, replacing any previous signature.
    fn seal(&mut self, secret: &[u8]) -> Result<(), AttestError> {
        let token = jws::sign(secret, &self.unsigned())?;
        self.set_signature(token);
        tracing::debug!(kind = Self::KIND, id = self.record_id(), "sealed record");
        Ok(())
    }

    /// Check the embedded signature.
    fn verify_signature(&self, secret: &[u8]) -> Result<SignatureStatus, AttestError> {
        let Some(token) = self.signature() else {
            return Ok(SignatureStatus::Unsigned);
        };
        if jws::verify(secret, &self.unsigned(), token)? {
            Ok(SignatureStatus::Valid)
        } else {
            Ok(SignatureStatus::Invalid)
        }
    }
}

macro_rules! proof_bearing {
    ($ty:ty, $kind:literal) => {
        impl Attestation for $ty {
            const KIND: &'static str = $kind;

            fn record_id(&self) -> &str {
                &self.id
            }

            fn signature(&self) -> Option<&str> {
                self.proof.token()
            }

            fn set_signature(&mut self, token: String) {
                self.proof.jws = Some(token);
            }

            fn clear_signature(&mut self) {
                self.proof = Proof::default();
            }
        }
    };
}

proof_bearing!(IntentDeclaration, "UIA");
proof_bearing!(AgentPlan, "APA");
proof_bearing!(AlignmentProof, "APR");
proof_bearing!(ToolCapability, "TCA");

impl Attestation for ExecutionEnvelope {
    const KIND: &'static str = "IBE";

    fn record_id(&self) -> &str {
        &self.id
    }

    fn signature(&self) -> Option<&str> {
        Some(self.sig.as_str()).filter(|s| !s.is_empty())
    }

    fn set_signature(&mut self, token: String) {
        self.sig = token;
    }

    fn clear_signature(&mut self) {
        self.sig.clear();
    }
}
