// seal.rs — Sign record files and check their embedded signatures.

use std::path::Path;

use clap::ValueEnum;
use serde::de::DeserializeOwned;

use ibe_attest::canonical::canonical_string;
use ibe_attest::jws;
use ibe_attest::{
    AgentPlan, AlignmentProof, Attestation, ExecutionEnvelope, IntentDeclaration,
    SignatureStatus, ToolCapability,
};
use ibe_guard::GuardConfig;

use super::{read_json, write_json};

/// Record type of a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordKind {
    /// User Intent Attestation.
    Uia,
    /// Agent Plan Attestation.
    Apa,
    /// Alignment Proof.
    Apr,
    /// Tool Capability Attestation.
    Tca,
    /// Execution Envelope.
    Ibe,
}

pub fn seal(
    kind: RecordKind,
    file: &Path,
    output: Option<&Path>,
    config: &GuardConfig,
) -> anyhow::Result<()> {
    let out = output.unwrap_or(file);
    let secret = config.secret.as_bytes();
    let id = match kind {
        RecordKind::Uia => seal_file::<IntentDeclaration>(file, out, secret)?,
        RecordKind::Apa => seal_file::<AgentPlan>(file, out, secret)?,
        RecordKind::Apr => seal_file::<AlignmentProof>(file, out, secret)?,
        RecordKind::Tca => seal_file::<ToolCapability>(file, out, secret)?,
        RecordKind::Ibe => seal_file::<ExecutionEnvelope>(file, out, secret)?,
    };
    println!("Sealed {} -> {}", id, out.display());
    Ok(())
}

pub fn verify(kind: RecordKind, file: &Path, config: &GuardConfig) -> anyhow::Result<()> {
    let secret = config.secret.as_bytes();
    let (id, status, detail) = match kind {
        RecordKind::Uia => check_file::<IntentDeclaration>(file, secret)?,
        RecordKind::Apa => check_file::<AgentPlan>(file, secret)?,
        RecordKind::Apr => check_file::<AlignmentProof>(file, secret)?,
        RecordKind::Tca => check_file::<ToolCapability>(file, secret)?,
        RecordKind::Ibe => check_file::<ExecutionEnvelope>(file, secret)?,
    };
    match status {
        SignatureStatus::Valid => {
            println!("{}: signature valid", id);
            Ok(())
        }
        SignatureStatus::Unsigned => anyhow::bail!("{} carries no signature", id),
        SignatureStatus::Invalid => {
            anyhow::bail!("{}: signature does not verify ({})", id, detail)
        }
    }
}

fn seal_file<T: Attestation + DeserializeOwned>(
    file: &Path,
    out: &Path,
    secret: &[u8],
) -> anyhow::Result<String> {
    let mut record: T = read_json(file)?;
    record.seal(secret)?;
    write_json(out, &record)?;
    Ok(record.record_id().to_string())
}

fn check_file<T: Attestation + DeserializeOwned>(
    file: &Path,
    secret: &[u8],
) -> anyhow::Result<(String, SignatureStatus, String)> {
    let record: T = read_json(file)?;
    let status = record.verify_signature(secret)?;
    let detail = match status {
        SignatureStatus::Invalid => explain_invalid(&record)?,
        _ => String::new(),
    };
    Ok((record.record_id().to_string(), status, detail))
}

/// Say whether the token covers a different record or the key is wrong.
fn explain_invalid<T: Attestation>(record: &T) -> anyhow::Result<String> {
    let Some(token) = record.signature() else {
        return Ok("no token".to_string());
    };
    let payload = match jws::decode_payload(token) {
        Ok(payload) => payload,
        Err(err) => return Ok(err.to_string()),
    };
    if canonical_string(&payload)? == canonical_string(&record.unsigned())? {
        return Ok("token covers this record; signed with a different secret".to_string());
    }
    let signed_id = payload
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("<no id>");
    Ok(format!(
        "token covers a different version of record '{}'",
        signed_id
    ))
}
