// authorize.rs — Run the guard over an envelope and the records it references.

use std::path::PathBuf;

use clap::Args;

use ibe_attest::{AgentPlan, AlignmentProof, ExecutionEnvelope, IntentDeclaration, ToolCapability};
use ibe_guard::{Attestations, Guard, GuardConfig, GuardTrace, RevocationSnapshot};

use super::read_json;

#[derive(Args)]
pub struct AuthorizeArgs {
    /// Execution envelope (IBE) file.
    #[arg(long)]
    pub envelope: PathBuf,
    /// Alignment proof (APR) file.
    #[arg(long)]
    pub proof: PathBuf,
    /// Intent (UIA) file.
    #[arg(long)]
    pub intent: PathBuf,
    /// Plan (APA) file.
    #[arg(long)]
    pub plan: PathBuf,
    /// Capability (TCA) file.
    #[arg(long)]
    pub capability: PathBuf,
    /// Revocation registry snapshot to load before evaluating.
    #[arg(long)]
    pub revocations: Option<PathBuf>,
    /// Print the full evaluation trace as JSON.
    #[arg(long)]
    pub trace: bool,
}

pub fn execute(args: &AuthorizeArgs, config: &GuardConfig) -> anyhow::Result<()> {
    let trace = evaluate(args, config)?;
    if args.trace {
        println!("{}", serde_json::to_string_pretty(&trace)?);
    } else {
        println!("{}", trace.decision);
    }
    if let Some(reason) = trace.decision.deny_reason() {
        anyhow::bail!("Authorization denied: {}", reason);
    }
    Ok(())
}

fn evaluate(args: &AuthorizeArgs, config: &GuardConfig) -> anyhow::Result<GuardTrace> {
    let envelope: ExecutionEnvelope = read_json(&args.envelope)?;
    let proof: AlignmentProof = read_json(&args.proof)?;
    let intent: IntentDeclaration = read_json(&args.intent)?;
    let plan: AgentPlan = read_json(&args.plan)?;
    let capability: ToolCapability = read_json(&args.capability)?;

    let guard = Guard::new(config.clone());
    if let Some(path) = &args.revocations {
        let snapshot: RevocationSnapshot = read_json(path)?;
        guard.load_registry(snapshot);
    }

    let records = Attestations {
        proof: &proof,
        intent: &intent,
        plan: &plan,
        capability: &capability,
    };
    Ok(guard.authorize_with_trace(&envelope, records)?)
}
