// issue.rs — Mint a signed execution envelope for one plan step.

use std::path::PathBuf;

use chrono::{Duration, Utc};
use clap::Args;

use ibe_attest::{Attestation, ExecutionEnvelope};
use ibe_guard::GuardConfig;

use super::write_json;

#[derive(Args)]
pub struct IssueArgs {
    /// Intent (UIA) id the envelope is bound to.
    #[arg(long)]
    pub uia: String,
    /// Plan step id to authorize.
    #[arg(long)]
    pub step: String,
    /// Alignment proof (APR) id.
    #[arg(long)]
    pub apr: String,
    /// Capability (TCA) id.
    #[arg(long)]
    pub tca: String,
    /// Envelope lifetime in seconds.
    #[arg(long, default_value = "120")]
    pub ttl_secs: i64,
    /// Write the envelope here instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

pub fn execute(args: &IssueArgs, config: &GuardConfig) -> anyhow::Result<()> {
    let envelope = issue(args, config)?;
    match &args.output {
        Some(path) => {
            write_json(path, &envelope)?;
            println!("Issued {} -> {}", envelope.id, path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&envelope)?),
    }
    Ok(())
}

fn issue(args: &IssueArgs, config: &GuardConfig) -> anyhow::Result<ExecutionEnvelope> {
    if args.ttl_secs <= 0 {
        anyhow::bail!("--ttl-secs must be positive, got {}", args.ttl_secs);
    }
    let now = Utc::now();
    let Some(ttl) = Duration::try_seconds(args.ttl_secs)
        .filter(|ttl| now.checked_add_signed(*ttl).is_some())
    else {
        anyhow::bail!("--ttl-secs {} is out of range", args.ttl_secs);
    };
    let mut envelope =
        ExecutionEnvelope::issue(&args.uia, &args.step, &args.apr, &args.tca, now, ttl);
    envelope.seal(config.secret.as_bytes())?;
    tracing::info!(
        id = %envelope.id,
        step = %envelope.apa_step_ref,
        exp = %envelope.exp,
        "issued envelope"
    );
    Ok(envelope)
}
