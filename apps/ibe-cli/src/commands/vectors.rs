// vectors.rs — Conformance subcommands: check, emit-golden.

use std::path::PathBuf;

use clap::Subcommand;
use ibe_guard::conformance::{self, VectorSet};
use ibe_guard::GuardConfig;

#[derive(Subcommand)]
pub enum VectorsCommands {
    /// Run the conformance cases against a vector directory.
    Check {
        /// Directory holding the test vectors.
        #[arg(long, default_value = "test-vectors")]
        dir: PathBuf,
    },
    /// Sign the intent, plan and pass proof and write golden files.
    EmitGolden {
        /// Directory holding the test vectors.
        #[arg(long, default_value = "test-vectors")]
        dir: PathBuf,
        /// Output directory (defaults to the vector directory).
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub fn execute(cmd: &VectorsCommands, config: &GuardConfig) -> anyhow::Result<()> {
    match cmd {
        VectorsCommands::Check { dir } => {
            let vectors = VectorSet::load(dir)?;
            let report = conformance::run(&vectors, config)?;
            for case in &report.cases {
                println!("{}", case);
            }
            println!();
            println!("Summary: {}/{} passed", report.passed(), report.total());
            if !report.is_success() {
                anyhow::bail!(
                    "{} conformance case(s) failed",
                    report.total() - report.passed()
                );
            }
            Ok(())
        }
        VectorsCommands::EmitGolden { dir, out } => {
            let vectors = VectorSet::load(dir)?;
            let out = out.as_deref().unwrap_or(dir);
            let written = conformance::emit_golden(&vectors, config.secret.as_bytes(), out)?;
            for path in written {
                println!("Wrote {}", path.display());
            }
            Ok(())
        }
    }
}
