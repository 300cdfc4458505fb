//! # ibe-cli
//!
//! Command-line interface for Intent-Bound Execution.
//!
//! - `ibe vectors check/emit-golden` — run or regenerate conformance vectors
//! - `ibe seal/verify <kind> <file>` — sign a record file or check its signature
//! - `ibe issue` — mint a signed execution envelope for one plan step
//! - `ibe authorize` — run the guard over an envelope and its records

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Intent-Bound Execution CLI — sign attestations and authorize tool calls.
#[derive(Parser)]
#[command(name = "ibe", version, about)]
struct Cli {
    /// Guard config file (TOML). Built-in defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "guard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run or regenerate the conformance test vectors.
    Vectors {
        #[command(subcommand)]
        command: commands::vectors::VectorsCommands,
    },
    /// Sign a record file, replacing any existing signature.
    Seal {
        /// Record type of the file.
        kind: commands::seal::RecordKind,
        /// JSON file holding the record.
        file: PathBuf,
        /// Write the signed record here instead of overwriting the input.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check the signature embedded in a record file.
    Verify {
        /// Record type of the file.
        kind: commands::seal::RecordKind,
        /// JSON file holding the record.
        file: PathBuf,
    },
    /// Mint a signed execution envelope for one plan step.
    Issue(commands::issue::IssueArgs),
    /// Authorize an envelope against its intent, plan, proof and capability.
    Authorize(commands::authorize::AuthorizeArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so decisions and JSON on stdout stay machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ibe_guard=info".parse()?)
                .add_directive("ibe_cli=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = commands::load_guard_config(&cli.config)?;

    match &cli.command {
        Commands::Vectors { command } => commands::vectors::execute(command, &config),
        Commands::Seal { kind, file, output } => {
            commands::seal::seal(*kind, file, output.as_deref(), &config)
        }
        Commands::Verify { kind, file } => commands::seal::verify(*kind, file, &config),
        Commands::Issue(args) => commands::issue::execute(args, &config),
        Commands::Authorize(args) => commands::authorize::execute(args, &config),
    }
}
