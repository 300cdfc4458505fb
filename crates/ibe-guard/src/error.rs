// error.rs — Error types for the guard, its configuration, and the conformance suite.
//
// A denial is never an error: `Guard::authorize` returns denials as values.
// `GuardError` only covers records that cannot be canonicalized, which is a
// bug in the caller rather than a security decision.

use std::path::PathBuf;
use thiserror::Error;

use ibe_attest::AttestError;

/// Errors that can occur while evaluating an authorization request.
#[derive(Debug, Error)]
pub enum GuardError {
    /// A record could not be canonicalized for signature checks.
    #[error("attestation encoding failed: {0}")]
    Attest(#[from] AttestError),
}

/// Errors that can occur while loading guard configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read guard config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid TOML for `GuardSettings`.
    #[error("invalid guard config: {0}")]
    Parse(#[from] toml::de::Error),

    /// `min_alignment` must be a finite value in [0, 1].
    #[error("min_alignment must be within [0, 1], got {value}")]
    InvalidMinAlignment { value: f64 },

    /// `external_policy.write_risk` must be a finite value in [0, 1].
    #[error("external_policy.write_risk must be within [0, 1], got {value}")]
    InvalidWriteRisk { value: f64 },

    /// The environment variable holding the signing secret is unset or empty.
    #[error("signing secret not set: environment variable '{var}' is empty")]
    MissingSecret { var: String },
}

/// Errors that can occur while loading or emitting conformance vectors.
#[derive(Debug, Error)]
pub enum ConformanceError {
    /// A vector file could not be read or written.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A vector file is not valid JSON for its record type.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Signing or canonicalization failed.
    #[error("attestation error: {0}")]
    Attest(#[from] AttestError),

    /// The guard failed while running a vector.
    #[error("guard error: {0}")]
    Guard(#[from] GuardError),
}
