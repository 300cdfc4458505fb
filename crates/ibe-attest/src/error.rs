// error.rs — Error types for attestation encoding and tool argument parsing.
//
// These are caller bugs (a record that cannot be serialized, a malformed
// token, arguments that do not fit a tool's schema), never security
// decisions. The guard turns schema failures into a denial itself.

use thiserror::Error;

/// Errors that can occur while canonicalizing, signing, or parsing records.
#[derive(Debug, Error)]
pub enum AttestError {
    /// The record could not be serialized to JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A compact token could not be decoded.
    #[error("invalid token: {reason}")]
    InvalidToken { reason: String },

    /// No argument schema is registered for the tool.
    #[error("no argument schema for tool '{tool}'")]
    UnknownTool { tool: String },

    /// The arguments do not satisfy the tool's schema.
    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
}
