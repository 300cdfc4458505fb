// tool.rs — Typed views over plan-step tool arguments.
//
// On the wire a step carries `tool` (a name) and `args` (an open JSON map),
// so a signature binds every argument the signer saw. Consumers never poke
// at the map directly: they go through `ToolKind` for the textual argument a
// scorer reads, and through `ToolArgs::parse` for full schema validation.
// Supporting a new tool means adding a variant to both enums.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::AttestError;

/// Tool name for local-model text generation.
pub const GENERATE_TOOL: &str = "ollama.generate";

/// Tool name for an HTTP GET fetch.
pub const FETCH_TOOL: &str = "http.get";

/// The tools the attestation model knows a schema for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// Text generation driven by a prompt.
    Generate,
    /// Read-only fetch of a URL.
    Fetch,
}

impl ToolKind {
    /// Resolve a tool name. Unknown names have no schema.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            GENERATE_TOOL => Some(Self::Generate),
            FETCH_TOOL => Some(Self::Fetch),
            _ => None,
        }
    }

    /// The wire name of this tool.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generate => GENERATE_TOOL,
            Self::Fetch => FETCH_TOOL,
        }
    }

    /// The argument key holding the step's free text (what alignment is judged on).
    pub fn text_argument(&self) -> &'static str {
        match self {
            Self::Generate => "prompt",
            Self::Fetch => "url",
        }
    }
}

/// Arguments for [`ToolKind::Generate`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenerateArgs {
    pub prompt: String,
}

/// Arguments for [`ToolKind::Fetch`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchArgs {
    pub url: String,
}

/// Schema-validated arguments, one variant per known tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolArgs {
    Generate(GenerateArgs),
    Fetch(FetchArgs),
}

impl ToolArgs {
    /// Parse and validate `args` against the schema registered for `tool`.
    ///
    /// - `ollama.generate` needs a non-empty string `prompt`.
    /// - `http.get` needs a string `url` starting with `http://` or `https://`.
    ///
    /// Extra keys are ignored; they are still covered by the plan signature.
    pub fn parse(tool: &str, args: &Map<String, Value>) -> Result<Self, AttestError> {
        let kind = ToolKind::from_name(tool).ok_or_else(|| AttestError::UnknownTool {
            tool: tool.to_string(),
        })?;
        let value = Value::Object(args.clone());
        let invalid = |reason: String| AttestError::InvalidArguments {
            tool: tool.to_string(),
            reason,
        };

        let parsed = match kind {
            ToolKind::Generate => Self::Generate(
                serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?,
            ),
            ToolKind::Fetch => {
                Self::Fetch(serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?)
            }
        };

        match &parsed {
            Self::Generate(a) if a.prompt.is_empty() => {
                Err(invalid("prompt must not be empty".to_string()))
            }
            Self::Fetch(a) if !(a.url.starts_with("http://") || a.url.starts_with("https://")) => {
                Err(invalid(format!("url '{}' is not http(s)", a.url)))
            }
            _ => Ok(parsed),
        }
    }

    /// Which tool these arguments belong to.
    pub fn kind(&self) -> ToolKind {
        match self {
            Self::Generate(_) => ToolKind::Generate,
            Self::Fetch(_) => ToolKind::Fetch,
        }
    }
}
