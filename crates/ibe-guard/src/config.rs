// config.rs — Guard configuration and its on-disk form.
//
// `GuardConfig` is what the guard runs with. `GuardSettings` is the TOML file
// an operator edits; it never holds the secret itself, only the name of the
// environment variable to read it from.
//
// ```toml
// min_alignment = 0.8
// verifier_method = "semantic-entailment-v1"
// secret_env = "IBE_SECRET"
//
// [external_policy]
// keywords = ["summary", "brief"]
// write_risk = 0.5
//
// [strict]
// require_attestation_proofs = true
// fail_closed_on_stale_registry = true
// ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::scoring::{ExternalPolicy, CLASSIFIER_V1, EXTERNAL_POLICY_V1, SEMANTIC_ENTAILMENT_V1};

/// Default minimum coverage an alignment must reach.
pub const DEFAULT_MIN_ALIGNMENT: f64 = 0.8;

/// Default environment variable holding the signing secret.
pub const DEFAULT_SECRET_ENV: &str = "IBE_SECRET";

/// Shared HMAC signing secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(<{} bytes redacted>)", self.0.len())
    }
}

impl From<Vec<u8>> for SecretKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for SecretKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for SecretKey {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for SecretKey {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

/// Which alignment scorer the guard recomputes evidence with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VerifierMethod {
    /// `semantic-entailment-v1`. Also selected by `""` and `"default"`.
    #[default]
    SemanticEntailment,
    /// `external-policy-v1`.
    ExternalPolicy,
    /// `classifier-v1`.
    Classifier,
    /// A scorer registered at runtime under this tag.
    Custom(String),
}

impl VerifierMethod {
    /// The scorer method tag.
    pub fn tag(&self) -> &str {
        match self {
            Self::SemanticEntailment => SEMANTIC_ENTAILMENT_V1,
            Self::ExternalPolicy => EXTERNAL_POLICY_V1,
            Self::Classifier => CLASSIFIER_V1,
            Self::Custom(tag) => tag,
        }
    }
}

impl From<String> for VerifierMethod {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&str> for VerifierMethod {
    fn from(s: &str) -> Self {
        match s {
            "" | "default" | SEMANTIC_ENTAILMENT_V1 => Self::SemanticEntailment,
            EXTERNAL_POLICY_V1 => Self::ExternalPolicy,
            CLASSIFIER_V1 => Self::Classifier,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<VerifierMethod> for String {
    fn from(method: VerifierMethod) -> Self {
        method.tag().to_string()
    }
}

impl fmt::Display for VerifierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Opt-in hardening beyond the baseline pipeline. All off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Strictness {
    /// Deny when an intent, plan, proof or capability carries no signature.
    pub require_attestation_proofs: bool,
    /// Deny when the revocation registry was set but has lapsed.
    pub fail_closed_on_stale_registry: bool,
    /// Deny when the intent's `notAfter` has passed.
    pub enforce_intent_window: bool,
    /// Deny when envelope references do not match the records presented.
    pub enforce_reference_binding: bool,
    /// Deny when fetch steps exceed the intent's `maxExternalCalls`.
    pub enforce_external_call_budget: bool,
}

impl Strictness {
    /// Every check enabled.
    pub fn all() -> Self {
        Self {
            require_attestation_proofs: true,
            fail_closed_on_stale_registry: true,
            enforce_intent_window: true,
            enforce_reference_binding: true,
            enforce_external_call_budget: true,
        }
    }
}

/// Runtime configuration of a [`Guard`](crate::Guard).
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub secret: SecretKey,
    /// Minimum recomputed coverage, in [0, 1].
    pub min_alignment: f64,
    pub verifier_method: VerifierMethod,
    /// Policy for `external-policy-v1`. `None` derives keywords from the purpose.
    pub external_policy: Option<ExternalPolicy>,
    pub strict: Strictness,
}

impl GuardConfig {
    /// Baseline configuration: threshold 0.8, semantic entailment, no hardening.
    pub fn new(secret: impl Into<SecretKey>) -> Self {
        Self {
            secret: secret.into(),
            min_alignment: DEFAULT_MIN_ALIGNMENT,
            verifier_method: VerifierMethod::default(),
            external_policy: None,
            strict: Strictness::default(),
        }
    }

    /// Set the coverage threshold. Rejects NaN and values outside [0, 1].
    pub fn with_min_alignment(mut self, min_alignment: f64) -> Result<Self, ConfigError> {
        check_min_alignment(min_alignment)?;
        self.min_alignment = min_alignment;
        Ok(self)
    }

    pub fn with_verifier_method(mut self, method: impl Into<VerifierMethod>) -> Self {
        self.verifier_method = method.into();
        self
    }

    /// Set the `external-policy-v1` policy. Rejects a write risk that is NaN
    /// or outside [0, 1].
    pub fn with_external_policy(mut self, policy: ExternalPolicy) -> Result<Self, ConfigError> {
        check_write_risk(policy.write_risk)?;
        self.external_policy = Some(policy);
        Ok(self)
    }

    pub fn with_strictness(mut self, strict: Strictness) -> Self {
        self.strict = strict;
        self
    }
}

// `contains` is false for NaN, so both checks reject it.
fn check_min_alignment(value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidMinAlignment { value });
    }
    Ok(())
}

fn check_write_risk(value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidWriteRisk { value });
    }
    Ok(())
}

/// Guard settings as stored in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    pub min_alignment: f64,
    pub verifier_method: VerifierMethod,
    /// Environment variable holding the signing secret.
    pub secret_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_policy: Option<ExternalPolicy>,
    pub strict: Strictness,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            min_alignment: DEFAULT_MIN_ALIGNMENT,
            verifier_method: VerifierMethod::default(),
            secret_env: DEFAULT_SECRET_ENV.to_string(),
            external_policy: None,
            strict: Strictness::default(),
        }
    }
}

impl GuardSettings {
    /// Parse settings from TOML text and validate them.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load settings, falling back to defaults when the file does not exist.
    /// A file that exists but is invalid is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no guard config, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_min_alignment(self.min_alignment)?;
        if let Some(policy) = &self.external_policy {
            check_write_risk(policy.write_risk)?;
        }
        Ok(())
    }

    /// Build a runtime config, reading the secret from `secret_env`.
    pub fn into_config(self) -> Result<GuardConfig, ConfigError> {
        let secret = std::env::var(&self.secret_env).unwrap_or_default();
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret {
                var: self.secret_env,
            });
        }
        self.into_config_with_secret(secret)
    }

    /// Build a runtime config with an explicitly supplied secret.
    pub fn into_config_with_secret(
        self,
        secret: impl Into<SecretKey>,
    ) -> Result<GuardConfig, ConfigError> {
        self.validate()?;
        Ok(GuardConfig {
            secret: secret.into(),
            min_alignment: self.min_alignment,
            verifier_method: self.verifier_method,
            external_policy: self.external_policy,
            strict: self.strict,
        })
    }
}
