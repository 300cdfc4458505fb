// mod.rs — Subcommands and the helpers they share.

pub mod authorize;
pub mod issue;
pub mod seal;
pub mod vectors;

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

use ibe_guard::{GuardConfig, GuardSettings};

/// Secret used when the configured environment variable is unset.
/// Matches the demo vectors; never use it outside local testing.
pub const DEV_SECRET: &str = "dev-secret-change-me";

/// Load guard settings from `path` (defaults when absent) and resolve the
/// signing secret from the environment, falling back to [`DEV_SECRET`].
pub fn load_guard_config(path: &Path) -> anyhow::Result<GuardConfig> {
    let settings = GuardSettings::load_or_default(path)
        .with_context(|| format!("Failed to load guard config from {}", path.display()))?;
    let secret = match std::env::var(&settings.secret_env) {
        Ok(value) if !value.is_empty() => value,
        _ => {
            tracing::warn!(
                var = %settings.secret_env,
                "signing secret not set; using the development secret"
            );
            DEV_SECRET.to_string()
        }
    };
    Ok(settings.into_config_with_secret(secret)?)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
