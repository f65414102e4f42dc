// ABOUTME: Platform-wide orchestrator settings.
// ABOUTME: Helper image, remote directories, run timeout, and the secrets-hash key.

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Environment variable consulted when the manifest carries no secrets key.
pub const SECRETS_KEY_ENV: &str = "SKIFF_SECRETS_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSettings {
    /// Image of the per-run helper container. Must ship docker, git, nixpacks.
    #[serde(default = "default_helper_image")]
    pub helper_image: String,

    /// Durable per-application configuration lives under `<data_dir>/applications/<uuid>`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Per-run working directories live under `<artifacts_dir>/<deployment uuid>`.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,

    #[serde(default = "default_run_timeout", with = "humantime_serde")]
    pub run_timeout: Duration,

    /// Container log lines dumped when a health check fails.
    #[serde(default = "default_log_tail")]
    pub log_tail: u32,

    /// Web server image for static sites.
    #[serde(default = "default_static_image")]
    pub static_image: String,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub secrets_key: Option<SecretString>,
}

fn default_helper_image() -> String {
    "ghcr.io/skiff-sh/helper:1".to_string()
}

fn default_data_dir() -> String {
    "/data/skiff".to_string()
}

fn default_artifacts_dir() -> String {
    "/artifacts".to_string()
}

fn default_run_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_log_tail() -> u32 {
    100
}

fn default_static_image() -> String {
    "nginx:alpine".to_string()
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()).map(SecretString::from))
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            helper_image: default_helper_image(),
            data_dir: default_data_dir(),
            artifacts_dir: default_artifacts_dir(),
            run_timeout: default_run_timeout(),
            log_tail: default_log_tail(),
            static_image: default_static_image(),
            secrets_key: None,
        }
    }
}

impl OrchestratorSettings {
    /// The deterministic key used for secrets hashing.
    ///
    /// Taken from the manifest, else from `SKIFF_SECRETS_KEY`.
    pub fn resolve_secrets_key(&self) -> Result<SecretString> {
        if let Some(key) = &self.secrets_key {
            return Ok(key.clone());
        }
        std::env::var(SECRETS_KEY_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| Error::MissingEnvVar(SECRETS_KEY_ENV.to_string()))
    }

    pub fn with_secrets_key(mut self, key: impl Into<String>) -> Self {
        self.secrets_key = Some(SecretString::from(key.into()));
        self
    }
}
