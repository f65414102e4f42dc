// ABOUTME: Deterministic HMAC over build-time variables, used as a cache-busting build argument.
// ABOUTME: Same content gives the same hash across runs; any change gives a new one.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::fmt;

use super::EnvironmentVariableSet;

type HmacSha256 = Hmac<Sha256>;

/// Build argument carrying the hash into every Dockerfile stage.
pub const SECRETS_HASH_VAR: &str = "SKIFF_BUILD_SECRETS_HASH";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretsHash(String);

impl SecretsHash {
    /// HMAC-SHA256 over the sorted `key=value` pairs joined by newlines.
    ///
    /// The key is platform-wide, never a per-run nonce, so unchanged
    /// content keeps the build cache warm.
    pub fn compute(set: &EnvironmentVariableSet, key: &SecretString) -> Option<Self> {
        let mut mac = HmacSha256::new_from_slice(key.expose_secret().as_bytes()).ok()?;
        mac.update(set.sorted_pairs().join("\n").as_bytes());
        Some(Self(hex::encode(mac.finalize().into_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretsHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
