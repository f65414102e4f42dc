// ABOUTME: Environment materialization errors.
// ABOUTME: Unresolvable declarations and variable names unsafe for shells and Dockerfiles.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("cannot resolve variable {key}: {source}")]
    Resolve {
        key: String,
        #[source]
        source: Box<crate::error::Error>,
    },

    #[error("invalid variable name: {0:?}")]
    InvalidKey(String),

    #[error("secrets key rejected by HMAC")]
    SecretsKey,
}
