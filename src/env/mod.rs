// ABOUTME: Environment materialization: variable sets, escaping, secrets hashing, Dockerfile rewriting.
// ABOUTME: Produces the build-time file kept outside the build context and the runtime env file.

mod capability;
mod dockerfile;
mod error;
mod escape;
mod materialize;
mod secrets;
mod set;

pub use capability::{BUILDX_PROBE, BuilderCapabilities, SecretStrategy, VERSION_PROBE};
pub use dockerfile::{add_secret_mounts, has_healthcheck, inject_build_args};
pub use error::EnvError;
pub use escape::{escape_literal, escape_scalar, unescape_literal, unescape_scalar};
pub use materialize::{
    BuildTimeEnv, Discovery, EnvironmentMaterializer, discovery_vars, preview_url,
    resolve_declarations,
};
pub use secrets::{SECRETS_HASH_VAR, SecretsHash};
pub use set::{EnvVar, EnvironmentVariableSet, VarOrigin, validate_key};
