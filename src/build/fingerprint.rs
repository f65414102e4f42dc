// ABOUTME: Fingerprint of the build-relevant application configuration.
// ABOUTME: An unchanged fingerprint lets a run reuse an existing image.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::config::{
    ApplicationConfig, BuildPack, ComposeConfig, DockerfileConfig, ImageSourceConfig,
    NixpacksConfig, SourceConfig,
};
use crate::env::EnvVar;

#[derive(Serialize)]
struct BuildInputs<'a> {
    build_pack: BuildPack,
    source: Option<&'a SourceConfig>,
    dockerfile: &'a DockerfileConfig,
    image: Option<&'a ImageSourceConfig>,
    compose: &'a ComposeConfig,
    nixpacks: &'a NixpacksConfig,
    publish_directory: Option<&'a str>,
    ports_exposes: &'a [u16],
    labels: &'a BTreeMap<String, String>,
    include_source_commit: bool,
    build_vars: Vec<String>,
}

/// SHA-256 over everything that shapes the built image.
///
/// Build-time user variables are included by value; runtime-only values are not.
pub fn config_fingerprint(
    app: &ApplicationConfig,
    user_vars: &[EnvVar],
) -> Result<String, serde_json::Error> {
    let mut build_vars: Vec<String> = user_vars
        .iter()
        .filter(|v| v.is_buildtime)
        .map(|v| format!("{}={}", v.key, v.value))
        .collect();
    build_vars.sort();

    let inputs = BuildInputs {
        build_pack: app.build_pack,
        source: app.source.as_ref(),
        dockerfile: &app.dockerfile,
        image: app.image.as_ref(),
        compose: &app.compose,
        nixpacks: &app.nixpacks,
        publish_directory: app.publish_directory.as_deref(),
        ports_exposes: &app.ports_exposes,
        labels: &app.labels,
        include_source_commit: app.include_source_commit,
        build_vars,
    };
    let bytes = serde_json::to_vec(&inputs)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Whether the stored fingerprint matches the current configuration.
pub fn is_unchanged(app: &ApplicationConfig, current: &str) -> bool {
    app.last_config_hash.as_deref() == Some(current)
}
