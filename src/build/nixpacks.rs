// ABOUTME: Nixpacks build plan inference and Dockerfile generation.
// ABOUTME: Plan variables become the lowest-precedence build-time defaults.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::config::NixpacksConfig;
use crate::env::{EnvVar, VarOrigin};
use crate::executor::shell_quote;

/// Where `nixpacks build -o` leaves the generated Dockerfile, relative to the source dir.
pub const GENERATED_DOCKERFILE: &str = ".nixpacks/Dockerfile";

#[derive(Debug, Default, Deserialize)]
struct Plan {
    #[serde(default)]
    variables: BTreeMap<String, String>,
}

fn custom_commands(config: &NixpacksConfig) -> String {
    let mut flags = String::new();
    for (flag, value) in [
        ("--install-cmd", &config.install_command),
        ("--build-cmd", &config.build_command),
        ("--start-cmd", &config.start_command),
    ] {
        if let Some(cmd) = value.as_deref().filter(|c| !c.trim().is_empty()) {
            flags.push_str(&format!(" {flag} {}", shell_quote(cmd)));
        }
    }
    flags
}

pub fn plan_command(source_dir: &str, config: &NixpacksConfig) -> String {
    format!(
        "nixpacks plan -f json{} {}",
        custom_commands(config),
        shell_quote(source_dir)
    )
}

/// Writes `<source_dir>/.nixpacks/Dockerfile` without building it.
pub fn generate_command(source_dir: &str, config: &NixpacksConfig) -> String {
    let dir = shell_quote(source_dir);
    format!(
        "nixpacks build {dir} -o {dir} --no-error-without-start{}",
        custom_commands(config)
    )
}

/// Detected variables from a JSON plan, as build-only defaults.
pub fn plan_variables(plan_json: &str) -> Result<Vec<EnvVar>, serde_json::Error> {
    let plan: Plan = serde_json::from_str(plan_json)?;
    Ok(plan
        .variables
        .into_iter()
        .map(|(key, value)| EnvVar::new(key, value, VarOrigin::Detected).build_only())
        .collect())
}
