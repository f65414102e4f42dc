// ABOUTME: Application descriptor: build pack, source, image, env, and runtime shape.
// ABOUTME: Everything the pipeline needs to know about the resource being deployed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{EnvVarDeclaration, HealthcheckConfig, RestartPolicy, StopConfig};
use crate::error::{Error, Result};
use crate::types::{ApplicationUuid, ContainerName};

/// How an application's image is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPack {
    #[default]
    Nixpacks,
    Static,
    Dockerfile,
    DockerImage,
    DockerCompose,
}

impl std::fmt::Display for BuildPack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BuildPack::Nixpacks => "nixpacks",
            BuildPack::Static => "static",
            BuildPack::Dockerfile => "dockerfile",
            BuildPack::DockerImage => "dockerimage",
            BuildPack::DockerCompose => "dockercompose",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Directory inside the repository used as build context.
    #[serde(default = "default_base_directory")]
    pub base_directory: String,
    #[serde(default = "default_true")]
    pub submodules: bool,
    #[serde(default = "default_true")]
    pub lfs: bool,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_base_directory() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerfileConfig {
    /// Path of the Dockerfile relative to the base directory.
    #[serde(default = "default_dockerfile_location")]
    pub location: String,
    /// Dockerfile content stored on the application instead of the repository.
    #[serde(default)]
    pub inline: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

fn default_dockerfile_location() -> String {
    "/Dockerfile".to_string()
}

impl Default for DockerfileConfig {
    fn default() -> Self {
        Self {
            location: default_dockerfile_location(),
            inline: None,
            target: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSourceConfig {
    pub repository: String,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeConfig {
    #[serde(default = "default_compose_location")]
    pub location: String,
    /// Replaces `docker compose build`.
    #[serde(default)]
    pub build_command: Option<String>,
    /// Replaces `docker compose up -d`.
    #[serde(default)]
    pub start_command: Option<String>,
}

fn default_compose_location() -> String {
    "/docker-compose.yaml".to_string()
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            location: default_compose_location(),
            build_command: None,
            start_command: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NixpacksConfig {
    #[serde(default)]
    pub install_command: Option<String>,
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default)]
    pub start_command: Option<String>,
    /// Serve the build output with the static web server instead of running it.
    #[serde(default)]
    pub is_static: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub cpus: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Repository images are pushed to, e.g. `ghcr.io/acme/api`.
    pub image: String,
    /// Extra tag pushed alongside the commit tag.
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApplicationConfig {
    pub uuid: ApplicationUuid,
    pub name: String,
    #[serde(default)]
    pub build_pack: BuildPack,
    #[serde(default)]
    pub source: Option<SourceConfig>,
    #[serde(default)]
    pub dockerfile: DockerfileConfig,
    #[serde(default)]
    pub image: Option<ImageSourceConfig>,
    #[serde(default)]
    pub compose: ComposeConfig,
    #[serde(default)]
    pub nixpacks: NixpacksConfig,
    /// Directory (relative to the base directory) holding built static assets.
    #[serde(default)]
    pub publish_directory: Option<String>,
    /// Public URLs, e.g. `https://api.example.com`.
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub ports_exposes: Vec<u16>,
    /// Host port bindings, `host:container`.
    #[serde(default)]
    pub ports_mappings: Vec<String>,
    #[serde(default)]
    pub limits: ResourcesConfig,
    #[serde(default)]
    pub healthcheck: HealthcheckConfig,
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
    #[serde(default)]
    pub env: Vec<EnvVarDeclaration>,
    /// Variables used instead of `env` for pull-request previews.
    #[serde(default)]
    pub preview_env: Vec<EnvVarDeclaration>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub consistent_container_name: bool,
    #[serde(default)]
    pub custom_container_name: Option<String>,
    #[serde(default)]
    pub static_ip: Option<String>,
    #[serde(default)]
    pub restart: RestartPolicy,
    #[serde(default)]
    pub stop: StopConfig,
    /// Prefer build secret mounts over build arguments when the builder supports them.
    #[serde(default)]
    pub use_build_secrets: bool,
    /// Expose SOURCE_COMMIT at build time. Busts the cache on every commit.
    #[serde(default)]
    pub include_source_commit: bool,
    #[serde(default)]
    pub pre_deployment_command: Option<String>,
    #[serde(default)]
    pub post_deployment_command: Option<String>,
    /// Configuration fingerprint recorded after the last successful build.
    #[serde(default)]
    pub last_config_hash: Option<String>,
}

impl ApplicationConfig {
    /// Port the application listens on inside its container.
    pub fn exposed_port(&self) -> u16 {
        match self.ports_exposes.first() {
            Some(port) => *port,
            None if self.serves_static() => 80,
            None => 3000,
        }
    }

    pub fn serves_static(&self) -> bool {
        self.build_pack == BuildPack::Static
            || (self.build_pack == BuildPack::Nixpacks && self.nixpacks.is_static)
    }

    pub fn has_inline_dockerfile(&self) -> bool {
        self.build_pack == BuildPack::Dockerfile
            && self.dockerfile.inline.as_deref().is_some_and(|d| !d.trim().is_empty())
    }

    /// Declarations in effect for a run; previews use their own set when present.
    pub fn env_for(&self, pull_request_id: u32) -> &[EnvVarDeclaration] {
        if pull_request_id != 0 && !self.preview_env.is_empty() {
            &self.preview_env
        } else {
            &self.env
        }
    }

    pub fn base_directory(&self) -> &str {
        self.source
            .as_ref()
            .map(|s| s.base_directory.as_str())
            .unwrap_or("/")
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(name) = self.custom_container_name.as_deref().filter(|n| !n.is_empty()) {
            ContainerName::new(name).map_err(|e| {
                Error::InvalidConfig(format!("custom_container_name {name:?}: {e}"))
            })?;
        }
        match self.build_pack {
            BuildPack::DockerImage if self.image.is_none() => Err(Error::InvalidConfig(format!(
                "application {} uses the dockerimage build pack but has no image",
                self.name
            ))),
            BuildPack::DockerImage => Ok(()),
            _ if self.has_inline_dockerfile() => Ok(()),
            pack if self.source.is_none() => Err(Error::InvalidConfig(format!(
                "application {} uses the {pack} build pack but has no source repository",
                self.name
            ))),
            _ => Ok(()),
        }
    }

    pub fn template() -> Self {
        Self {
            uuid: ApplicationUuid::new("my-app"),
            name: "my-app".to_string(),
            build_pack: BuildPack::Nixpacks,
            source: Some(SourceConfig {
                repository: "https://github.com/acme/my-app.git".to_string(),
                branch: default_branch(),
                base_directory: default_base_directory(),
                submodules: true,
                lfs: true,
            }),
            dockerfile: DockerfileConfig::default(),
            image: None,
            compose: ComposeConfig::default(),
            nixpacks: NixpacksConfig::default(),
            publish_directory: None,
            domains: vec![],
            ports_exposes: vec![3000],
            ports_mappings: vec![],
            limits: ResourcesConfig::default(),
            healthcheck: HealthcheckConfig::default(),
            registry: None,
            env: vec![],
            preview_env: vec![],
            labels: BTreeMap::new(),
            consistent_container_name: false,
            custom_container_name: None,
            static_ip: None,
            restart: RestartPolicy::default(),
            stop: StopConfig::default(),
            use_build_secrets: false,
            include_source_commit: false,
            pre_deployment_command: None,
            post_deployment_command: None,
            last_config_hash: None,
        }
    }
}
