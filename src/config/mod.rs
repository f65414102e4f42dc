// ABOUTME: Configuration types and parsing for skiff.yml.
// ABOUTME: A manifest pairs one application with its destination servers and platform settings.

mod application;
mod deserialize;
mod env_value;
mod healthcheck;
mod init;
mod restart_policy;
mod server;
mod settings;
mod stop;

pub use application::{
    ApplicationConfig, BuildPack, ComposeConfig, DockerfileConfig, ImageSourceConfig,
    NixpacksConfig, RegistryConfig, ResourcesConfig, SourceConfig,
};
pub use env_value::{EnvValue, EnvVarDeclaration};
pub use healthcheck::HealthcheckConfig;
pub use init::init_config;
pub use restart_policy::RestartPolicy;
pub use server::{ProxyType, ServerConfig, Topology};
pub use settings::{OrchestratorSettings, SECRETS_KEY_ENV};
pub use stop::StopConfig;

use crate::error::{Error, Result};
use deserialize::{deserialize_server_option, deserialize_servers};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "skiff.yml";
pub const CONFIG_FILENAME_ALT: &str = "skiff.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".skiff/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub application: ApplicationConfig,

    /// Destinations; the first is the primary one, the rest receive fan-out runs.
    #[serde(deserialize_with = "deserialize_servers")]
    pub servers: NonEmpty<ServerConfig>,

    /// Dedicated build host. Images then travel to destinations through the registry.
    #[serde(default, deserialize_with = "deserialize_server_option")]
    pub build_server: Option<ServerConfig>,

    #[serde(default)]
    pub settings: OrchestratorSettings,
}

impl Manifest {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(yaml)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        self.application.validate()?;

        if self.application.registry.is_none()
            && (self.build_server.is_some() || self.servers.len() > 1)
        {
            return Err(Error::InvalidConfig(
                "a registry is required when using a build server or several servers".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for server in self.servers.iter() {
            if !seen.insert(server.reference()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate server reference: {}",
                    server.reference()
                )));
            }
        }
        Ok(())
    }

    /// Look up a destination by its reference (name or host).
    pub fn server(&self, reference: &str) -> Result<&ServerConfig> {
        self.servers
            .iter()
            .find(|s| s.reference() == reference)
            .ok_or_else(|| Error::UnknownServer(reference.to_string()))
    }

    pub fn primary_server(&self) -> &ServerConfig {
        self.servers.first()
    }

    /// Destinations other than `reference`.
    pub fn additional_servers<'a>(
        &'a self,
        reference: &'a str,
    ) -> impl Iterator<Item = &'a ServerConfig> + 'a {
        self.servers.iter().filter(move |s| s.reference() != reference)
    }

    pub fn template() -> Self {
        Manifest {
            application: ApplicationConfig::template(),
            servers: NonEmpty::new(ServerConfig {
                user: Some("deploy".to_string()),
                ..ServerConfig::new("server.example.com")
            }),
            build_server: None,
            settings: OrchestratorSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
application:
  uuid: app-1
  name: api
  source:
    repository: https://github.com/acme/api.git
servers:
  - deploy@10.0.0.5
"#;

    #[test]
    fn minimal_manifest_uses_defaults() {
        let manifest = Manifest::from_yaml(MINIMAL).unwrap();
        assert_eq!(manifest.application.build_pack, BuildPack::Nixpacks);
        assert_eq!(manifest.primary_server().host, "10.0.0.5");
        assert_eq!(manifest.settings.log_tail, 100);
        assert!(manifest.build_server.is_none());
    }

    #[test]
    fn empty_server_list_is_rejected() {
        let yaml = MINIMAL.replace("  - deploy@10.0.0.5\n", "").replace("servers:\n", "servers: []\n");
        assert!(Manifest::from_yaml(&yaml).is_err());
    }

    #[test]
    fn several_servers_require_a_registry() {
        let yaml = format!("{MINIMAL}  - deploy@10.0.0.6\n");
        assert!(matches!(
            Manifest::from_yaml(&yaml),
            Err(Error::InvalidConfig(_))
        ));

        let yaml = yaml.replace(
            "  name: api\n",
            "  name: api\n  registry:\n    image: ghcr.io/acme/api\n",
        );
        let manifest = Manifest::from_yaml(&yaml).unwrap();
        let others: Vec<_> = manifest.additional_servers("10.0.0.5").collect();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].host, "10.0.0.6");
    }

    #[test]
    fn unknown_server_reference() {
        let manifest = Manifest::from_yaml(MINIMAL).unwrap();
        assert!(manifest.server("10.0.0.5").is_ok());
        assert!(matches!(
            manifest.server("nope"),
            Err(Error::UnknownServer(_))
        ));
    }

    #[test]
    fn detailed_server_entry() {
        let yaml = MINIMAL.replace(
            "  - deploy@10.0.0.5\n",
            "  - name: edge\n    host: 10.0.0.5\n    proxy: caddy\n    topology: swarm\n",
        );
        let manifest = Manifest::from_yaml(&yaml).unwrap();
        let server = manifest.server("edge").unwrap();
        assert_eq!(server.proxy, ProxyType::Caddy);
        assert!(server.is_swarm());
    }
}
