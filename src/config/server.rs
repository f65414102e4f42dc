// ABOUTME: Destination server configuration for SSH connections and topology.
// ABOUTME: Parses compact forms like "host", "user@host", "host:port", "user@host:port".

use crate::ssh::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Reverse proxy running on a server; decides which routing labels are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Traefik,
    Caddy,
    None,
}

/// How containers are scheduled on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    #[default]
    Standalone,
    Swarm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Stable reference used by deployment requests. Defaults to the host.
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default = "default_trust_first_connection")]
    pub trust_first_connection: bool,
    /// known_hosts file to verify against instead of `~/.ssh/known_hosts`.
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
    #[serde(default)]
    pub proxy: ProxyType,
    #[serde(default)]
    pub topology: Topology,
    /// Docker network shared by the proxy and deployed containers.
    #[serde(default = "default_network")]
    pub network: String,
    /// Host path of a docker `config.json` with registry credentials.
    #[serde(default)]
    pub registry_credentials: Option<String>,
    /// Reachability as last reported by the platform.
    #[serde(default = "default_reachable")]
    pub reachable: bool,
}

fn default_port() -> u16 {
    22
}

fn default_trust_first_connection() -> bool {
    true
}

fn default_network() -> String {
    "skiff".to_string()
}

fn default_reachable() -> bool {
    true
}

impl ServerConfig {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("server address cannot be empty".to_string());
        }

        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {port_str}"))?;
                (host, port)
            }
            None => (rest, default_port()),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(ServerConfig {
            port,
            user: user.map(str::to_string),
            ..ServerConfig::new(host)
        })
    }

    pub fn new(host: impl Into<String>) -> Self {
        ServerConfig {
            name: None,
            host: host.into(),
            port: default_port(),
            user: None,
            key_path: None,
            trust_first_connection: default_trust_first_connection(),
            known_hosts: None,
            proxy: ProxyType::default(),
            topology: Topology::default(),
            network: default_network(),
            registry_credentials: None,
            reachable: default_reachable(),
        }
    }

    /// Name deployment requests use to address this server.
    pub fn reference(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.host)
    }

    pub fn is_swarm(&self) -> bool {
        self.topology == Topology::Swarm
    }

    pub fn session_config(&self, command_timeout: Duration) -> SessionConfig {
        let user = self
            .user
            .clone()
            .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "root".to_string()));

        let mut config = SessionConfig::new(&self.host, user)
            .port(self.port)
            .trust_on_first_use(self.trust_first_connection)
            .command_timeout(command_timeout);
        if let Some(path) = &self.key_path {
            config = config.key_path(path);
        }
        if let Some(path) = &self.known_hosts {
            config = config.known_hosts_path(path);
        }
        config
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({}:{})", self.host, self.port),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_host_port() {
        let server = ServerConfig::parse("deploy@10.0.0.5:2222").unwrap();
        assert_eq!(server.user.as_deref(), Some("deploy"));
        assert_eq!(server.host, "10.0.0.5");
        assert_eq!(server.port, 2222);
        assert_eq!(server.reference(), "10.0.0.5");
    }

    #[test]
    fn rejects_bad_port() {
        assert!(ServerConfig::parse("host:ssh").is_err());
    }

    #[test]
    fn session_config_carries_connection_settings() {
        let mut server = ServerConfig::parse("deploy@10.0.0.5:2222").unwrap();
        server.known_hosts = Some(PathBuf::from("/etc/skiff/known_hosts"));
        let config = server.session_config(Duration::from_secs(600));
        assert_eq!(config.user, "deploy");
        assert_eq!(config.port, 2222);
        assert!(config.trust_on_first_use);
        assert_eq!(
            config.known_hosts_path.as_deref(),
            Some(std::path::Path::new("/etc/skiff/known_hosts"))
        );
        assert_eq!(config.command_timeout, Duration::from_secs(600));
    }

    #[test]
    fn named_server_reference() {
        let mut server = ServerConfig::parse("host").unwrap();
        server.name = Some("edge-1".to_string());
        assert_eq!(server.reference(), "edge-1");
    }
}
