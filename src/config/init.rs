// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a skiff.yml template for an application.

use std::path::Path;

use crate::error::{Error, Result};

use super::{CONFIG_FILENAME, Manifest, ServerConfig};

pub fn init_config(
    dir: &Path,
    name: Option<&str>,
    repository: Option<&str>,
    server: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut manifest = Manifest::template();

    if let Some(name) = name {
        if name.trim().is_empty() {
            return Err(Error::InvalidConfig("application name cannot be empty".to_string()));
        }
        manifest.application.name = name.to_string();
        manifest.application.uuid = crate::types::ApplicationUuid::new(name);
    }

    if let (Some(repo), Some(source)) = (repository, manifest.application.source.as_mut()) {
        source.repository = repo.to_string();
    }

    if let Some(server) = server {
        manifest.servers =
            nonempty::NonEmpty::new(ServerConfig::parse(server).map_err(Error::InvalidConfig)?);
    }

    std::fs::write(&config_path, generate_template_yaml(&manifest))?;

    Ok(())
}

fn generate_template_yaml(manifest: &Manifest) -> String {
    let app = &manifest.application;
    let server = manifest.servers.first();
    let (repository, branch) = app
        .source
        .as_ref()
        .map(|s| (s.repository.as_str(), s.branch.as_str()))
        .unwrap_or(("", "main"));
    format!(
        r#"application:
  uuid: {uuid}
  name: {name}
  build_pack: {pack}
  source:
    repository: {repository}
    branch: {branch}
  ports_exposes: [{port}]
  # domains: [https://{name}.example.com]
  # healthcheck:
  #   enabled: true
  #   path: /health
  # env:
  #   - key: DATABASE_URL
  #     value: {{ env: DATABASE_URL }}
  #     is_buildtime: false
servers:
  - host: {host}
    port: {ssh_port}
    user: {user}
    # SSH host key verification: set to false and pre-populate ~/.ssh/known_hosts
    # to disable Trust-On-First-Use
    # trust_first_connection: true
    # known_hosts: /etc/skiff/known_hosts
# settings:
#   run_timeout: 1h
#   secrets_key is read from SKIFF_SECRETS_KEY when not set here
"#,
        uuid = app.uuid,
        name = app.name,
        pack = app.build_pack,
        port = app.exposed_port(),
        host = server.host,
        ssh_port = server.port,
        user = server.user.as_deref().unwrap_or("deploy"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_template_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), Some("shop"), None, Some("ops@10.1.1.1"), false).unwrap();

        let manifest = Manifest::discover(dir.path()).unwrap();
        assert_eq!(manifest.application.name, "shop");
        assert_eq!(manifest.primary_server().user.as_deref(), Some("ops"));
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), None, None, None, false).unwrap();
        assert!(matches!(
            init_config(dir.path(), None, None, None, false),
            Err(Error::AlreadyExists(_))
        ));
        assert!(init_config(dir.path(), None, None, None, true).is_ok());
    }
}
