// ABOUTME: Immutable per-run build context threaded through pipeline phases.
// ABOUTME: Phases that learn something new return an updated copy instead of mutating.

use crate::config::{ApplicationConfig, ServerConfig};
use crate::types::{ApplicationUuid, Commit, DeploymentUuid, ImageRef, ParseImageRefError};

use super::BuildStrategy;

/// Image produced by a run and the intermediate image some strategies need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageNames {
    /// Intermediate image (`<tag>-build`) for two-stage static builds.
    pub build: ImageRef,
    /// Image the containers run.
    pub production: ImageRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub deployment: DeploymentUuid,
    pub application: ApplicationUuid,
    pub deploy_server: ServerConfig,
    /// Equals `deploy_server` unless a dedicated build host is configured.
    pub build_server: ServerConfig,
    pub artifacts_dir: String,
    pub data_dir: String,
    pub container_name: String,
    pub commit: Commit,
    pub branch: String,
    pub pull_request_id: u32,
    pub builder_secrets_supported: bool,
}

impl BuildContext {
    /// Name of the helper container; one per run per host.
    pub fn helper_container_id(&self) -> &str {
        self.deployment.as_str()
    }

    pub fn with_commit(&self, commit: Commit) -> Self {
        Self {
            commit,
            ..self.clone()
        }
    }

    pub fn with_builder_secrets(&self, supported: bool) -> Self {
        Self {
            builder_secrets_supported: supported,
            ..self.clone()
        }
    }

    pub fn uses_build_server(&self) -> bool {
        self.build_server != self.deploy_server
    }

    /// Per-run working directory inside the helper.
    pub fn workdir(&self) -> String {
        format!("{}/{}", self.artifacts_dir.trim_end_matches('/'), self.deployment)
    }

    /// Build-time variable file. A sibling of the workdir, so never inside the build context.
    pub fn build_env_path(&self) -> String {
        format!(
            "{}/{}-build.env",
            self.artifacts_dir.trim_end_matches('/'),
            self.deployment
        )
    }

    /// Durable per-application configuration directory on the deploy host.
    pub fn config_dir(&self) -> String {
        format!(
            "{}/applications/{}",
            self.data_dir.trim_end_matches('/'),
            self.application
        )
    }

    /// Directory inside the checkout used as the build context.
    pub fn source_dir(&self, app: &ApplicationConfig) -> String {
        join_path(&self.workdir(), app.base_directory())
    }

    pub fn compose_path(&self) -> String {
        format!("{}/docker-compose.yaml", self.workdir())
    }

    /// Dockerfiles the platform writes itself. Kept outside the build context.
    pub fn generated_dockerfile_path(&self) -> String {
        format!(
            "{}/{}.Dockerfile",
            self.artifacts_dir.trim_end_matches('/'),
            self.deployment
        )
    }

    /// Directory compose resolves relative paths (and `.env`) against.
    pub fn project_dir(&self, app: &ApplicationConfig, strategy: BuildStrategy) -> String {
        match strategy {
            BuildStrategy::Compose => self.source_dir(app),
            _ => self.workdir(),
        }
    }

    /// Production and intermediate image names for this run.
    pub fn image_names(
        &self,
        app: &ApplicationConfig,
        strategy: BuildStrategy,
    ) -> Result<ImageNames, ParseImageRefError> {
        if strategy == BuildStrategy::Image {
            let production = match &app.image {
                Some(image) => {
                    ImageRef::from_repository_and_tag(&image.repository, image.tag.as_deref())?
                }
                None => return Err(ParseImageRefError::Empty),
            };
            return Ok(ImageNames {
                build: production.clone(),
                production,
            });
        }

        let repository = match &app.registry {
            Some(registry) => registry.image.clone(),
            None => app.uuid.as_str().to_ascii_lowercase(),
        };
        let tag = match self.pull_request_id {
            0 => self.commit.tag().to_string(),
            id => format!("pr-{id}"),
        };
        let base = ImageRef::parse(&repository)?;
        Ok(ImageNames {
            build: base.with_tag(&format!("{tag}-build")),
            production: base.with_tag(&tag),
        })
    }
}

/// Join a directory and a repository-relative path, tolerating stray slashes.
pub fn join_path(dir: &str, relative: &str) -> String {
    let relative = relative.trim_matches('/');
    if relative.is_empty() || relative == "." {
        dir.trim_end_matches('/').to_string()
    } else {
        format!("{}/{relative}", dir.trim_end_matches('/'))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn context() -> BuildContext {
        let server = ServerConfig::new("10.0.0.5");
        BuildContext {
            deployment: DeploymentUuid::new("dep1"),
            application: ApplicationUuid::new("my-app"),
            deploy_server: server.clone(),
            build_server: server,
            artifacts_dir: "/artifacts".to_string(),
            data_dir: "/data/skiff".to_string(),
            container_name: "my-app-dep1".to_string(),
            commit: Commit::Head,
            branch: "main".to_string(),
            pull_request_id: 0,
            builder_secrets_supported: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::context;
    use super::*;
    use crate::config::{ImageSourceConfig, RegistryConfig};

    #[test]
    fn paths_are_scoped_by_deployment() {
        let ctx = context();
        assert_eq!(ctx.workdir(), "/artifacts/dep1");
        assert_eq!(ctx.helper_container_id(), "dep1");
        assert_eq!(ctx.build_env_path(), "/artifacts/dep1-build.env");
        assert!(!ctx.build_env_path().starts_with(&format!("{}/", ctx.workdir())));
        assert_eq!(ctx.config_dir(), "/data/skiff/applications/my-app");
    }

    #[test]
    fn with_commit_leaves_original_untouched() {
        let ctx = context();
        let resolved = ctx.with_commit(Commit::sha("abcdef1").unwrap());
        assert!(ctx.commit.is_head());
        assert_eq!(resolved.commit.tag(), "abcdef1");
    }

    #[test]
    fn production_image_uses_registry_and_commit() {
        let mut app = ApplicationConfig::template();
        let ctx = context().with_commit(Commit::sha("abcdef1").unwrap());
        let names = ctx.image_names(&app, BuildStrategy::Nixpacks).unwrap();
        assert_eq!(names.production.to_string(), "my-app:abcdef1");
        assert_eq!(names.build.to_string(), "my-app:abcdef1-build");

        app.registry = Some(RegistryConfig {
            image: "ghcr.io/acme/api".to_string(),
            tag: None,
        });
        let names = ctx.image_names(&app, BuildStrategy::Nixpacks).unwrap();
        assert_eq!(names.production.to_string(), "ghcr.io/acme/api:abcdef1");
    }

    #[test]
    fn pull_requests_get_their_own_tag() {
        let app = ApplicationConfig::template();
        let ctx = BuildContext {
            pull_request_id: 42,
            ..context()
        };
        let names = ctx.image_names(&app, BuildStrategy::Dockerfile).unwrap();
        assert_eq!(names.production.tag(), Some("pr-42"));
    }

    #[test]
    fn digest_tags_resolve_to_digest_form() {
        let mut app = ApplicationConfig::template();
        app.image = Some(ImageSourceConfig {
            repository: "ghcr.io/acme/worker".to_string(),
            tag: Some("sha256-abcd1234".to_string()),
        });
        let names = context().image_names(&app, BuildStrategy::Image).unwrap();
        assert_eq!(
            names.production.to_string(),
            "ghcr.io/acme/worker@sha256:abcd1234"
        );
    }

    #[test]
    fn base_directory_is_joined() {
        let mut app = ApplicationConfig::template();
        if let Some(source) = app.source.as_mut() {
            source.base_directory = "/apps/web/".to_string();
        }
        assert_eq!(context().source_dir(&app), "/artifacts/dep1/apps/web");
        assert_eq!(join_path("/w", "/"), "/w");
    }
}
