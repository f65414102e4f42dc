// ABOUTME: One deployment run from connection to rollout, driven through remote executors.
// ABOUTME: Dispatches on branch and build strategy; learned state outlives the run for cleanup.

use std::sync::Arc;

use crate::build::compose::{decorate_user_compose, generate};
use crate::build::phases::{
    build_image, clone_source, image_exists, image_healthcheck, prepare_build, probe_builder,
    publish, read_user_compose, resolve_commit, write_build_env, write_compose, write_runtime_env,
};
use crate::build::{
    Branch, BuildContext, BuildStrategy, ImageBuild, ImageNames, config_fingerprint,
    docker, is_unchanged,
};
use crate::config::{ApplicationConfig, Manifest, OrchestratorSettings, ServerConfig};
use crate::diagnostics::Diagnostics;
use crate::env::{
    Discovery, EnvVar, EnvironmentMaterializer, discovery_vars, resolve_declarations,
};
use crate::executor::{
    CancellationProbe, CommandGroup, HelperSpec, Phase, RemoteExecutor,
};
use crate::hooks::{HookContext, HookPoint, run_hook};
use crate::transport::Connector;
use crate::types::ImageRef;

use super::health::HealthChecker;
use super::request::DeploymentRequest;
use super::rollout::{Rollout, RolloutReport, RolloutTarget, rolling_update};
use super::strategy::container_name;
use super::{DeployError, DeploymentLog};

type Result<T> = std::result::Result<T, DeployError>;

/// Executors of one run. The build host is absent when builds happen on the destination.
pub struct Hosts {
    pub deploy: RemoteExecutor,
    pub build: Option<RemoteExecutor>,
}

impl Hosts {
    /// Executor of the host that builds images.
    pub fn builder(&mut self) -> &mut RemoteExecutor {
        match &mut self.build {
            Some(build) => build,
            None => &mut self.deploy,
        }
    }
}

/// What a run learned, kept for the post-deployment phase.
#[derive(Debug, Default)]
pub struct Progress {
    pub context: Option<BuildContext>,
    pub image: Option<ImageRef>,
    /// Set once the build step starts; removed again if the run fails.
    pub built_image: Option<ImageRef>,
    pub config_hash: Option<String>,
    pub rollout: Option<RolloutReport>,
    /// The existing image was restarted without a build.
    pub restarted: bool,
}

#[derive(Default)]
pub struct RunState {
    pub hosts: Option<Hosts>,
    pub progress: Progress,
    pub diagnostics: Diagnostics,
}

pub struct Pipeline<'a> {
    pub manifest: &'a Manifest,
    pub connector: &'a dyn Connector,
    pub log: DeploymentLog,
    pub probe: Arc<dyn CancellationProbe>,
    /// Fingerprint saved by the last successful run, if the store has one.
    pub last_config_hash: Option<String>,
}

fn helper_spec(settings: &OrchestratorSettings, server: &ServerConfig, ctx: &BuildContext) -> HelperSpec {
    HelperSpec {
        image: settings.helper_image.clone(),
        network: server.network.clone(),
        workdir: ctx.workdir(),
        env: Vec::new(),
        registry_credentials: server.registry_credentials.clone(),
    }
}

impl Pipeline<'_> {
    /// Run one request. Executors and progress land in `state` as soon as they
    /// exist, so the caller can clean up after failures and timeouts.
    pub async fn execute(&self, request: &DeploymentRequest, state: &mut RunState) -> Result<()> {
        let manifest = self.manifest;
        let app = &manifest.application;
        let settings = &manifest.settings;

        let server = manifest.server(&request.server)?;
        if !server.reachable {
            return Err(DeployError::Config(format!(
                "server {} is not reachable",
                server.reference()
            )));
        }

        let strategy = BuildStrategy::for_application(app);
        let branch = Branch::select(request.restart_only, request.pull_request_id, strategy);
        let materializer = EnvironmentMaterializer::new(settings.resolve_secrets_key()?);
        let build_server = match &manifest.build_server {
            Some(build) if strategy != BuildStrategy::Compose => build.clone(),
            _ => server.clone(),
        };

        let ctx = BuildContext {
            deployment: request.uuid.clone(),
            application: app.uuid.clone(),
            deploy_server: server.clone(),
            build_server: build_server.clone(),
            artifacts_dir: settings.artifacts_dir.clone(),
            data_dir: settings.data_dir.clone(),
            container_name: container_name(app, request.uuid.as_str(), request.pull_request_id),
            commit: request.commit.clone(),
            branch: app
                .source
                .as_ref()
                .map(|s| s.branch.clone())
                .unwrap_or_default(),
            pull_request_id: request.pull_request_id,
            builder_secrets_supported: false,
        };
        state.progress.context = Some(ctx.clone());
        self.log.info(format!(
            "Starting deployment {} of {} to {} ({branch}).",
            request.uuid,
            app.name,
            server.reference()
        ));
        tracing::info!(
            deployment = %request.uuid,
            application = %app.uuid,
            server = server.reference(),
            branch = %branch,
            "deployment started"
        );

        let deploy = self.open(server, &ctx).await?;
        let hosts = state.hosts.insert(Hosts {
            deploy,
            build: None,
        });
        hosts.deploy.start_helper(&helper_spec(settings, server, &ctx)).await?;
        if ctx.uses_build_server() {
            self.log.info(format!(
                "Building on {}; the image reaches {} through the registry.",
                build_server.reference(),
                server.reference()
            ));
            let build = hosts.build.insert(self.open(&build_server, &ctx).await?);
            build.start_helper(&helper_spec(settings, &build_server, &ctx)).await?;
        }

        let mut run = Run {
            manifest,
            request,
            strategy,
            materializer,
            log: &self.log,
            last_config_hash: self.last_config_hash.as_deref(),
            hosts,
            progress: &mut state.progress,
            diagnostics: &mut state.diagnostics,
        };
        run.dispatch(ctx, branch).await
    }

    async fn open(&self, server: &ServerConfig, ctx: &BuildContext) -> Result<RemoteExecutor> {
        let transport = self
            .connector
            .connect(server)
            .await
            .map_err(|source| DeployError::Transport {
                server: server.reference().to_string(),
                source,
            })?;
        Ok(RemoteExecutor::new(
            transport,
            &ctx.deployment,
            server.host.clone(),
            self.log.clone(),
        )
        .with_probe(self.probe.clone()))
    }
}

struct Run<'a> {
    manifest: &'a Manifest,
    request: &'a DeploymentRequest,
    strategy: BuildStrategy,
    materializer: EnvironmentMaterializer,
    log: &'a DeploymentLog,
    last_config_hash: Option<&'a str>,
    hosts: &'a mut Hosts,
    progress: &'a mut Progress,
    diagnostics: &'a mut Diagnostics,
}

impl Run<'_> {
    async fn dispatch(&mut self, ctx: BuildContext, branch: Branch) -> Result<()> {
        let ctx = match branch {
            Branch::RestartOnly(BuildStrategy::Compose) => {
                self.log
                    .info("Compose applications are rebuilt on restart.");
                ctx
            }
            Branch::RestartOnly(_) => match self.try_restart(&ctx).await? {
                None => return Ok(()),
                Some(resolved) => {
                    let next = branch.without_restart(ctx.pull_request_id);
                    self.log
                        .info(format!("No existing image to restart; continuing as {next}."));
                    resolved
                }
            },
            Branch::PullRequest { id, .. } => {
                self.log.info(format!("Deploying pull request #{id}."));
                ctx
            }
            Branch::Standard(_) => ctx,
        };
        self.build_and_deploy(ctx).await
    }

    /// Restart from the existing image. Returns the resolved context when no
    /// image exists and the run must build after all.
    async fn try_restart(&mut self, ctx: &BuildContext) -> Result<Option<BuildContext>> {
        let app = &self.manifest.application;
        let ctx = resolve_commit(&mut self.hosts.deploy, ctx, app, self.strategy).await?;
        let images = ctx.image_names(app, self.strategy)?;
        if !image_exists(&mut self.hosts.deploy, &images.production, app.registry.is_some()).await? {
            return Ok(Some(ctx));
        }

        self.log
            .info(format!("Restarting with existing image {}.", images.production));
        let user = resolve_declarations(app.env_for(ctx.pull_request_id))?;
        self.deploy_existing(&ctx, &images, &user).await?;
        self.progress.restarted = true;
        Ok(None)
    }

    async fn can_skip_build(&mut self, images: &ImageNames, fingerprint: &str) -> Result<bool> {
        let manifest = self.manifest;
        let app = &manifest.application;
        if self.request.force_rebuild || self.strategy == BuildStrategy::Compose {
            return Ok(false);
        }
        let additional = self.request.server != manifest.primary_server().reference();
        let unchanged = match self.last_config_hash {
            Some(previous) => previous == fingerprint,
            None => is_unchanged(app, fingerprint),
        };
        if !(additional || unchanged || self.request.rollback) {
            return Ok(false);
        }
        image_exists(&mut self.hosts.deploy, &images.production, app.registry.is_some()).await
    }

    async fn build_and_deploy(&mut self, ctx: BuildContext) -> Result<()> {
        let manifest = self.manifest;
        let app = &manifest.application;
        let settings = &manifest.settings;
        let strategy = self.strategy;

        let ctx = resolve_commit(self.hosts.builder(), &ctx, app, strategy).await?;
        if self.request.commit.is_head() && !ctx.commit.is_head() {
            let spec = helper_spec(settings, &ctx.build_server, &ctx)
                .with_env("SOURCE_COMMIT", ctx.commit.tag());
            self.hosts.builder().restart_helper(&spec).await?;
        }
        self.progress.context = Some(ctx.clone());

        let images = ctx.image_names(app, strategy)?;
        self.progress.image = Some(images.production.clone());
        let user = resolve_declarations(app.env_for(ctx.pull_request_id))?;
        let fingerprint = config_fingerprint(app, &user).map_err(|e| {
            DeployError::Config(format!("cannot fingerprint the configuration: {e}"))
        })?;
        self.progress.config_hash = Some(fingerprint.clone());

        if self.can_skip_build(&images, &fingerprint).await? {
            self.log
                .info(format!("Image {} found; skipping build.", images.production));
            return self.deploy_existing(&ctx, &images, &user).await;
        }

        let builder = self.hosts.builder();
        clone_source(builder, &ctx, app, strategy).await?;
        let (ctx, secrets) = probe_builder(builder, &ctx, app).await?;
        let prepared = prepare_build(builder, &ctx, app, strategy, &settings.static_image).await?;

        let compose = match strategy {
            BuildStrategy::Compose => {
                let original = read_user_compose(builder, &ctx, app).await?;
                decorate_user_compose(&original, app, &ctx)
            }
            _ => generate(
                app,
                &ctx,
                &images.production.to_string(),
                prepared.custom_healthcheck,
            )
            .to_yaml(),
        }
        .map_err(|e| DeployError::Config(format!("invalid compose file: {e}")))?;
        write_compose(&mut self.hosts.deploy, &ctx, &compose, self.diagnostics).await?;

        let discovery = discovery_vars(&Discovery {
            app,
            branch: &ctx.branch,
            pull_request_id: ctx.pull_request_id,
            container_name: None,
        });
        let source_commit = app
            .include_source_commit
            .then(|| ctx.commit.tag().to_string());
        let env = self.materializer.build_time(
            &user,
            &discovery,
            &prepared.detected,
            source_commit.as_deref(),
        )?;
        let builder = self.hosts.builder();
        write_build_env(builder, &ctx, &env).await?;

        if strategy.uses_dockerfile() {
            self.progress.built_image = Some(images.production.clone());
        }
        let build = ImageBuild {
            app,
            strategy,
            prepared: &prepared,
            env: &env,
            secrets,
            images: &images,
            static_image: &settings.static_image,
        };
        build_image(builder, &ctx, &build).await?;

        self.write_runtime(&ctx, &user).await?;

        if strategy.uses_dockerfile() {
            publish(self.hosts.builder(), &ctx, app, &images).await?;
        }
        if ctx.uses_build_server() {
            self.log.info(format!(
                "Pulling {} on {}.",
                images.production,
                ctx.deploy_server.reference()
            ));
            self.hosts
                .deploy
                .run(
                    Phase::Publish,
                    [CommandGroup::in_helper(docker::pull(&images.production))],
                )
                .await?;
        }

        self.roll_out(&ctx, prepared.custom_healthcheck).await
    }

    /// Compose, runtime variables and rollout for an image that already exists.
    async fn deploy_existing(
        &mut self,
        ctx: &BuildContext,
        images: &ImageNames,
        user: &[EnvVar],
    ) -> Result<()> {
        let app = &self.manifest.application;
        self.progress.image = Some(images.production.clone());
        let custom_healthcheck =
            image_healthcheck(&mut self.hosts.deploy, &images.production).await?;
        let compose = generate(app, ctx, &images.production.to_string(), custom_healthcheck)
            .to_yaml()
            .map_err(|e| DeployError::Config(format!("invalid compose file: {e}")))?;
        write_compose(&mut self.hosts.deploy, ctx, &compose, self.diagnostics).await?;
        self.write_runtime(ctx, user).await?;
        self.roll_out(ctx, custom_healthcheck).await
    }

    async fn write_runtime(&mut self, ctx: &BuildContext, user: &[EnvVar]) -> Result<()> {
        let app = &self.manifest.application;
        let discovery = discovery_vars(&Discovery {
            app,
            branch: &ctx.branch,
            pull_request_id: ctx.pull_request_id,
            container_name: Some(&ctx.container_name),
        });
        let runtime = self.materializer.runtime(user, &discovery);
        write_runtime_env(
            &mut self.hosts.deploy,
            ctx,
            app,
            self.strategy,
            &runtime,
            self.diagnostics,
        )
        .await
    }

    async fn roll_out(&mut self, ctx: &BuildContext, custom_healthcheck: bool) -> Result<()> {
        let manifest = self.manifest;
        let app: &ApplicationConfig = &manifest.application;
        let exec = &mut self.hosts.deploy;
        let target = RolloutTarget {
            app,
            ctx,
            build: self.strategy,
        };

        let prepared = Rollout::prepare(exec, &target).await?;
        if let Some(command) = app.pre_deployment_command.as_deref() {
            match prepared.old_containers().first() {
                Some(old) => {
                    let hook = HookContext {
                        application: app.uuid.clone(),
                        deployment: ctx.deployment.clone(),
                        image: self
                            .progress
                            .image
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_default(),
                    };
                    run_hook(exec, HookPoint::PreDeployment, old, command, &hook).await?;
                }
                None => self
                    .log
                    .info("No running container; skipping the pre-deployment command."),
            }
        }

        let checker = HealthChecker {
            config: &app.healthcheck,
            custom_healthcheck,
            log_tail: manifest.settings.log_tail,
        };
        let report = rolling_update(exec, prepared, &target, &checker).await?;
        self.log
            .info(format!("Container {} is up.", report.container));
        self.progress.rollout = Some(report);
        Ok(())
    }
}
