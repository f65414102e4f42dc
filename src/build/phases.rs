// ABOUTME: Build pipeline phases driven through the remote executor.
// ABOUTME: Phases take the current context and return what they learned instead of mutating it.

use crate::config::ApplicationConfig;
use crate::deploy::DeployError;
use crate::diagnostics::{Diagnostics, Warning};
use crate::env::{
    BUILDX_PROBE, BuildTimeEnv, BuilderCapabilities, EnvVar, EnvironmentVariableSet,
    SECRETS_HASH_VAR, SecretStrategy, VERSION_PROBE, add_secret_mounts, has_healthcheck,
    inject_build_args,
};
use crate::executor::{
    CommandGroup, ExecutorErrorKind, Phase, RemoteExecutor, decode_payload, shell_quote, write_file,
};
use crate::types::ImageRef;

use super::context::join_path;
use super::docker::{
    DockerBuild, declares_healthcheck, healthcheck_probe, local_image_probe, pull, push,
    registry_image_probe, tag,
};
use super::nixpacks::{GENERATED_DOCKERFILE, generate_command, plan_command, plan_variables};
use super::source::{clone_commands, ls_remote_command, parse_ls_remote, tracked_ref};
use super::{BuildContext, BuildStrategy, ImageNames, static_site};

type Result<T> = std::result::Result<T, DeployError>;

const COMMIT_SLOT: &str = "git_commit";
const LOCAL_IMAGE_SLOT: &str = "local_image";
const REGISTRY_IMAGE_SLOT: &str = "registry_image";
const VERSION_SLOT: &str = "docker_version";
const BUILDX_SLOT: &str = "buildx";
const FILE_SLOT: &str = "file_contents";
const PLAN_SLOT: &str = "nixpacks_plan";
const HEALTHCHECK_SLOT: &str = "image_healthcheck";

/// What the pre-build inspection learned about a Dockerfile-based build.
#[derive(Debug, Clone, Default)]
pub struct PreparedBuild {
    /// Where the rewritten Dockerfile is written before building.
    pub dockerfile_path: Option<String>,
    pub dockerfile: Option<String>,
    /// Build tool defaults, lowest precedence.
    pub detected: Vec<EnvVar>,
    /// The Dockerfile declares its own HEALTHCHECK.
    pub custom_healthcheck: bool,
}

/// Inputs of the variant-specific build step.
#[derive(Debug, Clone, Copy)]
pub struct ImageBuild<'a> {
    pub app: &'a ApplicationConfig,
    pub strategy: BuildStrategy,
    pub prepared: &'a PreparedBuild,
    pub env: &'a BuildTimeEnv,
    pub secrets: SecretStrategy,
    pub images: &'a ImageNames,
    pub static_image: &'a str,
}

/// Pin `HEAD` to the exact commit of the tracked ref. Explicit shas pass through.
pub async fn resolve_commit(
    exec: &mut RemoteExecutor,
    ctx: &BuildContext,
    app: &ApplicationConfig,
    strategy: BuildStrategy,
) -> Result<BuildContext> {
    let Some(source) = app.source.as_ref().filter(|_| strategy.needs_source()) else {
        return Ok(ctx.clone());
    };
    if !ctx.commit.is_head() {
        return Ok(ctx.clone());
    }

    let exact = tracked_ref(source, ctx.pull_request_id);
    exec.run(
        Phase::ResolveCommit,
        [CommandGroup::in_helper(ls_remote_command(source, &exact))
            .hidden()
            .save(COMMIT_SLOT)],
    )
    .await?;

    let commit = parse_ls_remote(exec.slot(COMMIT_SLOT).unwrap_or_default(), &exact)
        .ok_or_else(|| {
            DeployError::Source(format!("{exact} not found in {}", source.repository))
        })?;
    exec.log().info(format!("Resolved {exact} to {commit}."));
    Ok(ctx.with_commit(commit))
}

/// Whether the image already exists on the host, or in the registry when asked.
pub async fn image_exists(
    exec: &mut RemoteExecutor,
    image: &ImageRef,
    check_registry: bool,
) -> Result<bool> {
    exec.run(
        Phase::CheckImage,
        [CommandGroup::in_helper(local_image_probe(image))
            .hidden()
            .ignore_errors()
            .save(LOCAL_IMAGE_SLOT)],
    )
    .await?;
    if exec.non_empty_slot(LOCAL_IMAGE_SLOT).is_some() {
        return Ok(true);
    }
    if !check_registry {
        return Ok(false);
    }
    exec.exec(
        Phase::CheckImage,
        CommandGroup::in_helper(registry_image_probe(image))
            .hidden()
            .ignore_errors()
            .save(REGISTRY_IMAGE_SLOT),
    )
    .await?;
    Ok(exec.slot(REGISTRY_IMAGE_SLOT) == Some("found"))
}

/// Whether an image already on the host declares its own HEALTHCHECK.
///
/// Images only present in the registry cannot be inspected and count as having none.
pub async fn image_healthcheck(exec: &mut RemoteExecutor, image: &ImageRef) -> Result<bool> {
    exec.exec(
        Phase::CheckImage,
        CommandGroup::in_helper(healthcheck_probe(image))
            .hidden()
            .ignore_errors()
            .save(HEALTHCHECK_SLOT),
    )
    .await?;
    Ok(exec.slot(HEALTHCHECK_SLOT).is_some_and(declares_healthcheck))
}

/// Check out the pinned commit. Strategies that build nothing from the
/// repository skip the clone even when a source is configured.
pub async fn clone_source(
    exec: &mut RemoteExecutor,
    ctx: &BuildContext,
    app: &ApplicationConfig,
    strategy: BuildStrategy,
) -> Result<()> {
    let Some(source) = app.source.as_ref().filter(|_| strategy.needs_source()) else {
        return Ok(());
    };
    exec.log().info(format!(
        "Importing {}:{} ({}) to {}.",
        source.repository,
        source.branch,
        ctx.commit,
        ctx.workdir()
    ));
    let groups = clone_commands(source, &ctx.workdir(), &ctx.commit, ctx.pull_request_id)
        .into_iter()
        .map(CommandGroup::in_helper);
    exec.run(Phase::CloneSource, groups).await?;
    Ok(())
}

/// Decide how build-time variables reach the builder.
///
/// Probe failures are not errors: the build falls back to build arguments.
pub async fn probe_builder(
    exec: &mut RemoteExecutor,
    ctx: &BuildContext,
    app: &ApplicationConfig,
) -> Result<(BuildContext, SecretStrategy)> {
    if !app.use_build_secrets {
        return Ok((ctx.with_builder_secrets(false), SecretStrategy::BuildArgs));
    }

    exec.run(
        Phase::ProbeBuilder,
        [
            CommandGroup::in_helper(VERSION_PROBE)
                .hidden()
                .ignore_errors()
                .save(VERSION_SLOT),
            CommandGroup::in_helper(format!(
                "{BUILDX_PROBE} >/dev/null 2>&1 && echo yes || true"
            ))
            .hidden()
            .ignore_errors()
            .save(BUILDX_SLOT),
        ],
    )
    .await?;

    let capabilities = BuilderCapabilities::from_probe(
        exec.non_empty_slot(VERSION_SLOT),
        exec.slot(BUILDX_SLOT) == Some("yes"),
    );
    let (strategy, warning) = SecretStrategy::choose(true, &capabilities);
    if let Some(warning) = warning {
        tracing::warn!(host = %exec.host(), "{warning}");
        exec.log().hidden(warning);
    }
    Ok((
        ctx.with_builder_secrets(strategy == SecretStrategy::SecretMounts),
        strategy,
    ))
}

async fn read_file(exec: &mut RemoteExecutor, phase: Phase, path: &str) -> Result<String> {
    exec.run(
        phase,
        [CommandGroup::in_helper(format!("base64 -w0 {}", shell_quote(path)))
            .hidden()
            .save(FILE_SLOT)],
    )
    .await?;
    decode_payload(exec.slot(FILE_SLOT).unwrap_or_default())
        .ok_or_else(|| DeployError::Source(format!("{path} is not a readable text file")))
}

/// Locate or generate the Dockerfile and collect detected defaults.
pub async fn prepare_build(
    exec: &mut RemoteExecutor,
    ctx: &BuildContext,
    app: &ApplicationConfig,
    strategy: BuildStrategy,
    static_image: &str,
) -> Result<PreparedBuild> {
    let source_dir = ctx.source_dir(app);
    match strategy {
        BuildStrategy::Image | BuildStrategy::Compose => Ok(PreparedBuild::default()),
        BuildStrategy::DockerfileInline => {
            let dockerfile = app.dockerfile.inline.clone().unwrap_or_default();
            Ok(PreparedBuild {
                dockerfile_path: Some(ctx.generated_dockerfile_path()),
                custom_healthcheck: has_healthcheck(&dockerfile),
                dockerfile: Some(dockerfile),
                detected: vec![],
            })
        }
        BuildStrategy::Dockerfile => {
            let path = join_path(&source_dir, &app.dockerfile.location);
            let dockerfile = read_file(exec, Phase::Build, &path).await?;
            Ok(PreparedBuild {
                dockerfile_path: Some(path),
                custom_healthcheck: has_healthcheck(&dockerfile),
                dockerfile: Some(dockerfile),
                detected: vec![],
            })
        }
        BuildStrategy::Static => Ok(PreparedBuild {
            dockerfile_path: Some(ctx.generated_dockerfile_path()),
            dockerfile: Some(static_site::from_context(
                static_image,
                app.publish_directory.as_deref(),
            )),
            detected: vec![],
            custom_healthcheck: false,
        }),
        BuildStrategy::Nixpacks => {
            exec.log().info("Generating nixpacks build plan.");
            exec.run(
                Phase::Build,
                [
                    CommandGroup::in_helper(plan_command(&source_dir, &app.nixpacks))
                        .hidden()
                        .save(PLAN_SLOT),
                    CommandGroup::in_helper(generate_command(&source_dir, &app.nixpacks)),
                ],
            )
            .await?;
            let detected = plan_variables(exec.slot(PLAN_SLOT).unwrap_or_default())
                .map_err(|e| DeployError::Source(format!("unreadable nixpacks plan: {e}")))?;
            let path = join_path(&source_dir, GENERATED_DOCKERFILE);
            let dockerfile = read_file(exec, Phase::Build, &path).await?;
            Ok(PreparedBuild {
                dockerfile_path: Some(path),
                dockerfile: Some(dockerfile),
                detected,
                custom_healthcheck: false,
            })
        }
    }
}

/// Write a file to the durable configuration directory on the deploy host.
///
/// Failures are recorded, never raised.
async fn persist_config(
    exec: &mut RemoteExecutor,
    phase: Phase,
    ctx: &BuildContext,
    file_name: &str,
    contents: &str,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let dir = ctx.config_dir();
    let command = format!(
        "mkdir -p {} && {}",
        shell_quote(&dir),
        write_file(&join_path(&dir, file_name), contents)
    );
    let output = exec
        .exec(phase, CommandGroup::on_host(command).hidden().ignore_errors())
        .await?;
    if !output.success() {
        diagnostics.warn(Warning::config_write(format!(
            "could not write {file_name} to {dir}: {}",
            output.stderr.trim()
        )));
    }
    Ok(())
}

pub async fn write_compose(
    exec: &mut RemoteExecutor,
    ctx: &BuildContext,
    yaml: &str,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    exec.run(
        Phase::GenerateCompose,
        [CommandGroup::in_helper(write_file(&ctx.compose_path(), yaml)).hidden()],
    )
    .await?;
    persist_config(
        exec,
        Phase::GenerateCompose,
        ctx,
        "docker-compose.yaml",
        yaml,
        diagnostics,
    )
    .await
}

/// Read the user's compose file from the checkout.
pub async fn read_user_compose(
    exec: &mut RemoteExecutor,
    ctx: &BuildContext,
    app: &ApplicationConfig,
) -> Result<String> {
    let path = join_path(&ctx.source_dir(app), &app.compose.location);
    read_file(exec, Phase::GenerateCompose, &path).await
}

/// The build-time file lives beside the workdir, outside every build context.
pub async fn write_build_env(
    exec: &mut RemoteExecutor,
    ctx: &BuildContext,
    env: &BuildTimeEnv,
) -> Result<()> {
    exec.run(
        Phase::BuildTimeEnv,
        [CommandGroup::in_helper(write_file(
            &ctx.build_env_path(),
            &env.with_hash().to_env_file(),
        ))
        .hidden()],
    )
    .await?;
    exec.log()
        .info(format!("Prepared {} build-time variables.", env.vars().len()));
    Ok(())
}

/// Insert ARG declarations or secret mounts for the build-time keys.
pub fn rewrite_dockerfile(original: &str, keys: &[String], strategy: SecretStrategy) -> String {
    match strategy {
        SecretStrategy::BuildArgs => {
            let mut all: Vec<&str> = keys.iter().map(String::as_str).collect();
            all.push(SECRETS_HASH_VAR);
            inject_build_args(original, &all)
        }
        SecretStrategy::SecretMounts => {
            inject_build_args(&add_secret_mounts(original, keys), &[SECRETS_HASH_VAR])
        }
    }
}

/// Run the variant-specific build step.
pub async fn build_image(
    exec: &mut RemoteExecutor,
    ctx: &BuildContext,
    build: &ImageBuild<'_>,
) -> Result<()> {
    match build.strategy {
        BuildStrategy::Image => {
            exec.log()
                .info(format!("Pulling image {}.", build.images.production));
            exec.run(
                Phase::Build,
                [CommandGroup::in_helper(pull(&build.images.production))],
            )
            .await?;
            Ok(())
        }
        BuildStrategy::Compose => compose_build(exec, ctx, build.app).await,
        BuildStrategy::Nixpacks if build.app.nixpacks.is_static => {
            dockerfile_build(exec, ctx, build, &build.images.build).await?;
            let dockerfile = static_site::from_build_image(
                build.static_image,
                &build.images.build.to_string(),
                build.app.publish_directory.as_deref(),
            );
            let path = ctx.generated_dockerfile_path();
            exec.log().info(format!(
                "Building static image {}.",
                build.images.production
            ));
            let command = DockerBuild {
                dockerfile: &path,
                context: &ctx.source_dir(build.app),
                image: &build.images.production,
                env_file: &ctx.build_env_path(),
                strategy: SecretStrategy::BuildArgs,
                keys: &[],
                target: None,
            }
            .render();
            exec.run(
                Phase::Build,
                [
                    CommandGroup::in_helper(write_file(&path, &dockerfile)).hidden(),
                    CommandGroup::in_helper(command),
                ],
            )
            .await?;
            Ok(())
        }
        _ => dockerfile_build(exec, ctx, build, &build.images.production).await,
    }
}

async fn dockerfile_build(
    exec: &mut RemoteExecutor,
    ctx: &BuildContext,
    build: &ImageBuild<'_>,
    image: &ImageRef,
) -> Result<()> {
    let (Some(path), Some(original)) = (
        build.prepared.dockerfile_path.as_deref(),
        build.prepared.dockerfile.as_deref(),
    ) else {
        return Err(DeployError::Config(format!(
            "{} build has no Dockerfile",
            build.strategy
        )));
    };

    let keys = build.env.keys();
    let rewritten = rewrite_dockerfile(original, &keys, build.secrets);
    let target = match build.strategy {
        BuildStrategy::Dockerfile | BuildStrategy::DockerfileInline => {
            build.app.dockerfile.target.as_deref()
        }
        _ => None,
    };
    let context = if build.strategy.needs_source() {
        ctx.source_dir(build.app)
    } else {
        ctx.workdir()
    };
    let command = DockerBuild {
        dockerfile: path,
        context: &context,
        image,
        env_file: &ctx.build_env_path(),
        strategy: build.secrets,
        keys: &keys,
        target,
    }
    .render();

    exec.log().info(format!("Building image {image}."));
    exec.run(
        Phase::Build,
        [
            CommandGroup::in_helper(write_file(path, &rewritten)).hidden(),
            CommandGroup::in_helper(command),
        ],
    )
    .await?;
    exec.log().info(format!("Image {image} built."));
    Ok(())
}

async fn compose_build(
    exec: &mut RemoteExecutor,
    ctx: &BuildContext,
    app: &ApplicationConfig,
) -> Result<()> {
    let project_dir = shell_quote(&ctx.source_dir(app));
    let env = format!("set -a && . {} && set +a", shell_quote(&ctx.build_env_path()));
    let command = match app.compose.build_command.as_deref() {
        Some(custom) => format!("cd {project_dir} && {env} && {custom}"),
        None => format!(
            "{env} && docker compose --project-name {} --project-directory {project_dir} -f {} build",
            shell_quote(app.uuid.as_str()),
            shell_quote(&ctx.compose_path())
        ),
    };
    exec.log().info("Building compose services.");
    exec.run(Phase::Build, [CommandGroup::in_helper(command)])
        .await?;
    Ok(())
}

/// Runtime variables, written strictly after the build.
pub async fn write_runtime_env(
    exec: &mut RemoteExecutor,
    ctx: &BuildContext,
    app: &ApplicationConfig,
    strategy: BuildStrategy,
    runtime: &EnvironmentVariableSet,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let contents = runtime.to_env_file();
    let path = join_path(&ctx.project_dir(app, strategy), ".env");
    exec.run(
        Phase::RuntimeEnv,
        [CommandGroup::in_helper(write_file(&path, &contents)).hidden()],
    )
    .await?;
    persist_config(exec, Phase::RuntimeEnv, ctx, ".env", &contents, diagnostics).await
}

/// Push the production image and the optional extra tag.
///
/// Returns whether anything was pushed. Any push failure fails the run.
pub async fn publish(
    exec: &mut RemoteExecutor,
    ctx: &BuildContext,
    app: &ApplicationConfig,
    images: &ImageNames,
) -> Result<bool> {
    let Some(registry) = &app.registry else {
        return Ok(false);
    };

    let mut targets = vec![images.production.clone()];
    if ctx.pull_request_id == 0
        && let Some(extra) = registry.tag.as_deref().filter(|t| !t.is_empty())
    {
        let extra = images.production.with_tag(extra);
        exec.run(
            Phase::Publish,
            [CommandGroup::in_helper(tag(&images.production, &extra)).hidden()],
        )
        .await?;
        targets.push(extra);
    }

    for image in &targets {
        exec.log().info(format!("Pushing {image} to the registry."));
        exec.run(Phase::Publish, [CommandGroup::in_helper(push(image))])
            .await
            .map_err(|err| match err.kind() {
                ExecutorErrorKind::Cancelled => DeployError::Cancelled,
                _ => DeployError::RegistryPush {
                    image: image.to_string(),
                    reason: err.to_string(),
                },
            })?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_args_declare_hash_after_every_stage() {
        let df = "FROM node:20 AS build\nRUN npm ci\nFROM nginx\nCOPY --from=build /app /usr/share/nginx/html\n";
        let out = rewrite_dockerfile(df, &["API_KEY".to_string()], SecretStrategy::BuildArgs);
        assert_eq!(out.matches("ARG API_KEY").count(), 2);
        assert_eq!(out.matches(&format!("ARG {SECRETS_HASH_VAR}")).count(), 2);
    }

    #[test]
    fn secret_mounts_keep_values_out_of_args() {
        let df = "FROM node:20\nRUN npm ci\n";
        let out = rewrite_dockerfile(df, &["API_KEY".to_string()], SecretStrategy::SecretMounts);
        assert!(!out.contains("ARG API_KEY"));
        assert!(out.contains("--mount=type=secret,id=API_KEY,env=API_KEY"));
        assert!(out.contains(&format!("ARG {SECRETS_HASH_VAR}")));
    }
}
