// ABOUTME: Health-gated container swap using the type state pattern.
// ABOUTME: The old container is stopped only after the new one reports healthy.

use std::time::Duration;

use crate::build::{BuildContext, BuildStrategy};
use crate::build::labels::{LABEL_APPLICATION, LABEL_PULL_REQUEST};
use crate::config::ApplicationConfig;
use crate::executor::{CommandGroup, Phase, RemoteExecutor, shell_quote};

use super::DeployError;
use super::health::HealthChecker;
use super::state::{Completed, Healthy, Prepared, Started};
use super::strategy::RolloutStrategy;

const OLD_CONTAINERS_SLOT: &str = "old_containers";

/// Result type for transitions that hand the previous state back on failure.
pub type TransitionResult<T, S> = Result<Rollout<T>, (Rollout<S>, DeployError)>;

/// A container swap in progress, parameterized by its current state.
#[derive(Debug)]
pub struct Rollout<S> {
    container: String,
    old: Vec<String>,
    strategy: RolloutStrategy,
    _state: S,
}

/// What a completed rollout did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutReport {
    pub container: String,
    pub strategy: RolloutStrategy,
    pub retired: Vec<String>,
}

/// Where and what to start.
#[derive(Debug, Clone, Copy)]
pub struct RolloutTarget<'a> {
    pub app: &'a ApplicationConfig,
    pub ctx: &'a BuildContext,
    pub build: BuildStrategy,
}

impl<S> Rollout<S> {
    fn transition<T>(self, state: T) -> Rollout<T> {
        Rollout {
            container: self.container,
            old: self.old,
            strategy: self.strategy,
            _state: state,
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn old_containers(&self) -> &[String] {
        &self.old
    }

    pub fn strategy(&self) -> RolloutStrategy {
        self.strategy
    }
}

fn list_command(app: &ApplicationConfig, pull_request_id: u32) -> String {
    format!(
        "docker ps -a --filter {} --filter {} --format '{{{{.Names}}}}'",
        shell_quote(&format!("label={LABEL_APPLICATION}={}", app.uuid)),
        shell_quote(&format!("label={LABEL_PULL_REQUEST}={pull_request_id}")),
    )
}

fn stop_command(container: &str, timeout: Duration) -> String {
    let name = shell_quote(container);
    format!(
        "docker stop --time={} {name} >/dev/null 2>&1; docker rm -f {name} >/dev/null 2>&1",
        timeout.as_secs()
    )
}

fn start_command(strategy: RolloutStrategy, target: &RolloutTarget<'_>) -> String {
    let ctx = target.ctx;
    let compose = shell_quote(&ctx.compose_path());
    match strategy {
        RolloutStrategy::ComposeUp => {
            let project_dir = shell_quote(&ctx.source_dir(target.app));
            match target.app.compose.start_command.as_deref() {
                Some(custom) => format!("cd {project_dir} && {custom}"),
                None => format!(
                    "docker compose --project-name {} --project-directory {project_dir} -f {compose} up -d --remove-orphans",
                    shell_quote(target.app.uuid.as_str())
                ),
            }
        }
        RolloutStrategy::Swarm => format!(
            "docker stack deploy --detach=true --with-registry-auth -c {compose} {}",
            shell_quote(target.app.uuid.as_str())
        ),
        RolloutStrategy::ZeroDowntime | RolloutStrategy::StopThenStart { .. } => format!(
            "docker compose --project-name {} --project-directory {} -f {compose} up -d",
            shell_quote(ctx.deployment.as_str()),
            shell_quote(&ctx.workdir())
        ),
    }
}

impl Rollout<Prepared> {
    /// Choose the strategy and find the containers the new one replaces.
    pub async fn prepare(
        exec: &mut RemoteExecutor,
        target: &RolloutTarget<'_>,
    ) -> Result<Self, DeployError> {
        let ctx = target.ctx;
        let strategy = RolloutStrategy::for_run(
            target.app,
            ctx.deploy_server.topology,
            target.build,
            ctx.pull_request_id,
        );

        let old = match strategy {
            RolloutStrategy::ZeroDowntime | RolloutStrategy::StopThenStart { .. } => {
                exec.run(
                    Phase::RollingUpdate,
                    [CommandGroup::in_helper(list_command(target.app, ctx.pull_request_id))
                        .hidden()
                        .save(OLD_CONTAINERS_SLOT)],
                )
                .await?;
                exec.slot(OLD_CONTAINERS_SLOT)
                    .unwrap_or_default()
                    .lines()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .filter(|name| !strategy.is_zero_downtime() || *name != ctx.container_name)
                    .map(str::to_string)
                    .collect()
            }
            RolloutStrategy::ComposeUp | RolloutStrategy::Swarm => Vec::new(),
        };

        Ok(Rollout {
            container: ctx.container_name.clone(),
            old,
            strategy,
            _state: Prepared,
        })
    }

    /// Start the new version. The stop-then-start fallback retires old containers first.
    #[must_use = "rollout state must be used"]
    pub async fn start(
        mut self,
        exec: &mut RemoteExecutor,
        target: &RolloutTarget<'_>,
    ) -> TransitionResult<Started, Prepared> {
        if let RolloutStrategy::StopThenStart { reason } = self.strategy
            && !self.old.is_empty()
        {
            exec.log().warn(format!(
                "Stopping the running container before starting the new one ({reason}); expect brief downtime."
            ));
            let stops: Vec<CommandGroup> = self
                .old
                .iter()
                .map(|old| {
                    CommandGroup::in_helper(stop_command(old, target.app.stop.timeout))
                        .ignore_errors()
                })
                .collect();
            if let Err(err) = exec.run(Phase::RollingUpdate, stops).await {
                return Err((self, err.into()));
            }
            self.old.clear();
        }

        exec.log().info(format!("Starting {}.", self.container));
        let command = start_command(self.strategy, target);
        match exec
            .run(Phase::RollingUpdate, [CommandGroup::in_helper(command)])
            .await
        {
            Ok(()) => Ok(self.transition(Started)),
            Err(err) => Err((self, err.into())),
        }
    }
}

impl Rollout<Started> {
    /// Gate on the health checker. Compose and swarm rollouts are not gated.
    #[must_use = "rollout state must be used"]
    pub async fn health_check(
        self,
        exec: &mut RemoteExecutor,
        checker: &HealthChecker<'_>,
    ) -> TransitionResult<Healthy, Started> {
        if matches!(
            self.strategy,
            RolloutStrategy::ComposeUp | RolloutStrategy::Swarm
        ) {
            return Ok(self.transition(Healthy));
        }
        match checker.wait(exec, &self.container).await {
            Ok(outcome) if outcome.is_healthy() => {
                exec.log().info(format!("New container {} is healthy.", self.container));
                Ok(self.transition(Healthy))
            }
            Ok(outcome) => {
                let err = DeployError::HealthCheck {
                    container: self.container.clone(),
                    reason: outcome.to_string(),
                };
                Err((self, err))
            }
            Err(err) => Err((self, err)),
        }
    }

    /// Remove the new container; the old ones keep running.
    pub async fn discard(self, exec: &mut RemoteExecutor) -> Result<Rollout<Prepared>, DeployError> {
        exec.exec(
            Phase::RollingUpdate,
            CommandGroup::in_helper(format!(
                "docker rm -f {} >/dev/null 2>&1",
                shell_quote(&self.container)
            ))
            .hidden()
            .ignore_errors(),
        )
        .await?;
        exec.log().warn(format!(
            "Removed the new container {}; the previous version keeps running.",
            self.container
        ));
        Ok(self.transition(Prepared))
    }
}

impl Rollout<Healthy> {
    /// Stop and remove every old container.
    #[must_use = "rollout state must be used"]
    pub async fn retire_old(
        self,
        exec: &mut RemoteExecutor,
        stop_timeout: Duration,
    ) -> Result<Rollout<Completed>, DeployError> {
        if !self.old.is_empty() {
            exec.log().info(format!("Removing old containers: {}.", self.old.join(", ")));
            let stops: Vec<CommandGroup> = self
                .old
                .iter()
                .map(|old| CommandGroup::in_helper(stop_command(old, stop_timeout)).ignore_errors())
                .collect();
            exec.run(Phase::RollingUpdate, stops).await?;
        }
        Ok(self.transition(Completed))
    }
}

impl Rollout<Completed> {
    pub fn finish(self) -> RolloutReport {
        RolloutReport {
            container: self.container,
            strategy: self.strategy,
            retired: self.old,
        }
    }
}

/// Run a prepared rollout to completion.
///
/// On a failed health check the zero-downtime path removes the new container
/// and leaves the old one running. The stop-then-start fallback keeps the new
/// container, since the old one is already gone.
pub async fn rolling_update(
    exec: &mut RemoteExecutor,
    prepared: Rollout<Prepared>,
    target: &RolloutTarget<'_>,
    checker: &HealthChecker<'_>,
) -> Result<RolloutReport, DeployError> {
    let strategy = prepared.strategy();
    let started = prepared.start(exec, target).await.map_err(|(_, err)| err)?;

    let healthy = match started.health_check(exec, checker).await {
        Ok(healthy) => healthy,
        Err((started, err)) => {
            if strategy.is_zero_downtime() {
                if let Err(cleanup) = started.discard(exec).await {
                    tracing::warn!(error = %cleanup, "could not remove the unhealthy container");
                }
            } else {
                exec.log().warn(format!(
                    "Keeping unhealthy container {}; there is no previous container to fall back to.",
                    started.container()
                ));
            }
            return Err(err);
        }
    };

    let completed = healthy.retire_old(exec, target.app.stop.timeout).await?;
    let report = completed.finish();
    tracing::info!(
        container = %report.container,
        retired = report.retired.len(),
        strategy = ?report.strategy,
        "rollout completed"
    );
    Ok(report)
}
