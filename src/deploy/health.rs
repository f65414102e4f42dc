// ABOUTME: Bounded polling of a container's health state.
// ABOUTME: Sleeps the start period, polls at a fixed interval, dumps logs once on failure.

use std::fmt;

use crate::config::HealthcheckConfig;
use crate::executor::{CommandGroup, Phase, RemoteExecutor, shell_quote};

use super::DeployError;

const HEALTH_SLOT: &str = "health_status";

/// Terminal outcome of a health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    Healthy,
    /// The container reported `unhealthy`.
    Unhealthy,
    /// Retries ran out while the container was still in `last_status`.
    Exhausted { last_status: String },
}

impl HealthOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthOutcome::Healthy)
    }
}

impl fmt::Display for HealthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthOutcome::Healthy => f.write_str("healthy"),
            HealthOutcome::Unhealthy => f.write_str("container reported unhealthy"),
            HealthOutcome::Exhausted { last_status } => {
                write!(f, "retries exhausted while {last_status}")
            }
        }
    }
}

pub struct HealthChecker<'a> {
    pub config: &'a HealthcheckConfig,
    /// The image brings its own HEALTHCHECK.
    pub custom_healthcheck: bool,
    /// Container log lines dumped on failure.
    pub log_tail: u32,
}

fn inspect_command(container: &str) -> String {
    format!(
        "docker inspect --format='{{{{json .State.Health.Status}}}}' {}",
        shell_quote(container)
    )
}

fn parse_status(output: &str) -> String {
    let status = output.trim().trim_matches('"');
    if status.is_empty() || status == "null" {
        "starting".to_string()
    } else {
        status.to_string()
    }
}

impl HealthChecker<'_> {
    pub fn is_enabled(&self) -> bool {
        self.config.enabled || self.custom_healthcheck
    }

    /// Poll until healthy, unhealthy, or out of retries.
    ///
    /// Polls do not observe cancellation; the next phase boundary does.
    pub async fn wait(
        &self,
        exec: &mut RemoteExecutor,
        container: &str,
    ) -> Result<HealthOutcome, DeployError> {
        if !self.is_enabled() {
            exec.log()
                .info("Healthcheck not configured; treating the new container as healthy.");
            return Ok(HealthOutcome::Healthy);
        }

        let retries = self.config.retries.max(1);
        exec.log().info(format!(
            "Waiting for {container} to become healthy ({retries} attempts, {}s interval).",
            self.config.interval.as_secs()
        ));
        tokio::time::sleep(self.config.start_period).await;

        let mut last_status = "starting".to_string();
        for attempt in 1..=retries {
            exec.exec(
                Phase::HealthCheck,
                CommandGroup::in_helper(inspect_command(container))
                    .hidden()
                    .ignore_errors()
                    .save(HEALTH_SLOT),
            )
            .await?;
            last_status = parse_status(exec.slot(HEALTH_SLOT).unwrap_or_default());
            exec.log().info(format!(
                "Attempt {attempt} of {retries} | Healthcheck status: {last_status}"
            ));

            match last_status.as_str() {
                "healthy" => return Ok(HealthOutcome::Healthy),
                "unhealthy" => {
                    self.dump_logs(exec, container).await?;
                    return Ok(HealthOutcome::Unhealthy);
                }
                _ => {}
            }
            if attempt < retries {
                tokio::time::sleep(self.config.interval).await;
            }
        }

        self.dump_logs(exec, container).await?;
        Ok(HealthOutcome::Exhausted { last_status })
    }

    async fn dump_logs(&self, exec: &mut RemoteExecutor, container: &str) -> Result<(), DeployError> {
        exec.log()
            .warn(format!("Last {} log lines of {container}:", self.log_tail));
        exec.exec(
            Phase::HealthCheck,
            CommandGroup::in_helper(format!(
                "docker logs -n {} {} 2>&1",
                self.log_tail,
                shell_quote(container)
            ))
            .ignore_errors(),
        )
        .await?;
        Ok(())
    }
}
