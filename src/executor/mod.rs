// ABOUTME: Remote executor running shell command groups inside a per-run helper container.
// ABOUTME: Owns the helper lifecycle, captured output slots, and cancellation checkpoints.

mod command;
mod error;
mod phase;

pub use command::{CommandGroup, Target, decode_payload, docker_exec, shell_quote, write_file};
pub use error::{ExecutorError, ExecutorErrorKind};
pub use phase::Phase;

use async_trait::async_trait;
use snafu::ResultExt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::deploy::{DeploymentLog, LogStream};
use crate::transport::{CommandOutput, Transport};
use crate::types::DeploymentUuid;
use error::{CancelledSnafu, CommandFailedSnafu, HelperNotRunningSnafu, TransportSnafu};

pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Host path of the container engine socket mounted into helpers.
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Answers whether the run has been cancelled. Consulted before each phase.
#[async_trait]
pub trait CancellationProbe: Send + Sync {
    async fn is_cancelled(&self) -> bool;
}

/// How to create the helper container on a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperSpec {
    pub image: String,
    pub network: String,
    pub workdir: String,
    pub env: Vec<(String, String)>,
    /// Host path of a docker `config.json`, mounted read-only.
    pub registry_credentials: Option<String>,
}

impl HelperSpec {
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.env.retain(|(k, _)| *k != key);
        self.env.push((key, value.into()));
        self
    }

    fn run_command(&self, name: &str) -> String {
        let mut cmd = format!(
            "docker run -d --network {} --name {} --rm",
            shell_quote(&self.network),
            shell_quote(name)
        );
        for (key, value) in &self.env {
            cmd.push_str(&format!(" -e {}", shell_quote(&format!("{key}={value}"))));
        }
        cmd.push_str(&format!(" -v {DOCKER_SOCKET}:{DOCKER_SOCKET}"));
        if let Some(creds) = &self.registry_credentials {
            cmd.push_str(&format!(
                " -v {}:/root/.docker/config.json:ro",
                shell_quote(creds)
            ));
        }
        cmd.push(' ');
        cmd.push_str(&shell_quote(&self.image));
        cmd
    }
}

/// Executes command groups on one host on behalf of one deployment.
pub struct RemoteExecutor {
    transport: Arc<dyn Transport>,
    helper: String,
    host: String,
    log: DeploymentLog,
    probe: Option<Arc<dyn CancellationProbe>>,
    slots: HashMap<String, String>,
    running: bool,
}

impl std::fmt::Debug for RemoteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteExecutor")
            .field("helper", &self.helper)
            .field("host", &self.host)
            .field("running", &self.running)
            .finish()
    }
}

impl RemoteExecutor {
    /// The helper container is named after the deployment, one per run per host.
    pub fn new(
        transport: Arc<dyn Transport>,
        deployment: &DeploymentUuid,
        host: impl Into<String>,
        log: DeploymentLog,
    ) -> Self {
        Self {
            transport,
            helper: deployment.to_string(),
            host: host.into(),
            log,
            probe: None,
            slots: HashMap::new(),
            running: false,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn CancellationProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn helper_name(&self) -> &str {
        &self.helper
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn log(&self) -> &DeploymentLog {
        &self.log
    }

    /// Create the helper container and its working directory.
    pub async fn start_helper(&mut self, spec: &HelperSpec) -> Result<()> {
        self.checkpoint(Phase::HelperStart).await?;
        self.log
            .info(format!("Preparing helper container on {}.", self.host));
        self.launch(spec).await
    }

    /// Replace the helper with one carrying an updated environment.
    ///
    /// Running containers cannot change their environment, so the old helper
    /// is stopped and a fresh one created under the same name.
    pub async fn restart_helper(&mut self, spec: &HelperSpec) -> Result<()> {
        self.checkpoint(Phase::HelperStart).await?;
        self.log.hidden(format!("Restarting helper container {}.", self.helper));
        self.running = false;
        self.launch(spec).await
    }

    async fn launch(&mut self, spec: &HelperSpec) -> Result<()> {
        let remove = format!(
            "docker rm -f {} >/dev/null 2>&1 || true",
            shell_quote(&self.helper)
        );
        self.exec(
            Phase::HelperStart,
            CommandGroup::on_host(remove).hidden().ignore_errors(),
        )
        .await?;
        self.exec(
            Phase::HelperStart,
            CommandGroup::on_host(spec.run_command(&self.helper)).hidden(),
        )
        .await?;
        self.running = true;
        self.exec(
            Phase::HelperStart,
            CommandGroup::in_helper(format!("mkdir -p {}", shell_quote(&spec.workdir))).hidden(),
        )
        .await?;
        Ok(())
    }

    /// Run a phase: check for cancellation, then execute each group in order.
    pub async fn run<I>(&mut self, phase: Phase, groups: I) -> Result<()>
    where
        I: IntoIterator<Item = CommandGroup>,
    {
        self.checkpoint(phase).await?;
        for group in groups {
            self.exec(phase, group).await?;
        }
        Ok(())
    }

    /// Execute one group without a cancellation checkpoint.
    pub async fn exec(&mut self, phase: Phase, group: CommandGroup) -> Result<CommandOutput> {
        if group.target == Target::Helper && !self.running {
            return HelperNotRunningSnafu {
                helper: self.helper.clone(),
            }
            .fail();
        }

        let rendered = group.render(&self.helper);
        self.log.hidden(format!("[{phase}] {}", group.command));

        let output = self
            .transport
            .exec(&rendered)
            .await
            .context(TransportSnafu { phase })?;

        for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
            self.log.emit(LogStream::Stdout, line, group.hidden);
        }
        for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
            self.log.emit(LogStream::Stderr, line, group.hidden);
        }

        if let Some(slot) = &group.save {
            self.slots
                .insert(slot.clone(), output.stdout.trim().to_string());
        }

        if !output.success() && !group.ignore_errors {
            tracing::debug!(
                phase = %phase,
                exit_code = output.exit_code,
                host = %self.host,
                "remote command failed"
            );
            return CommandFailedSnafu {
                phase,
                exit_code: output.exit_code,
                stderr: error::stderr_tail(&output.stderr),
            }
            .fail();
        }

        Ok(output)
    }

    /// Captured output of an earlier group.
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str)
    }

    /// Captured output, treating empty output as absent.
    pub fn non_empty_slot(&self, name: &str) -> Option<&str> {
        self.slot(name).filter(|v| !v.is_empty())
    }

    pub async fn checkpoint(&self, phase: Phase) -> Result<()> {
        if let Some(probe) = &self.probe
            && probe.is_cancelled().await
        {
            tracing::info!(phase = %phase, helper = %self.helper, "cancellation observed");
            return CancelledSnafu { phase }.fail();
        }
        Ok(())
    }

    /// Remove the helper container. Safe to call when it never started.
    pub async fn teardown(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        let remove = format!("docker rm -f {}", shell_quote(&self.helper));
        self.exec(Phase::Cleanup, CommandGroup::on_host(remove).hidden())
            .await?;
        self.running = false;
        Ok(())
    }
}
