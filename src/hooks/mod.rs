// ABOUTME: Pre- and post-deployment commands run inside application containers.
// ABOUTME: Pre runs in the outgoing container and can fail the run; post runs in the new one.

use std::collections::BTreeMap;
use std::fmt;

use crate::executor::{CommandGroup, ExecutorError, Phase, RemoteExecutor, shell_quote};
use crate::types::{ApplicationUuid, DeploymentUuid};

/// Points in a run where a user command executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before the rollout, in the currently running container. Failure aborts the run.
    PreDeployment,
    /// After a successful rollout, in the new container. Failure is a warning.
    PostDeployment,
}

impl HookPoint {
    pub fn name(&self) -> &'static str {
        match self {
            HookPoint::PreDeployment => "pre-deployment",
            HookPoint::PostDeployment => "post-deployment",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, HookPoint::PreDeployment)
    }

    fn phase(&self) -> Phase {
        match self {
            HookPoint::PreDeployment => Phase::PreDeployment,
            HookPoint::PostDeployment => Phase::PostDeployment,
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values exported to the command.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub application: ApplicationUuid,
    pub deployment: DeploymentUuid,
    pub image: String,
}

impl HookContext {
    pub fn to_env(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("SKIFF_APPLICATION", self.application.to_string()),
            ("SKIFF_DEPLOYMENT", self.deployment.to_string()),
            ("SKIFF_IMAGE", self.image.clone()),
        ])
    }
}

/// `docker exec` into an application container. Images may lack bash, so `sh`.
pub fn hook_command(container: &str, command: &str, context: &HookContext) -> String {
    let mut cmd = String::from("docker exec");
    for (key, value) in context.to_env() {
        cmd.push_str(&format!(" -e {}", shell_quote(&format!("{key}={value}"))));
    }
    cmd.push_str(&format!(
        " {} sh -c {}",
        shell_quote(container),
        shell_quote(command)
    ));
    cmd
}

/// Run a user command in `container`. The command's output is user-visible.
pub async fn run_hook(
    exec: &mut RemoteExecutor,
    point: HookPoint,
    container: &str,
    command: &str,
    context: &HookContext,
) -> Result<(), ExecutorError> {
    exec.log()
        .info(format!("Executing {point} command in {container}: {command}"));
    exec.run(
        point.phase(),
        [CommandGroup::in_helper(hook_command(container, command, context))],
    )
    .await?;
    tracing::info!(point = %point, container, "deployment command completed");
    Ok(())
}
