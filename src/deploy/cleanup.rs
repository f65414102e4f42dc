// ABOUTME: Post-deployment steps that run after every outcome.
// ABOUTME: Each step is caught on its own; failures become warnings, never a different outcome.

use crate::build::docker::remove_image;
use crate::config::ApplicationConfig;
use crate::diagnostics::{Warning, WarningKind};
use crate::executor::{CommandGroup, Phase};
use crate::hooks::{HookContext, HookPoint, run_hook};

use super::DeployError;
use super::pipeline::RunState;

/// Run the post-deployment steps for a finished pipeline.
///
/// `failure` is the error the run ended with, if any.
pub async fn finalize(state: &mut RunState, app: &ApplicationConfig, failure: Option<&DeployError>) {
    if failure.is_none() {
        post_deployment_command(state, app).await;
    }
    if let Some(err) = failure
        && !err.is_cancellation()
    {
        remove_failed_image(state).await;
    }
    teardown_helpers(state).await;
}

async fn post_deployment_command(state: &mut RunState, app: &ApplicationConfig) {
    let Some(command) = app.post_deployment_command.as_deref() else {
        return;
    };
    let (Some(hosts), Some(rollout), Some(ctx)) = (
        state.hosts.as_mut(),
        state.progress.rollout.as_ref(),
        state.progress.context.as_ref(),
    ) else {
        return;
    };

    let hook = HookContext {
        application: app.uuid.clone(),
        deployment: ctx.deployment.clone(),
        image: state
            .progress
            .image
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
    };
    if let Err(err) = run_hook(
        &mut hosts.deploy,
        HookPoint::PostDeployment,
        &rollout.container,
        command,
        &hook,
    )
    .await
    {
        state.diagnostics.warn(Warning::new(
            WarningKind::PostDeploymentCommand,
            format!("post-deployment command failed: {err}"),
        ));
    }
}

async fn remove_failed_image(state: &mut RunState) {
    let (Some(hosts), Some(image)) = (state.hosts.as_mut(), state.progress.built_image.as_ref())
    else {
        return;
    };
    let builder = hosts.builder();
    if !builder.is_running() {
        return;
    }
    builder
        .log()
        .info(format!("Removing image {image} of the failed build."));
    if let Err(err) = builder
        .exec(
            Phase::Cleanup,
            CommandGroup::in_helper(remove_image(image)).hidden(),
        )
        .await
    {
        state.diagnostics.warn(Warning::new(
            WarningKind::ImageCleanup,
            format!("could not remove {image}: {err}"),
        ));
    }
}

async fn teardown_helpers(state: &mut RunState) {
    let Some(hosts) = state.hosts.as_mut() else {
        return;
    };
    let executors = std::iter::once(&mut hosts.deploy).chain(hosts.build.as_mut());
    for exec in executors {
        if let Err(err) = exec.teardown().await {
            state.diagnostics.warn(Warning::helper_teardown(format!(
                "could not remove helper {} on {}: {err}",
                exec.helper_name(),
                exec.host()
            )));
        }
    }
}
