// ABOUTME: Named pipeline phases used to tag remote commands and their failures.
// ABOUTME: Phase names appear in user-visible logs and error messages.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Prepare,
    HelperStart,
    ResolveCommit,
    CloneSource,
    CheckImage,
    ProbeBuilder,
    GenerateCompose,
    BuildTimeEnv,
    Build,
    RuntimeEnv,
    Publish,
    PreDeployment,
    RollingUpdate,
    HealthCheck,
    PostDeployment,
    Cleanup,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::HelperStart => "helper-start",
            Phase::ResolveCommit => "resolve-commit",
            Phase::CloneSource => "clone-source",
            Phase::CheckImage => "check-image",
            Phase::ProbeBuilder => "probe-builder",
            Phase::GenerateCompose => "generate-compose",
            Phase::BuildTimeEnv => "build-time-env",
            Phase::Build => "build",
            Phase::RuntimeEnv => "runtime-env",
            Phase::Publish => "publish",
            Phase::PreDeployment => "pre-deployment",
            Phase::RollingUpdate => "rolling-update",
            Phase::HealthCheck => "health-check",
            Phase::PostDeployment => "post-deployment",
            Phase::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
