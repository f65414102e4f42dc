// ABOUTME: Build strategy and branch selection for a deployment request.
// ABOUTME: Dispatch is a pure function of restart-only, pull request id, and build pack.

use std::fmt;

use crate::config::{ApplicationConfig, BuildPack};

/// How the image for a run is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStrategy {
    /// Dockerfile stored on the application; no repository involved.
    DockerfileInline,
    /// User compose file, built and started as a whole.
    Compose,
    /// Pre-built registry image; nothing is built.
    Image,
    /// Dockerfile from the repository.
    Dockerfile,
    /// Repository files served by a minimal web server image.
    Static,
    /// Build plan inferred by nixpacks.
    Nixpacks,
}

impl BuildStrategy {
    pub fn for_application(app: &ApplicationConfig) -> Self {
        match app.build_pack {
            BuildPack::Dockerfile if app.has_inline_dockerfile() => BuildStrategy::DockerfileInline,
            BuildPack::Dockerfile => BuildStrategy::Dockerfile,
            BuildPack::DockerCompose => BuildStrategy::Compose,
            BuildPack::DockerImage => BuildStrategy::Image,
            BuildPack::Static => BuildStrategy::Static,
            BuildPack::Nixpacks => BuildStrategy::Nixpacks,
        }
    }

    /// Whether a git checkout is needed.
    pub fn needs_source(&self) -> bool {
        !matches!(self, BuildStrategy::DockerfileInline | BuildStrategy::Image)
    }

    /// Whether the strategy runs a Dockerfile build that can take build args or secret mounts.
    pub fn uses_dockerfile(&self) -> bool {
        matches!(
            self,
            BuildStrategy::DockerfileInline
                | BuildStrategy::Dockerfile
                | BuildStrategy::Static
                | BuildStrategy::Nixpacks
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStrategy::DockerfileInline => "dockerfile-inline",
            BuildStrategy::Compose => "compose",
            BuildStrategy::Image => "image",
            BuildStrategy::Dockerfile => "dockerfile",
            BuildStrategy::Static => "static",
            BuildStrategy::Nixpacks => "nixpacks",
        }
    }
}

impl fmt::Display for BuildStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which top-level path a run takes. Exactly one executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Reuse the existing image if present; otherwise fall through to a build once.
    RestartOnly(BuildStrategy),
    PullRequest { id: u32, strategy: BuildStrategy },
    Standard(BuildStrategy),
}

impl Branch {
    pub fn select(restart_only: bool, pull_request_id: u32, strategy: BuildStrategy) -> Self {
        match (restart_only, pull_request_id) {
            (true, _) => Branch::RestartOnly(strategy),
            (false, 0) => Branch::Standard(strategy),
            (false, id) => Branch::PullRequest { id, strategy },
        }
    }

    pub fn strategy(&self) -> BuildStrategy {
        match self {
            Branch::RestartOnly(s) | Branch::Standard(s) => *s,
            Branch::PullRequest { strategy, .. } => *strategy,
        }
    }

    /// The branch a restart-only run re-enters when no image is available.
    pub fn without_restart(self, pull_request_id: u32) -> Self {
        match self {
            Branch::RestartOnly(strategy) => Branch::select(false, pull_request_id, strategy),
            other => other,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::RestartOnly(s) => write!(f, "restart-only ({s})"),
            Branch::PullRequest { id, strategy } => write!(f, "pull request #{id} ({strategy})"),
            Branch::Standard(s) => write!(f, "{s}"),
        }
    }
}
