// ABOUTME: Error types for a deployment run.
// ABOUTME: Distinguishes cancellation from command, health, registry, and timeout failures.

use std::time::Duration;

use crate::env::EnvError;
use crate::executor::{ExecutorError, ExecutorErrorKind, Phase};

use super::store::StoreError;

/// Errors that end a deployment run.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The request was cancelled; observed at a phase boundary.
    #[error("deployment cancelled")]
    Cancelled,

    /// A non-ignorable remote command failed.
    #[error(transparent)]
    Command(ExecutorError),

    /// The new container never reported healthy.
    #[error("health check failed for {container}: {reason}")]
    HealthCheck { container: String, reason: String },

    #[error("failed to push {image}: {reason}")]
    RegistryPush { image: String, reason: String },

    #[error("deployment exceeded the run timeout of {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("source error: {0}")]
    Source(String),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot reach {server}: {source}")]
    Transport {
        server: String,
        #[source]
        source: crate::ssh::Error,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    Cancelled,
    Command,
    HealthCheck,
    RegistryPush,
    Timeout,
    Config,
    Store,
}

impl DeployError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DeployError::Cancelled)
    }

    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Cancelled => DeployErrorKind::Cancelled,
            DeployError::Command(_) | DeployError::Source(_) | DeployError::Transport { .. } => {
                DeployErrorKind::Command
            }
            DeployError::HealthCheck { .. } => DeployErrorKind::HealthCheck,
            DeployError::RegistryPush { .. } => DeployErrorKind::RegistryPush,
            DeployError::Timeout(_) => DeployErrorKind::Timeout,
            DeployError::Config(_) | DeployError::Env(_) => DeployErrorKind::Config,
            DeployError::Store(_) => DeployErrorKind::Store,
        }
    }

    /// Phase a command failure happened in, when known.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            DeployError::Command(err) => err.phase(),
            _ => None,
        }
    }
}

impl From<ExecutorError> for DeployError {
    fn from(err: ExecutorError) -> Self {
        match err.kind() {
            ExecutorErrorKind::Cancelled => DeployError::Cancelled,
            _ => DeployError::Command(err),
        }
    }
}

impl From<crate::error::Error> for DeployError {
    fn from(err: crate::error::Error) -> Self {
        DeployError::Config(err.to_string())
    }
}

impl From<crate::types::ParseImageRefError> for DeployError {
    fn from(err: crate::types::ParseImageRefError) -> Self {
        DeployError::Config(format!("invalid image name: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_cancellation_maps_to_cancelled() {
        let err: DeployError = ExecutorError::Cancelled {
            phase: Phase::Build,
        }
        .into();
        assert!(err.is_cancellation());
        assert_eq!(err.kind(), DeployErrorKind::Cancelled);
    }

    #[test]
    fn command_failures_keep_their_phase() {
        let err: DeployError = ExecutorError::CommandFailed {
            phase: Phase::CloneSource,
            exit_code: 128,
            stderr: "repository not found".to_string(),
        }
        .into();
        assert!(!err.is_cancellation());
        assert_eq!(err.phase(), Some(Phase::CloneSource));
        assert!(err.to_string().contains("repository not found"));
    }

    #[test]
    fn timeout_reports_seconds() {
        let err = DeployError::Timeout(Duration::from_secs(3600));
        assert_eq!(err.to_string(), "deployment exceeded the run timeout of 3600s");
        assert_eq!(err.kind(), DeployErrorKind::Timeout);
    }
}
