// ABOUTME: Remote shell transport abstraction used by the executor.
// ABOUTME: A transport runs one shell command on a host and returns its output.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ServerConfig;

/// Output from a remote command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code of the command.
    pub exit_code: u32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: u32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell commands on one remote host.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute `command` through the host's shell.
    async fn exec(&self, command: &str) -> crate::ssh::Result<CommandOutput>;
}

/// Opens transports to configured servers.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, server: &ServerConfig) -> crate::ssh::Result<Arc<dyn Transport>>;
}
