// ABOUTME: Remote executor error types with SNAFU pattern.
// ABOUTME: Every failure carries the phase it happened in.

use snafu::Snafu;

use super::Phase;

/// Longest stderr excerpt kept on a command failure.
const STDERR_TAIL: usize = 2000;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ExecutorError {
    #[snafu(display("{phase} failed with exit code {exit_code}: {stderr}"))]
    CommandFailed {
        phase: Phase,
        exit_code: u32,
        stderr: String,
    },

    #[snafu(display("{phase}: transport error: {source}"))]
    Transport {
        phase: Phase,
        source: crate::ssh::Error,
    },

    #[snafu(display("helper container {helper} is not running"))]
    HelperNotRunning { helper: String },

    #[snafu(display("cancelled before {phase}"))]
    Cancelled { phase: Phase },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorKind {
    CommandFailed,
    Transport,
    HelperNotRunning,
    Cancelled,
}

impl ExecutorError {
    pub fn kind(&self) -> ExecutorErrorKind {
        match self {
            ExecutorError::CommandFailed { .. } => ExecutorErrorKind::CommandFailed,
            ExecutorError::Transport { .. } => ExecutorErrorKind::Transport,
            ExecutorError::HelperNotRunning { .. } => ExecutorErrorKind::HelperNotRunning,
            ExecutorError::Cancelled { .. } => ExecutorErrorKind::Cancelled,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            ExecutorError::CommandFailed { phase, .. }
            | ExecutorError::Transport { phase, .. }
            | ExecutorError::Cancelled { phase } => Some(*phase),
            ExecutorError::HelperNotRunning { .. } => None,
        }
    }
}

/// Keep the last part of a long stderr, where the actual error usually is.
pub(crate) fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_phase() {
        let err = ExecutorError::CommandFailed {
            phase: Phase::Build,
            exit_code: 2,
            stderr: "no space left on device".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "build failed with exit code 2: no space left on device"
        );
        assert_eq!(err.phase(), Some(Phase::Build));
    }

    #[test]
    fn long_stderr_keeps_the_end() {
        let stderr = format!("{}ERROR: boom", "x".repeat(5000));
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("..."));
        assert!(tail.ends_with("ERROR: boom"));
        assert!(tail.len() <= STDERR_TAIL + 3);
    }
}
