// ABOUTME: Output formatting for CLI feedback and deployment log rendering.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

use crate::deploy::{LogEntry, LogSink, LogStream};
use crate::types::DeploymentUuid;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with the deployment log
    Normal,
    /// Minimal output for CI (warnings and the final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Warning: {message}"),
            OutputMode::Json => emit_json(
                &JsonEvent {
                    event: "warning",
                    message,
                    duration_secs: None,
                },
                true,
            ),
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({elapsed:.1}s)");
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => emit_json(
                &JsonEvent {
                    event: "success",
                    message,
                    duration_secs: self.duration(),
                },
                false,
            ),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => emit_json(
                &JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                },
                true,
            ),
        }
    }
}

/// Renders the user-visible part of a deployment log. Hidden entries are skipped.
impl LogSink for Output {
    fn record(&self, deployment: &DeploymentUuid, entry: &LogEntry) {
        if entry.hidden {
            return;
        }
        match (self.mode, entry.stream) {
            (OutputMode::Normal, LogStream::Stdout) => println!("{}", entry.text),
            (OutputMode::Normal | OutputMode::Quiet, LogStream::Stderr) => {
                eprintln!("Warning: {}", entry.text)
            }
            (OutputMode::Quiet, LogStream::Stdout) => {}
            (OutputMode::Json, stream) => emit_json(
                &JsonLogLine {
                    event: "log",
                    deployment: deployment.as_str(),
                    stream,
                    timestamp: entry.timestamp,
                    text: &entry.text,
                },
                false,
            ),
        }
    }
}

fn emit_json<T: Serialize>(value: &T, stderr: bool) {
    if let Ok(json) = serde_json::to_string(value) {
        if stderr {
            eprintln!("{json}");
        } else {
            println!("{json}");
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct JsonLogLine<'a> {
    event: &'a str,
    deployment: &'a str,
    stream: LogStream,
    timestamp: DateTime<Utc>,
    text: &'a str,
}
