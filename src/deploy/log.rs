// ABOUTME: Append-only deployment log entries and the sinks that receive them.
// ABOUTME: Business logic emits through DeploymentLog; sinks decide how entries are stored or shown.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use crate::types::DeploymentUuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub text: String,
    /// Kept for operators but excluded from user-visible output.
    pub hidden: bool,
}

impl LogEntry {
    pub fn new(stream: LogStream, text: impl Into<String>, hidden: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            text: text.into(),
            hidden,
        }
    }
}

/// Receives log entries for a deployment.
pub trait LogSink: Send + Sync {
    fn record(&self, deployment: &DeploymentUuid, entry: &LogEntry);
}

/// Emitter handed to pipeline code. Cheap to clone.
#[derive(Clone)]
pub struct DeploymentLog {
    deployment: DeploymentUuid,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl std::fmt::Debug for DeploymentLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentLog")
            .field("deployment", &self.deployment)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl DeploymentLog {
    pub fn new(deployment: DeploymentUuid, sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { deployment, sinks }
    }

    pub fn deployment(&self) -> &DeploymentUuid {
        &self.deployment
    }

    pub fn emit(&self, stream: LogStream, text: impl Into<String>, hidden: bool) {
        let entry = LogEntry::new(stream, text, hidden);
        tracing::debug!(
            deployment = %self.deployment,
            stream = ?entry.stream,
            hidden = entry.hidden,
            "{}",
            entry.text
        );
        for sink in &self.sinks {
            sink.record(&self.deployment, &entry);
        }
    }

    pub fn info(&self, text: impl Into<String>) {
        self.emit(LogStream::Stdout, text, false);
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.emit(LogStream::Stderr, text, false);
    }

    pub fn hidden(&self, text: impl Into<String>) {
        self.emit(LogStream::Stdout, text, true);
    }
}

/// Collects entries in memory. Used by tests and by the in-memory store.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(DeploymentUuid, LogEntry)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(DeploymentUuid, LogEntry)> {
        self.entries.lock().clone()
    }

    /// Visible text lines, in order.
    pub fn visible(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| !e.hidden)
            .map(|(_, e)| e.text.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|(_, e)| e.text.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn record(&self, deployment: &DeploymentUuid, entry: &LogEntry) {
        self.entries.lock().push((deployment.clone(), entry.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_fan_out_to_every_sink() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let log = DeploymentLog::new(
            DeploymentUuid::new("d1"),
            vec![a.clone() as Arc<dyn LogSink>, b.clone() as Arc<dyn LogSink>],
        );

        log.info("cloning");
        log.hidden("docker exec d1 bash -c 'git clone'");

        assert_eq!(a.entries().len(), 2);
        assert_eq!(b.visible(), vec!["cloning".to_string()]);
    }

    #[test]
    fn warnings_are_tagged_stderr() {
        let sink = Arc::new(MemorySink::new());
        let log = DeploymentLog::new(DeploymentUuid::new("d1"), vec![sink.clone() as Arc<dyn LogSink>]);
        log.warn("brief downtime");
        assert_eq!(sink.entries()[0].1.stream, LogStream::Stderr);
    }
}
