// ABOUTME: Deployment request record and its monotonic status machine.
// ABOUTME: Terminal states are immutable; later updates are silent no-ops.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::types::{ApplicationUuid, Commit, DeploymentUuid};

use super::LogEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Queued,
    InProgress,
    Finished,
    Failed,
    Cancelled,
}

impl DeploymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Finished | DeploymentStatus::Failed | DeploymentStatus::Cancelled
        )
    }

    /// `QUEUED -> IN_PROGRESS -> {FINISHED | FAILED | CANCELLED}`, plus `QUEUED -> CANCELLED`.
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        matches!(
            (self, next),
            (Queued, InProgress)
                | (Queued, Cancelled)
                | (InProgress, Finished)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "queued",
            DeploymentStatus::InProgress => "in_progress",
            DeploymentStatus::Finished => "finished",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentRequest {
    pub uuid: DeploymentUuid,
    pub application: ApplicationUuid,
    /// Reference of the destination server in the manifest.
    pub server: String,
    /// 0 for regular deployments.
    pub pull_request_id: u32,
    pub commit: Commit,
    pub rollback: bool,
    pub force_rebuild: bool,
    pub restart_only: bool,
    pub only_this_server: bool,
    pub status: DeploymentStatus,
    pub worker_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub log: Vec<LogEntry>,
}

impl DeploymentRequest {
    pub fn new(application: ApplicationUuid, server: impl Into<String>) -> Self {
        Self {
            uuid: DeploymentUuid::generate(),
            application,
            server: server.into(),
            pull_request_id: 0,
            commit: Commit::Head,
            rollback: false,
            force_rebuild: false,
            restart_only: false,
            only_this_server: false,
            status: DeploymentStatus::Queued,
            worker_id: None,
            started_at: None,
            finished_at: None,
            log: Vec::new(),
        }
    }

    pub fn with_uuid(mut self, uuid: DeploymentUuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn with_commit(mut self, commit: Commit) -> Self {
        self.commit = commit;
        self
    }

    pub fn with_pull_request(mut self, id: u32) -> Self {
        self.pull_request_id = id;
        self
    }

    pub fn force_rebuild(mut self, force: bool) -> Self {
        self.force_rebuild = force;
        self
    }

    pub fn restart_only(mut self, restart_only: bool) -> Self {
        self.restart_only = restart_only;
        self
    }

    pub fn rollback(mut self, rollback: bool) -> Self {
        self.rollback = rollback;
        self
    }

    pub fn only_this_server(mut self, only: bool) -> Self {
        self.only_this_server = only;
        self
    }

    /// Apply a status change. Returns false, changing nothing, when the move
    /// is not allowed (always the case once terminal).
    pub fn transition(&mut self, next: DeploymentStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::debug!(
                deployment = %self.uuid,
                from = %self.status,
                to = %next,
                "ignoring status update"
            );
            return false;
        }
        let now = Utc::now();
        if next == DeploymentStatus::InProgress {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        true
    }

    /// Move to IN_PROGRESS and record the worker.
    pub fn start(&mut self, worker: impl Into<String>) -> bool {
        if !self.transition(DeploymentStatus::InProgress) {
            return false;
        }
        self.worker_id = Some(worker.into());
        true
    }

    /// An identical request for another destination server.
    pub fn for_server(&self, server: impl Into<String>) -> Self {
        Self {
            uuid: DeploymentUuid::generate(),
            server: server.into(),
            only_this_server: true,
            status: DeploymentStatus::Queued,
            worker_id: None,
            started_at: None,
            finished_at: None,
            log: Vec::new(),
            ..self.clone()
        }
    }
}

/// Identity recorded on a request when a worker picks it up.
pub fn worker_identity() -> String {
    format!(
        "{}:{}",
        gethostname::gethostname().to_string_lossy(),
        std::process::id()
    )
}
