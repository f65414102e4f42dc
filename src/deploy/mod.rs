// ABOUTME: Deployment lifecycle: requests, stores, the run pipeline, and the health-gated rollout.
// ABOUTME: The orchestrator drives one request to a terminal status; the rollout uses type states.

mod cleanup;
mod error;
mod health;
mod log;
mod notify;
mod orchestrator;
mod pipeline;
mod request;
mod rollout;
mod state;
mod store;
mod strategy;

pub use error::{DeployError, DeployErrorKind};
pub use health::{HealthChecker, HealthOutcome};
pub use log::{DeploymentLog, LogEntry, LogSink, LogStream, MemorySink};
pub use notify::{DeploymentEvent, Notifier, NotifyError, RecordingNotifier, TracingNotifier};
pub use orchestrator::{Orchestrator, RunReport};
pub use request::{DeploymentRequest, DeploymentStatus, worker_identity};
pub use rollout::{
    Rollout, RolloutReport, RolloutTarget, TransitionResult, rolling_update,
};
pub use state::{Completed, Healthy, Prepared, Started};
pub use store::{DeploymentStore, MemoryStore, StatusProbe, StoreError, StoreLog};
pub use strategy::{RolloutStrategy, container_name};
