// ABOUTME: Deployment events and the notifier seam that delivers them.
// ABOUTME: The default notifier writes events to tracing; a recording one backs tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::types::{ApplicationUuid, DeploymentUuid};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeploymentEvent {
    ConfigurationChanged {
        application: ApplicationUuid,
    },
    ContainerRestarted {
        application: ApplicationUuid,
        container: String,
    },
    Succeeded {
        application: ApplicationUuid,
        deployment: DeploymentUuid,
    },
    Failed {
        application: ApplicationUuid,
        deployment: DeploymentUuid,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &DeploymentEvent) -> Result<(), NotifyError>;
}

/// Logs every event at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &DeploymentEvent) -> Result<(), NotifyError> {
        match event {
            DeploymentEvent::ConfigurationChanged { application } => {
                tracing::info!(%application, "configuration changed");
            }
            DeploymentEvent::ContainerRestarted {
                application,
                container,
            } => {
                tracing::info!(%application, %container, "container restarted");
            }
            DeploymentEvent::Succeeded {
                application,
                deployment,
            } => {
                tracing::info!(%application, %deployment, "deployment succeeded");
            }
            DeploymentEvent::Failed {
                application,
                deployment,
                reason,
            } => {
                tracing::warn!(%application, %deployment, %reason, "deployment failed");
            }
        }
        Ok(())
    }
}

/// Keeps every event; optionally fails delivery after recording.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<DeploymentEvent>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<DeploymentEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &DeploymentEvent) -> Result<(), NotifyError> {
        self.events.lock().push(event.clone());
        if self.fail {
            return Err(NotifyError("webhook unreachable".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_a_tag() {
        let event = DeploymentEvent::ConfigurationChanged {
            application: ApplicationUuid::new("app"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"configuration_changed","application":"app"}"#);
    }

    #[tokio::test]
    async fn failing_notifier_still_records() {
        let notifier = RecordingNotifier::failing();
        let event = DeploymentEvent::ConfigurationChanged {
            application: ApplicationUuid::new("app"),
        };
        assert!(notifier.notify(&event).await.is_err());
        assert_eq!(notifier.events(), vec![event]);
    }
}
