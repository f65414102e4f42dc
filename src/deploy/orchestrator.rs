// ABOUTME: Drives one deployment request through its lifecycle and terminal transition.
// ABOUTME: Admission, run timeout, post-deployment cleanup, notifications, fan-out, queue release.

use std::sync::Arc;

use crate::config::Manifest;
use crate::diagnostics::{Diagnostics, Warning, WarningKind};
use crate::executor::CancellationProbe;
use crate::transport::Connector;
use crate::types::DeploymentUuid;

use super::cleanup::finalize;
use super::notify::{DeploymentEvent, Notifier};
use super::pipeline::{Pipeline, Progress, RunState};
use super::request::{DeploymentRequest, DeploymentStatus, worker_identity};
use super::store::{DeploymentStore, StatusProbe, StoreLog};
use super::{DeployError, DeploymentLog, LogSink};

/// Outcome of [`Orchestrator::run`].
#[derive(Debug)]
pub struct RunReport {
    pub deployment: DeploymentUuid,
    pub status: DeploymentStatus,
    /// Why the run did not finish.
    pub error: Option<DeployError>,
    pub diagnostics: Diagnostics,
    /// Container serving the application after a successful rollout.
    pub container: Option<String>,
    /// Queued deployment of the same application released by this run.
    pub next: Option<DeploymentUuid>,
}

impl RunReport {
    fn untouched(deployment: DeploymentUuid, status: DeploymentStatus) -> Self {
        Self {
            deployment,
            status,
            error: None,
            diagnostics: Diagnostics::default(),
            container: None,
            next: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DeploymentStatus::Finished
    }
}

pub struct Orchestrator {
    manifest: Manifest,
    store: Arc<dyn DeploymentStore>,
    notifier: Arc<dyn Notifier>,
    connector: Arc<dyn Connector>,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl Orchestrator {
    pub fn new(
        manifest: Manifest,
        store: Arc<dyn DeploymentStore>,
        notifier: Arc<dyn Notifier>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            manifest,
            store,
            notifier,
            connector,
            sinks: Vec::new(),
        }
    }

    /// Also deliver log entries to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Run the request to a terminal status.
    ///
    /// A failed or cancelled deployment is still `Ok`; the report carries the
    /// error. `Err` means the request could not be admitted or the store failed.
    pub async fn run(&self, uuid: &DeploymentUuid) -> Result<RunReport, DeployError> {
        let request = self.store.load(uuid).await?;
        if request.status == DeploymentStatus::Cancelled {
            tracing::info!(deployment = %uuid, "deployment cancelled before it started");
            return Ok(RunReport::untouched(uuid.clone(), request.status));
        }
        if !self.store.mark_started(uuid, &worker_identity()).await? {
            let status = self.store.status(uuid).await?;
            tracing::info!(deployment = %uuid, status = %status, "deployment no longer queued");
            return Ok(RunReport::untouched(uuid.clone(), status));
        }

        let app = &self.manifest.application;
        let mut sinks: Vec<Arc<dyn LogSink>> = vec![Arc::new(StoreLog(self.store.clone()))];
        sinks.extend(self.sinks.iter().cloned());
        let log = DeploymentLog::new(uuid.clone(), sinks);
        let probe: Arc<dyn CancellationProbe> =
            Arc::new(StatusProbe::new(self.store.clone(), uuid.clone()));

        let pipeline = Pipeline {
            manifest: &self.manifest,
            connector: self.connector.as_ref(),
            log: log.clone(),
            probe,
            last_config_hash: self.store.last_config_hash(&app.uuid).await?,
        };
        let mut state = RunState::default();
        let timeout = self.manifest.settings.run_timeout;
        let outcome = match tokio::time::timeout(timeout, pipeline.execute(&request, &mut state)).await
        {
            Ok(result) => result,
            Err(_) => Err(DeployError::Timeout(timeout)),
        };

        match &outcome {
            Ok(()) => log.info("Deployment finished."),
            Err(err) if err.is_cancellation() => log.info("Deployment cancelled."),
            Err(err) => log.warn(format!("Deployment failed: {err}")),
        }

        finalize(&mut state, app, outcome.as_ref().err()).await;

        let target = match &outcome {
            Ok(()) => DeploymentStatus::Finished,
            Err(err) if err.is_cancellation() => DeploymentStatus::Cancelled,
            Err(_) => DeploymentStatus::Failed,
        };
        let status = if self.store.transition(uuid, target).await? {
            target
        } else {
            self.store.status(uuid).await?
        };
        tracing::info!(deployment = %uuid, status = %status, "deployment reached a terminal status");
        self.store.release(&app.uuid, uuid).await?;

        let mut diagnostics = state.diagnostics;
        match status {
            DeploymentStatus::Finished => {
                self.on_finished(&request, &state.progress, &mut diagnostics)
                    .await;
            }
            DeploymentStatus::Failed => {
                let reason = outcome
                    .as_ref()
                    .err()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "cancelled after the last checkpoint".to_string());
                self.notify(
                    DeploymentEvent::Failed {
                        application: app.uuid.clone(),
                        deployment: uuid.clone(),
                        reason,
                    },
                    &mut diagnostics,
                )
                .await;
            }
            _ => {}
        }

        let next = self.store.release_next(&app.uuid).await?;
        if let Some(next) = &next {
            tracing::debug!(deployment = %uuid, next = %next, "released next queued deployment");
        }

        Ok(RunReport {
            deployment: uuid.clone(),
            status,
            error: outcome.err(),
            diagnostics,
            container: state.progress.rollout.map(|r| r.container),
            next,
        })
    }

    async fn on_finished(
        &self,
        request: &DeploymentRequest,
        progress: &Progress,
        diagnostics: &mut Diagnostics,
    ) {
        let app = &self.manifest.application;

        if let Err(err) = self.store.reset_restart_counters(&app.uuid).await {
            diagnostics.warn(Warning::new(
                WarningKind::Bookkeeping,
                format!("could not reset restart counters: {err}"),
            ));
        }
        if let Some(hash) = &progress.config_hash
            && let Err(err) = self.store.save_config_hash(&app.uuid, hash).await
        {
            diagnostics.warn(Warning::new(
                WarningKind::Bookkeeping,
                format!("could not save the configuration fingerprint: {err}"),
            ));
        }

        self.notify(
            DeploymentEvent::ConfigurationChanged {
                application: app.uuid.clone(),
            },
            diagnostics,
        )
        .await;
        if progress.restarted
            && let Some(rollout) = &progress.rollout
        {
            self.notify(
                DeploymentEvent::ContainerRestarted {
                    application: app.uuid.clone(),
                    container: rollout.container.clone(),
                },
                diagnostics,
            )
            .await;
        }
        self.notify(
            DeploymentEvent::Succeeded {
                application: app.uuid.clone(),
                deployment: request.uuid.clone(),
            },
            diagnostics,
        )
        .await;

        if !request.only_this_server {
            self.fan_out(request, progress, diagnostics).await;
        }
    }

    /// Queue an identical deployment for every other destination.
    async fn fan_out(
        &self,
        request: &DeploymentRequest,
        progress: &Progress,
        diagnostics: &mut Diagnostics,
    ) {
        let commit = progress
            .context
            .as_ref()
            .map(|ctx| ctx.commit.clone())
            .unwrap_or_else(|| request.commit.clone());
        for server in self.manifest.additional_servers(&request.server) {
            let copy = request.for_server(server.reference()).with_commit(commit.clone());
            let uuid = copy.uuid.clone();
            match self.store.enqueue(copy).await {
                Ok(()) => tracing::info!(
                    deployment = %request.uuid,
                    queued = %uuid,
                    server = server.reference(),
                    "queued deployment to additional server"
                ),
                Err(err) => diagnostics.warn(Warning::new(
                    WarningKind::FanOut,
                    format!("could not queue deployment to {}: {err}", server.reference()),
                )),
            }
        }
    }

    async fn notify(&self, event: DeploymentEvent, diagnostics: &mut Diagnostics) {
        if let Err(err) = self.notifier.notify(&event).await {
            diagnostics.warn(Warning::notification(format!(
                "notification failed: {err}"
            )));
        }
    }
}
