// ABOUTME: Persistence seam for deployment requests plus an in-memory implementation.
// ABOUTME: Enforces one in-progress deployment per application with a FIFO of queued ones.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::executor::CancellationProbe;
use crate::types::{ApplicationUuid, DeploymentUuid};

use super::{DeploymentRequest, DeploymentStatus, LogEntry, LogSink};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("deployment {0} not found")]
    NotFound(DeploymentUuid),

    #[error("application {application} already has deployment {active} in progress")]
    Busy {
        application: ApplicationUuid,
        active: DeploymentUuid,
    },
}

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn load(&self, uuid: &DeploymentUuid) -> Result<DeploymentRequest, StoreError>;

    async fn status(&self, uuid: &DeploymentUuid) -> Result<DeploymentStatus, StoreError>;

    /// Atomically move QUEUED to IN_PROGRESS. Returns false when the request
    /// was no longer queued.
    async fn mark_started(&self, uuid: &DeploymentUuid, worker: &str) -> Result<bool, StoreError>;

    /// Apply a status change. Returns false when the change was refused.
    async fn transition(
        &self,
        uuid: &DeploymentUuid,
        status: DeploymentStatus,
    ) -> Result<bool, StoreError>;

    fn append_log(&self, uuid: &DeploymentUuid, entry: &LogEntry);

    async fn reset_restart_counters(&self, application: &ApplicationUuid) -> Result<(), StoreError>;

    async fn save_config_hash(
        &self,
        application: &ApplicationUuid,
        hash: &str,
    ) -> Result<(), StoreError>;

    /// Fingerprint saved by the last FINISHED run of the application.
    async fn last_config_hash(
        &self,
        application: &ApplicationUuid,
    ) -> Result<Option<String>, StoreError>;

    async fn enqueue(&self, request: DeploymentRequest) -> Result<(), StoreError>;

    /// Free the application's in-progress slot once the run of `uuid` has
    /// ended. A terminal status alone does not free it: a request cancelled
    /// mid-run keeps the slot until its run winds down.
    async fn release(
        &self,
        application: &ApplicationUuid,
        uuid: &DeploymentUuid,
    ) -> Result<(), StoreError>;

    /// Next queued deployment of the application, if none is in progress.
    async fn release_next(
        &self,
        application: &ApplicationUuid,
    ) -> Result<Option<DeploymentUuid>, StoreError>;
}

/// Routes deployment log entries into a store.
pub struct StoreLog(pub Arc<dyn DeploymentStore>);

impl LogSink for StoreLog {
    fn record(&self, deployment: &DeploymentUuid, entry: &LogEntry) {
        self.0.append_log(deployment, entry);
    }
}

/// Reports cancellation when the stored request is CANCELLED.
pub struct StatusProbe {
    store: Arc<dyn DeploymentStore>,
    deployment: DeploymentUuid,
}

impl StatusProbe {
    pub fn new(store: Arc<dyn DeploymentStore>, deployment: DeploymentUuid) -> Self {
        Self { store, deployment }
    }
}

#[async_trait]
impl CancellationProbe for StatusProbe {
    async fn is_cancelled(&self) -> bool {
        matches!(
            self.store.status(&self.deployment).await,
            Ok(DeploymentStatus::Cancelled)
        )
    }
}

#[derive(Default)]
struct Inner {
    requests: HashMap<DeploymentUuid, DeploymentRequest>,
    queues: HashMap<ApplicationUuid, VecDeque<DeploymentUuid>>,
    active: HashMap<ApplicationUuid, DeploymentUuid>,
    restart_counts: HashMap<ApplicationUuid, u32>,
    config_hashes: HashMap<ApplicationUuid, String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel a request from outside the run. An in-progress run notices at
    /// its next checkpoint and keeps the application's slot until it ends.
    pub fn cancel(&self, uuid: &DeploymentUuid) -> bool {
        self.inner
            .lock()
            .requests
            .get_mut(uuid)
            .is_some_and(|r| r.transition(DeploymentStatus::Cancelled))
    }

    pub fn get(&self, uuid: &DeploymentUuid) -> Option<DeploymentRequest> {
        self.inner.lock().requests.get(uuid).cloned()
    }

    /// All requests of an application, in no particular order.
    pub fn requests_for(&self, application: &ApplicationUuid) -> Vec<DeploymentRequest> {
        self.inner
            .lock()
            .requests
            .values()
            .filter(|r| r.application == *application)
            .cloned()
            .collect()
    }

    /// Count a container restart, as the status poller would.
    pub fn record_restart(&self, application: &ApplicationUuid) {
        *self
            .inner
            .lock()
            .restart_counts
            .entry(application.clone())
            .or_default() += 1;
    }

    pub fn restart_count(&self, application: &ApplicationUuid) -> u32 {
        self.inner
            .lock()
            .restart_counts
            .get(application)
            .copied()
            .unwrap_or(0)
    }

    /// Request holding the application's in-progress slot.
    pub fn active(&self, application: &ApplicationUuid) -> Option<DeploymentUuid> {
        self.inner.lock().active.get(application).cloned()
    }

    pub fn config_hash(&self, application: &ApplicationUuid) -> Option<String> {
        self.inner.lock().config_hashes.get(application).cloned()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn load(&self, uuid: &DeploymentUuid) -> Result<DeploymentRequest, StoreError> {
        self.get(uuid).ok_or_else(|| StoreError::NotFound(uuid.clone()))
    }

    async fn status(&self, uuid: &DeploymentUuid) -> Result<DeploymentStatus, StoreError> {
        self.inner
            .lock()
            .requests
            .get(uuid)
            .map(|r| r.status)
            .ok_or_else(|| StoreError::NotFound(uuid.clone()))
    }

    async fn mark_started(&self, uuid: &DeploymentUuid, worker: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let application = inner
            .requests
            .get(uuid)
            .map(|r| r.application.clone())
            .ok_or_else(|| StoreError::NotFound(uuid.clone()))?;

        if let Some(active) = inner.active.get(&application)
            && active != uuid
        {
            return Err(StoreError::Busy {
                application,
                active: active.clone(),
            });
        }

        let started = inner
            .requests
            .get_mut(uuid)
            .is_some_and(|r| r.start(worker));
        if started {
            inner.active.insert(application.clone(), uuid.clone());
            if let Some(queue) = inner.queues.get_mut(&application) {
                queue.retain(|q| q != uuid);
            }
        }
        Ok(started)
    }

    async fn transition(
        &self,
        uuid: &DeploymentUuid,
        status: DeploymentStatus,
    ) -> Result<bool, StoreError> {
        self.inner
            .lock()
            .requests
            .get_mut(uuid)
            .map(|r| r.transition(status))
            .ok_or_else(|| StoreError::NotFound(uuid.clone()))
    }

    fn append_log(&self, uuid: &DeploymentUuid, entry: &LogEntry) {
        if let Some(request) = self.inner.lock().requests.get_mut(uuid) {
            request.log.push(entry.clone());
        }
    }

    async fn reset_restart_counters(&self, application: &ApplicationUuid) -> Result<(), StoreError> {
        self.inner.lock().restart_counts.remove(application);
        Ok(())
    }

    async fn save_config_hash(
        &self,
        application: &ApplicationUuid,
        hash: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .config_hashes
            .insert(application.clone(), hash.to_string());
        Ok(())
    }

    async fn last_config_hash(
        &self,
        application: &ApplicationUuid,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.config_hash(application))
    }

    async fn enqueue(&self, request: DeploymentRequest) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner
            .queues
            .entry(request.application.clone())
            .or_default()
            .push_back(request.uuid.clone());
        inner.requests.insert(request.uuid.clone(), request);
        Ok(())
    }

    async fn release(
        &self,
        application: &ApplicationUuid,
        uuid: &DeploymentUuid,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.active.get(application) == Some(uuid) {
            inner.active.remove(application);
        }
        Ok(())
    }

    async fn release_next(
        &self,
        application: &ApplicationUuid,
    ) -> Result<Option<DeploymentUuid>, StoreError> {
        let mut inner = self.inner.lock();
        if inner.active.contains_key(application) {
            return Ok(None);
        }
        let Inner {
            requests, queues, ..
        } = &mut *inner;
        let Some(queue) = queues.get_mut(application) else {
            return Ok(None);
        };
        // Requests cancelled while queued are dropped on the way.
        while let Some(front) = queue.front() {
            if requests
                .get(front)
                .is_some_and(|r| r.status == DeploymentStatus::Queued)
            {
                return Ok(Some(front.clone()));
            }
            queue.pop_front();
        }
        Ok(None)
    }
}
