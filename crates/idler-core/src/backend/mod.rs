//! The three external surfaces the orchestrator coordinates.
//!
//! Each trait is a thin seam over a system of record:
//! - [`ComputeBackend`]: instance power state
//! - [`TaskBackend`]: named, delayed HTTP callbacks
//! - [`JobStatusBackend`]: whether a CI runner is executing a job
//!
//! Implementations must bound every call with a request timeout and must not retry internally.
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use idler_model::{InstanceState, InstanceTarget, OperationId, RunnerRequest};

use crate::error::BackendError;

#[async_trait]
pub trait ComputeBackend: Send + Sync + 'static {
    /// Read the current power state.
    async fn status(&self, target: &InstanceTarget) -> Result<InstanceState, BackendError>;

    /// Issue a start and return the backend operation id.
    async fn start(&self, target: &InstanceTarget) -> Result<OperationId, BackendError>;

    /// Issue a stop and return the backend operation id.
    async fn stop(&self, target: &InstanceTarget) -> Result<OperationId, BackendError>;
}

/// A delayed callback into the stop path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredTask {
    /// Deterministic key; at most one live task per key.
    pub key: String,
    /// Delay requested by the caller.
    pub delay: Duration,
    /// Absolute fire time (`now + delay`).
    pub schedule_at: SystemTime,
    /// Payload delivered to the stop endpoint when the task fires.
    pub request: RunnerRequest,
}

#[async_trait]
pub trait TaskBackend: Send + Sync + 'static {
    /// Delete every live task carrying `key`.
    ///
    /// Returns `true` when something was deleted. A missing task is not an error.
    async fn delete(&self, key: &str) -> Result<bool, BackendError>;

    /// Create a task and return the backend's name for it.
    async fn create(&self, task: DeferredTask) -> Result<String, BackendError>;
}

#[async_trait]
pub trait JobStatusBackend: Send + Sync + 'static {
    /// Look up `runner` among the runners registered for `repo`.
    ///
    /// `Ok(None)` means no runner by that name is registered.
    async fn runner_busy(&self, repo: &str, runner: &str) -> Result<Option<bool>, BackendError>;
}

/// Bundle of the three surfaces, as handed to [`crate::Orchestrator::new`].
#[derive(Clone)]
pub struct Backends {
    pub compute: Arc<dyn ComputeBackend>,
    pub tasks: Arc<dyn TaskBackend>,
    pub jobs: Arc<dyn JobStatusBackend>,
}
