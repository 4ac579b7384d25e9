use async_trait::async_trait;
use idler_core::JobDisposition;
use idler_model::{JobEvent, RoutingEntry, RunnerRequest, StartOutcome, StopOutcome};
use serde::Serialize;

use crate::error::ApiError;

/// Runner lifecycle API handler.
///
/// This trait abstracts the backend implementation, allowing users to:
/// - Use the provided `OrchestratorAdapter`
/// - Wrap it with additional logic (auditing, dry runs, etc.)
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Apply a verified job-lifecycle event.
    async fn job_event(&self, event: JobEvent) -> Result<JobDisposition, ApiError>;

    /// Ensure the instance is running.
    async fn start(&self, req: RunnerRequest) -> Result<StartOutcome, ApiError>;

    /// Busy-gated stop; also the target of scheduled callbacks.
    async fn stop(&self, req: RunnerRequest) -> Result<StopOutcome, ApiError>;

    /// Drop the pending stop. Returns whether one existed.
    async fn cancel_stop(&self, req: RunnerRequest) -> Result<bool, ApiError>;

    /// Static description served on `GET /`.
    fn describe(&self) -> ServiceInfo;
}

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub routes: Vec<RoutingEntry>,
    pub inactive_minutes: u64,
    pub busy_retry_seconds: u64,
    pub cancel_stop_on_queued: bool,
}
