use std::sync::Arc;

use async_trait::async_trait;
use idler_core::{JobDisposition, Orchestrator};
use idler_model::{JobEvent, RunnerRequest, StartOutcome, StopOutcome};

use crate::{
    error::ApiError,
    handler::{ApiHandler, ServiceInfo},
};

/// Adapter that bridges [`Orchestrator`] to [`ApiHandler`].
pub struct OrchestratorAdapter {
    orchestrator: Arc<Orchestrator>,
}

impl OrchestratorAdapter {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl ApiHandler for OrchestratorAdapter {
    async fn job_event(&self, event: JobEvent) -> Result<JobDisposition, ApiError> {
        self.orchestrator
            .handle_job(&event)
            .await
            .map_err(ApiError::from)
    }

    async fn start(&self, req: RunnerRequest) -> Result<StartOutcome, ApiError> {
        self.orchestrator.start(&req).await.map_err(ApiError::from)
    }

    async fn stop(&self, req: RunnerRequest) -> Result<StopOutcome, ApiError> {
        self.orchestrator.stop(&req).await.map_err(ApiError::from)
    }

    async fn cancel_stop(&self, req: RunnerRequest) -> Result<bool, ApiError> {
        self.orchestrator
            .cancel_stop(&req)
            .await
            .map_err(ApiError::from)
    }

    fn describe(&self) -> ServiceInfo {
        let policy = self.orchestrator.policy();
        ServiceInfo {
            service: "idler",
            version: env!("CARGO_PKG_VERSION"),
            routes: self.orchestrator.routes().entries().to_vec(),
            inactive_minutes: policy.inactivity_delay.as_secs() / 60,
            busy_retry_seconds: policy.retry_delay.as_secs(),
            cancel_stop_on_queued: policy.cancel_stop_on_queued,
        }
    }
}
