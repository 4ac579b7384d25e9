use std::sync::Arc;

use idler_model::{InstanceTarget, StartOutcome, StopOutcome};
use tracing::{debug, info, instrument, warn};

use crate::{
    backend::ComputeBackend,
    error::{BackendError, CoreError},
    metrics::{MetricsHandle, PowerAction, noop_metrics},
};

/// Idempotent power control over a single compute backend.
///
/// State is re-read from the backend on every call, so concurrent callers converge without any
/// local bookkeeping.
#[derive(Clone)]
pub struct InstanceController {
    compute: Arc<dyn ComputeBackend>,
    metrics: MetricsHandle,
}

impl InstanceController {
    pub fn new(compute: Arc<dyn ComputeBackend>) -> Self {
        Self {
            compute,
            metrics: noop_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Start `target` unless it already reports `RUNNING`.
    #[instrument(skip_all, fields(instance = %target.instance_id, zone = %target.zone))]
    pub async fn ensure_running(&self, target: &InstanceTarget) -> Result<StartOutcome, CoreError> {
        let state = self
            .compute
            .status(target)
            .await
            .map_err(|e| self.failed("status", e))?;

        if state.is_running() {
            debug!(%state, "instance already running");
            self.metrics.record_power_action(PowerAction::Start, false);
            return Ok(StartOutcome::AlreadyRunning);
        }

        let operation = self
            .compute
            .start(target)
            .await
            .map_err(|e| self.failed("start", e))?;
        info!(from = %state, %operation, "start issued");
        self.metrics.record_power_action(PowerAction::Start, true);
        Ok(StartOutcome::Starting { operation })
    }

    /// Stop `target` only when it reports `RUNNING`; any other state is left alone.
    #[instrument(skip_all, fields(instance = %target.instance_id, zone = %target.zone))]
    pub async fn ensure_stopped(&self, target: &InstanceTarget) -> Result<StopOutcome, CoreError> {
        let state = self
            .compute
            .status(target)
            .await
            .map_err(|e| self.failed("status", e))?;

        if !state.is_running() {
            debug!(%state, "instance not running, nothing to stop");
            self.metrics.record_power_action(PowerAction::Stop, false);
            return Ok(StopOutcome::AlreadyStopped);
        }

        let operation = self
            .compute
            .stop(target)
            .await
            .map_err(|e| self.failed("stop", e))?;
        info!(%operation, "stop issued");
        self.metrics.record_power_action(PowerAction::Stop, true);
        Ok(StopOutcome::Stopping { operation })
    }

    fn failed(&self, op: &str, err: BackendError) -> CoreError {
        warn!(backend = err.backend(), op, error = %err, "compute call failed");
        self.metrics.record_backend_error("compute", op);
        err.into()
    }
}
