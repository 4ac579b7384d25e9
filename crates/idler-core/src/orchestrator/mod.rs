//! The event router tying routing, power control, stop scheduling and the busy gate together.
//!
//! Per instance the observable lifecycle is `IDLE -> ACTIVE -> COOLDOWN -> IDLE`:
//! a `queued` job starts the instance, a `completed` job (re)arms the pending stop, and the
//! pending stop either powers the instance off or re-arms itself while the runner is busy.
//! None of this is held in memory; the compute state and the keyed pending stop are the state.
use std::{sync::Arc, time::Duration};

use idler_model::{
    InstanceTarget, JobAction, JobEvent, RoutingError, RoutingTable, RunnerRequest, StartOutcome,
    StopOutcome, Zone,
};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    backend::Backends,
    error::CoreError,
    gate::BusyGate,
    instance::InstanceController,
    metrics::{EventOutcome, MetricsHandle, noop_metrics},
    stop::{PendingStop, StopScheduler},
};

/// Timing and behaviour knobs of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorPolicy {
    /// Delay between a `completed` job and the stop attempt.
    pub inactivity_delay: Duration,
    /// Delay before re-checking a runner that was busy (or whose state was unknown).
    pub retry_delay: Duration,
    /// Whether a `queued` job deletes the pending stop of its instance.
    pub cancel_stop_on_queued: bool,
}

impl Default for OrchestratorPolicy {
    fn default() -> Self {
        Self {
            inactivity_delay: Duration::from_secs(3 * 60),
            retry_delay: Duration::from_secs(60),
            cancel_stop_on_queued: true,
        }
    }
}

/// What [`Orchestrator::handle_job`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDisposition {
    /// No routing entry matched; nothing was done.
    NoMatch,
    /// Entries for different instances matched; nothing was done.
    Ambiguous(RoutingError),
    Started(InstanceTarget, StartOutcome),
    StopScheduled(InstanceTarget, PendingStop),
    /// The entry matched but the action carries no side effect.
    Ignored(InstanceTarget),
}

#[derive(Clone)]
pub struct Orchestrator {
    routes: Arc<RoutingTable>,
    policy: OrchestratorPolicy,
    default_zone: Option<Zone>,
    instances: InstanceController,
    stops: StopScheduler,
    gate: BusyGate,
    metrics: MetricsHandle,
}

impl Orchestrator {
    pub fn new(routes: Arc<RoutingTable>, backends: Backends, policy: OrchestratorPolicy) -> Self {
        Self {
            instances: InstanceController::new(backends.compute),
            stops: StopScheduler::new(backends.tasks),
            gate: BusyGate::new(backends.jobs, routes.clone()),
            routes,
            policy,
            default_zone: None,
            metrics: noop_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.instances = self.instances.with_metrics(metrics.clone());
        self.stops = self.stops.with_metrics(metrics.clone());
        self.gate = self.gate.with_metrics(metrics.clone());
        self.metrics = metrics;
        self
    }

    /// Zone used for control requests naming an instance the routing table does not know.
    pub fn with_default_zone(mut self, zone: impl Into<Zone>) -> Self {
        self.default_zone = Some(zone.into());
        self
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn policy(&self) -> &OrchestratorPolicy {
        &self.policy
    }

    /// Route a job-lifecycle event to its instance and apply the matching transition.
    #[instrument(skip_all, fields(repo = %event.repo(), action = %event.action.as_str()))]
    pub async fn handle_job(&self, event: &JobEvent) -> Result<JobDisposition, CoreError> {
        let action = event.action.as_str();
        let entry = match self.routes.find(event.repo(), event.labels()) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                info!(labels = ?event.labels(), "no routing entry matched, skipping");
                self.metrics.record_event(action, EventOutcome::NoMatch);
                return Ok(JobDisposition::NoMatch);
            }
            Err(e) => {
                error!(labels = ?event.labels(), error = %e, "ambiguous routing, skipping");
                self.metrics.record_event(action, EventOutcome::Ambiguous);
                return Ok(JobDisposition::Ambiguous(e));
            }
        };
        let target = entry.target();

        let result = match event.action {
            JobAction::Queued => self.on_queued(&target).await,
            JobAction::Completed => self.on_completed(&target).await,
            _ => {
                debug!(instance = %target.instance_id, "action needs no side effect");
                Ok(JobDisposition::Ignored(target))
            }
        };

        let outcome = match &result {
            Ok(JobDisposition::Ignored(_)) => EventOutcome::Ignored,
            Ok(_) => EventOutcome::Handled,
            Err(_) => EventOutcome::Failed,
        };
        self.metrics.record_event(action, outcome);
        result
    }

    async fn on_queued(&self, target: &InstanceTarget) -> Result<JobDisposition, CoreError> {
        if self.policy.cancel_stop_on_queued
            && let Err(e) = self.stops.cancel_stop(&target.instance_id).await
        {
            warn!(instance = %target.instance_id, error = %e, "could not cancel pending stop");
        }
        let outcome = self.instances.ensure_running(target).await?;
        Ok(JobDisposition::Started(target.clone(), outcome))
    }

    async fn on_completed(&self, target: &InstanceTarget) -> Result<JobDisposition, CoreError> {
        let pending = self
            .stops
            .debounce_stop(target, self.policy.inactivity_delay, 0)
            .await?;
        Ok(JobDisposition::StopScheduled(target.clone(), pending))
    }

    /// Manual start.
    #[instrument(skip_all, fields(instance = %req.instance_id))]
    pub async fn start(&self, req: &RunnerRequest) -> Result<StartOutcome, CoreError> {
        let target = self.resolve(req)?;
        self.instances.ensure_running(&target).await
    }

    /// Stop path, reached by a fired pending stop or a manual call.
    ///
    /// The busy gate runs first; a busy or unknown runner re-arms the pending stop with
    /// `attempt + 1` instead of stopping.
    #[instrument(skip_all, fields(instance = %req.instance_id, attempt = req.attempt))]
    pub async fn stop(&self, req: &RunnerRequest) -> Result<StopOutcome, CoreError> {
        let target = self.resolve(req)?;

        let verdict = self.gate.check(&target.instance_id).await;
        if let Some(reason) = verdict.skip_reason() {
            let retry = self.policy.retry_delay;
            if let Err(e) = self
                .stops
                .debounce_stop(&target, retry, req.attempt.saturating_add(1))
                .await
            {
                error!(
                    reason = reason.as_label(),
                    error = %e,
                    "could not re-arm stop, instance has no pending stop"
                );
                return Err(e);
            }
            info!(
                reason = reason.as_label(),
                retry_in_secs = retry.as_secs(),
                "stop deferred"
            );
            self.metrics.record_stop_rearm(reason);
            return Ok(StopOutcome::Skipped {
                reason,
                retry_in_secs: retry.as_secs(),
            });
        }

        self.instances.ensure_stopped(&target).await
    }

    /// Drop the pending stop for the instance, if any.
    #[instrument(skip_all, fields(instance = %req.instance_id))]
    pub async fn cancel_stop(&self, req: &RunnerRequest) -> Result<bool, CoreError> {
        self.stops.cancel_stop(&req.instance_id).await
    }

    /// Request zone, else the routed zone, else the default zone.
    fn resolve(&self, req: &RunnerRequest) -> Result<InstanceTarget, CoreError> {
        let zone = req
            .zone
            .clone()
            .filter(|z| !z.trim().is_empty())
            .or_else(|| self.routes.zone_for(&req.instance_id).map(str::to_string))
            .or_else(|| self.default_zone.clone())
            .ok_or_else(|| CoreError::UnresolvedZone(req.instance_id.clone()))?;
        Ok(InstanceTarget::new(req.instance_id.clone(), zone))
    }
}

#[cfg(test)]
mod tests {
    use idler_model::{InstanceId, InstanceState, SkipReason};

    use super::*;
    use crate::{
        BackendError,
        memory::{MemoryBackends, MemoryCompute, MemoryMetrics, TaskCall},
    };

    const ROUTES: &str = r#"[
        {"repo": "acme/app", "labels": ["self-hosted", "linux"], "instance_id": "vm1", "zone": "us-central1-a"},
        {"repo": "acme/lib", "labels": ["self-hosted"], "instance_id": "vm1", "zone": "us-central1-a"}
    ]"#;

    fn setup(state: InstanceState) -> (MemoryBackends, Orchestrator) {
        let mem = MemoryBackends {
            compute: Arc::new(MemoryCompute::new().with_instance("vm1", state)),
            ..MemoryBackends::new()
        };
        let routes = Arc::new(RoutingTable::from_json(ROUTES, None).unwrap());
        let orch = Orchestrator::new(routes, mem.backends(), OrchestratorPolicy::default());
        (mem, orch)
    }

    fn event(action: &str, repo: &str, labels: &[&str]) -> JobEvent {
        serde_json::from_value(serde_json::json!({
            "action": action,
            "repository": { "full_name": repo },
            "workflow_job": { "labels": labels }
        }))
        .unwrap()
    }

    fn vm1() -> RunnerRequest {
        RunnerRequest::new(InstanceId::new("vm1").unwrap())
    }

    #[tokio::test]
    async fn queued_starts_a_stopped_instance() {
        let (mem, orch) = setup(InstanceState::Terminated);

        let out = orch
            .handle_job(&event("queued", "acme/app", &["self-hosted", "linux", "x64"]))
            .await
            .unwrap();

        let JobDisposition::Started(target, StartOutcome::Starting { .. }) = &out else {
            panic!("unexpected disposition: {out:?}");
        };
        assert_eq!(target.instance_id.as_str(), "vm1");
        assert_eq!(mem.compute.count("start", "vm1"), 1);
        assert_eq!(mem.compute.state("vm1"), Some(InstanceState::Running));
    }

    #[tokio::test]
    async fn queued_cancels_pending_stop_by_default() {
        let (mem, orch) = setup(InstanceState::Running);
        orch.handle_job(&event("completed", "acme/lib", &["self-hosted"]))
            .await
            .unwrap();
        assert_eq!(mem.tasks.live_count(), 1);

        let out = orch
            .handle_job(&event("queued", "acme/lib", &["self-hosted"]))
            .await
            .unwrap();
        assert!(matches!(
            out,
            JobDisposition::Started(_, StartOutcome::AlreadyRunning)
        ));
        assert_eq!(mem.tasks.live_count(), 0);
        assert_eq!(mem.compute.count("start", "vm1"), 0);
    }

    #[tokio::test]
    async fn queued_keeps_pending_stop_when_policy_disabled() {
        let mem = MemoryBackends {
            compute: Arc::new(MemoryCompute::new().with_instance("vm1", InstanceState::Running)),
            ..MemoryBackends::new()
        };
        let routes = Arc::new(RoutingTable::from_json(ROUTES, None).unwrap());
        let policy = OrchestratorPolicy {
            cancel_stop_on_queued: false,
            ..OrchestratorPolicy::default()
        };
        let orch = Orchestrator::new(routes, mem.backends(), policy);

        orch.handle_job(&event("completed", "acme/lib", &["self-hosted"]))
            .await
            .unwrap();
        orch.handle_job(&event("queued", "acme/lib", &["self-hosted"]))
            .await
            .unwrap();
        assert_eq!(mem.tasks.live_count(), 1);
    }

    #[tokio::test]
    async fn queued_still_starts_when_cancel_fails() {
        let (mem, orch) = setup(InstanceState::Terminated);
        mem.tasks.fail_delete(true);

        let out = orch
            .handle_job(&event("queued", "acme/lib", &["self-hosted"]))
            .await
            .unwrap();
        assert!(matches!(out, JobDisposition::Started(..)));
        assert_eq!(mem.compute.count("start", "vm1"), 1);
    }

    #[tokio::test]
    async fn completed_debounces_stop_after_inactivity() {
        let (mem, orch) = setup(InstanceState::Running);

        let out = orch
            .handle_job(&event("completed", "acme/app", &["self-hosted", "linux"]))
            .await
            .unwrap();
        assert!(matches!(out, JobDisposition::StopScheduled(..)));

        assert_eq!(
            mem.tasks.calls(),
            vec![
                TaskCall::Delete("stop-vm1".into()),
                TaskCall::Create("stop-vm1".into())
            ]
        );
        let task = mem.tasks.get("stop-vm1").unwrap();
        assert_eq!(task.delay, Duration::from_secs(180));
        assert_eq!(task.request.attempt, 0);
        assert_eq!(mem.compute.count("stop", "vm1"), 0);
    }

    #[tokio::test]
    async fn repeated_completions_leave_one_pending_stop() {
        let (mem, orch) = setup(InstanceState::Running);
        for _ in 0..4 {
            orch.handle_job(&event("completed", "acme/lib", &["self-hosted"]))
                .await
                .unwrap();
        }
        assert_eq!(mem.tasks.live_count(), 1);
    }

    #[tokio::test]
    async fn other_actions_are_ignored() {
        let (mem, orch) = setup(InstanceState::Running);
        for action in ["in_progress", "waiting", "requested"] {
            let out = orch
                .handle_job(&event(action, "acme/lib", &["self-hosted"]))
                .await
                .unwrap();
            assert!(matches!(out, JobDisposition::Ignored(_)));
        }
        assert!(mem.compute.calls().is_empty());
        assert!(mem.tasks.calls().is_empty());
    }

    #[tokio::test]
    async fn unmatched_event_touches_nothing() {
        let (mem, orch) = setup(InstanceState::Terminated);

        let out = orch
            .handle_job(&event("queued", "acme/app", &["ubuntu-latest"]))
            .await
            .unwrap();
        assert_eq!(out, JobDisposition::NoMatch);

        let out = orch
            .handle_job(&event("queued", "other/repo", &["self-hosted"]))
            .await
            .unwrap();
        assert_eq!(out, JobDisposition::NoMatch);

        assert!(mem.compute.calls().is_empty());
        assert!(mem.tasks.calls().is_empty());
    }

    #[tokio::test]
    async fn callback_while_busy_rearms_without_stopping() {
        let (mem, orch) = setup(InstanceState::Running);
        mem.jobs.set_runner("acme/lib", "vm1", true);

        let out = orch.stop(&vm1().with_attempt(2)).await.unwrap();
        assert_eq!(
            out,
            StopOutcome::Skipped {
                reason: SkipReason::RunnerBusy,
                retry_in_secs: 60
            }
        );

        assert_eq!(mem.compute.count("stop", "vm1"), 0);
        let task = mem.tasks.get("stop-vm1").unwrap();
        assert_eq!(task.delay, Duration::from_secs(60));
        assert_eq!(task.request.attempt, 3);
    }

    #[tokio::test]
    async fn callback_with_unknown_busy_state_rearms() {
        let (mem, orch) = setup(InstanceState::Running);
        mem.jobs.set_failing(true);

        let out = orch.stop(&vm1()).await.unwrap();
        assert!(matches!(
            out,
            StopOutcome::Skipped {
                reason: SkipReason::BusyStateUnknown,
                ..
            }
        ));
        assert_eq!(mem.compute.count("stop", "vm1"), 0);
        assert_eq!(mem.tasks.live_count(), 1);
    }

    #[tokio::test]
    async fn failed_rearm_surfaces_and_leaves_no_pending_stop() {
        let (mem, orch) = setup(InstanceState::Running);
        let metrics = Arc::new(MemoryMetrics::new());
        let orch = orch.with_metrics(metrics.clone());

        orch.handle_job(&event("completed", "acme/lib", &["self-hosted"]))
            .await
            .unwrap();
        mem.jobs.set_runner("acme/lib", "vm1", true);
        mem.tasks.fail_create(true);

        let err = orch.stop(&vm1().with_attempt(1)).await.unwrap_err();
        assert!(matches!(err, CoreError::Backend(BackendError::Transport { .. })));

        assert_eq!(mem.tasks.live_count(), 0);
        assert_eq!(mem.compute.count("stop", "vm1"), 0);
        assert_eq!(metrics.count("backend_error:tasks,create"), 1);
        assert_eq!(metrics.count("rearm:runner_busy"), 0);
    }

    #[tokio::test]
    async fn job_matching_two_instances_is_skipped_and_counted() {
        let mem = MemoryBackends::new();
        let routes = RoutingTable::from_json(
            r#"[
                {"repo": "acme/app", "labels": ["linux"], "instance_id": "vm1", "zone": "z"},
                {"repo": "acme/app", "labels": ["gpu"], "instance_id": "vm2", "zone": "z"}
            ]"#,
            None,
        )
        .unwrap();
        let metrics = Arc::new(MemoryMetrics::new());
        let orch = Orchestrator::new(
            Arc::new(routes),
            mem.backends(),
            OrchestratorPolicy::default(),
        )
        .with_metrics(metrics.clone());

        let out = orch
            .handle_job(&event("queued", "acme/app", &["linux", "gpu"]))
            .await
            .unwrap();
        assert!(matches!(
            out,
            JobDisposition::Ambiguous(RoutingError::Ambiguous {
                first: 0,
                second: 1,
                ..
            })
        ));
        assert!(mem.compute.calls().is_empty());
        assert!(mem.tasks.calls().is_empty());
        assert_eq!(metrics.samples(), vec!["event:queued,ambiguous".to_string()]);
    }

    #[tokio::test]
    async fn callback_while_idle_stops_exactly_once() {
        let (mem, orch) = setup(InstanceState::Running);
        mem.jobs.set_runner("acme/app", "vm1", false);

        let out = orch.stop(&vm1()).await.unwrap();
        assert!(matches!(out, StopOutcome::Stopping { .. }));

        let out = orch.stop(&vm1()).await.unwrap();
        assert_eq!(out, StopOutcome::AlreadyStopped);

        assert_eq!(mem.compute.count("stop", "vm1"), 1);
        assert_eq!(mem.tasks.live_count(), 0);
    }

    #[tokio::test]
    async fn full_cycle_from_queued_to_stopped() {
        let (mem, orch) = setup(InstanceState::Terminated);

        orch.handle_job(&event("queued", "acme/lib", &["self-hosted"]))
            .await
            .unwrap();
        mem.jobs.set_runner("acme/lib", "vm1", true);
        orch.handle_job(&event("completed", "acme/lib", &["self-hosted"]))
            .await
            .unwrap();

        let fired = mem.tasks.take("stop-vm1").unwrap();
        orch.stop(&fired.request).await.unwrap();
        assert_eq!(mem.compute.state("vm1"), Some(InstanceState::Running));

        mem.jobs.set_runner("acme/lib", "vm1", false);
        let fired = mem.tasks.take("stop-vm1").unwrap();
        assert_eq!(fired.request.attempt, 1);
        orch.stop(&fired.request).await.unwrap();

        assert_eq!(mem.compute.state("vm1"), Some(InstanceState::Terminated));
        assert_eq!(mem.tasks.live_count(), 0);
    }

    #[tokio::test]
    async fn zone_falls_back_to_routes_then_default() {
        let (mem, orch) = setup(InstanceState::Terminated);
        mem.compute.set_state("vm7", InstanceState::Terminated);

        orch.start(&vm1()).await.unwrap();

        let vm7 = RunnerRequest::new(InstanceId::new("vm7").unwrap());
        let err = orch.start(&vm7).await.unwrap_err();
        assert!(matches!(err, CoreError::UnresolvedZone(_)));

        let orch = orch.with_default_zone("europe-west1-b");
        orch.start(&vm7).await.unwrap();
        assert_eq!(mem.compute.count("start", "vm7"), 1);
    }

    #[tokio::test]
    async fn backend_failure_surfaces_from_start() {
        let (mem, orch) = setup(InstanceState::Terminated);
        mem.compute.fail_on("status");

        let err = orch.start(&vm1()).await.unwrap_err();
        assert!(matches!(err, CoreError::Backend(BackendError::Rejected { .. })));
    }

    #[tokio::test]
    async fn cancel_stop_reports_pending_state() {
        let (_mem, orch) = setup(InstanceState::Running);
        assert!(!orch.cancel_stop(&vm1()).await.unwrap());

        orch.handle_job(&event("completed", "acme/lib", &["self-hosted"]))
            .await
            .unwrap();
        assert!(orch.cancel_stop(&vm1()).await.unwrap());
    }
}
