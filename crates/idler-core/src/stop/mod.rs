//! Debounced, deterministic-key stop scheduling.
//!
//! Every instance has at most one pending stop, addressed by [`pending_stop_key`]. Scheduling
//! always deletes whatever sits under that key before creating the replacement, so the most
//! recent call defines the fire time.
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use idler_model::{InstanceId, InstanceTarget, RunnerRequest};
use tracing::{debug, info, instrument, warn};

use crate::{
    backend::{DeferredTask, TaskBackend},
    error::{BackendError, CoreError},
    metrics::{MetricsHandle, noop_metrics},
};

/// Key of the single pending stop for `instance`.
pub fn pending_stop_key(instance: &InstanceId) -> String {
    format!("stop-{instance}")
}

/// A stop that has been (re)scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStop {
    pub key: String,
    /// Name the task backend assigned to the created task.
    pub task_name: String,
    pub schedule_at: SystemTime,
    /// `true` when an earlier pending stop was deleted to make room.
    pub replaced: bool,
}

#[derive(Clone)]
pub struct StopScheduler {
    tasks: Arc<dyn TaskBackend>,
    metrics: MetricsHandle,
}

impl StopScheduler {
    pub fn new(tasks: Arc<dyn TaskBackend>) -> Self {
        Self {
            tasks,
            metrics: noop_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the pending stop for `target` with one firing after `delay`.
    ///
    /// The delete runs first and must succeed; if it fails nothing is created, so two live tasks
    /// for one instance can never coexist.
    #[instrument(
        skip_all,
        fields(instance = %target.instance_id, delay_secs = delay.as_secs(), attempt = attempt)
    )]
    pub async fn debounce_stop(
        &self,
        target: &InstanceTarget,
        delay: Duration,
        attempt: u32,
    ) -> Result<PendingStop, CoreError> {
        let key = pending_stop_key(&target.instance_id);

        let replaced = self
            .tasks
            .delete(&key)
            .await
            .map_err(|e| self.failed("delete", e))?;
        if replaced {
            debug!(%key, "previous pending stop deleted");
        }

        let schedule_at = SystemTime::now() + delay;
        let request = RunnerRequest::new(target.instance_id.clone())
            .with_zone(target.zone.clone())
            .with_attempt(attempt);
        let task_name = self
            .tasks
            .create(DeferredTask {
                key: key.clone(),
                delay,
                schedule_at,
                request,
            })
            .await
            .map_err(|e| self.failed("create", e))?;

        info!(%key, %task_name, attempt, replaced, "stop scheduled");
        Ok(PendingStop {
            key,
            task_name,
            schedule_at,
            replaced,
        })
    }

    /// Delete the pending stop for `instance`, if any.
    #[instrument(skip_all, fields(instance = %instance))]
    pub async fn cancel_stop(&self, instance: &InstanceId) -> Result<bool, CoreError> {
        let key = pending_stop_key(instance);
        let deleted = self
            .tasks
            .delete(&key)
            .await
            .map_err(|e| self.failed("delete", e))?;
        if deleted {
            info!(%key, "pending stop cancelled");
        } else {
            debug!(%key, "no pending stop to cancel");
        }
        Ok(deleted)
    }

    fn failed(&self, op: &str, err: BackendError) -> CoreError {
        warn!(backend = err.backend(), op, error = %err, "task backend call failed");
        self.metrics.record_backend_error("tasks", op);
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryTasks, TaskCall};

    fn target(id: &str) -> InstanceTarget {
        InstanceTarget::new(InstanceId::new(id).unwrap(), "us-central1-a")
    }

    #[test]
    fn key_is_derived_from_instance() {
        let id = InstanceId::new("runner-1").unwrap();
        assert_eq!(pending_stop_key(&id), "stop-runner-1");
    }

    #[tokio::test]
    async fn deletes_before_create() {
        let tasks = Arc::new(MemoryTasks::new());
        let sched = StopScheduler::new(tasks.clone());

        let pending = sched
            .debounce_stop(&target("vm1"), Duration::from_secs(180), 0)
            .await
            .unwrap();
        assert!(!pending.replaced);
        assert_eq!(
            tasks.calls(),
            vec![
                TaskCall::Delete("stop-vm1".into()),
                TaskCall::Create("stop-vm1".into())
            ]
        );

        let task = tasks.get("stop-vm1").unwrap();
        assert_eq!(task.delay, Duration::from_secs(180));
        assert_eq!(task.request.zone.as_deref(), Some("us-central1-a"));
        assert_eq!(task.request.attempt, 0);
    }

    #[tokio::test]
    async fn repeated_debounce_keeps_one_task_with_last_delay() {
        let tasks = Arc::new(MemoryTasks::new());
        let sched = StopScheduler::new(tasks.clone());
        let vm = target("vm1");

        for secs in [60, 120, 300] {
            sched
                .debounce_stop(&vm, Duration::from_secs(secs), 0)
                .await
                .unwrap();
        }

        assert_eq!(tasks.live_count(), 1);
        assert_eq!(
            tasks.get("stop-vm1").unwrap().delay,
            Duration::from_secs(300)
        );
    }

    #[tokio::test]
    async fn failed_delete_creates_nothing() {
        let tasks = Arc::new(MemoryTasks::new());
        tasks.fail_delete(true);
        let sched = StopScheduler::new(tasks.clone());

        let err = sched
            .debounce_stop(&target("vm1"), Duration::from_secs(60), 0)
            .await;
        assert!(err.is_err());
        assert_eq!(tasks.calls(), vec![TaskCall::Delete("stop-vm1".into())]);
        assert_eq!(tasks.live_count(), 0);
    }

    #[tokio::test]
    async fn cancel_reports_whether_a_stop_was_pending() {
        let tasks = Arc::new(MemoryTasks::new());
        let sched = StopScheduler::new(tasks.clone());
        let vm = target("vm1");

        assert!(!sched.cancel_stop(&vm.instance_id).await.unwrap());

        sched
            .debounce_stop(&vm, Duration::from_secs(60), 0)
            .await
            .unwrap();
        assert!(sched.cancel_stop(&vm.instance_id).await.unwrap());
        assert_eq!(tasks.live_count(), 0);
    }
}
