use std::sync::Arc;

use idler_model::{InstanceId, RoutingTable, SkipReason};
use tracing::{debug, instrument, warn};

use crate::{
    backend::JobStatusBackend,
    metrics::{MetricsHandle, noop_metrics},
};

/// Answer of the busy check for one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyVerdict {
    /// No runner by that name, or every match reports idle.
    Idle,
    /// At least one repository reports the runner busy.
    Busy,
    /// A query failed and no repository reported busy.
    Uncertain,
}

impl BusyVerdict {
    /// Why a stop must be deferred, or `None` when it may proceed.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            BusyVerdict::Idle => None,
            BusyVerdict::Busy => Some(SkipReason::RunnerBusy),
            BusyVerdict::Uncertain => Some(SkipReason::BusyStateUnknown),
        }
    }
}

/// Asks the job-status surface whether the runner named after an instance has work in flight.
///
/// The runner name equals the instance id; every repository routed to the instance is checked,
/// since one runner may be registered in several of them.
#[derive(Clone)]
pub struct BusyGate {
    jobs: Arc<dyn JobStatusBackend>,
    routes: Arc<RoutingTable>,
    metrics: MetricsHandle,
}

impl BusyGate {
    pub fn new(jobs: Arc<dyn JobStatusBackend>, routes: Arc<RoutingTable>) -> Self {
        Self {
            jobs,
            routes,
            metrics: noop_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    #[instrument(skip_all, fields(instance = %instance))]
    pub async fn check(&self, instance: &InstanceId) -> BusyVerdict {
        let mut uncertain = false;

        for repo in self.routes.repos_for(instance) {
            match self.jobs.runner_busy(repo, instance.as_str()).await {
                Ok(Some(true)) => {
                    debug!(repo, "runner busy");
                    return BusyVerdict::Busy;
                }
                Ok(Some(false)) => debug!(repo, "runner idle"),
                Ok(None) => debug!(repo, "runner not registered"),
                Err(e) => {
                    warn!(repo, error = %e, "busy check failed");
                    self.metrics.record_backend_error("jobs", "runner_busy");
                    uncertain = true;
                }
            }
        }

        if uncertain {
            BusyVerdict::Uncertain
        } else {
            BusyVerdict::Idle
        }
    }

    /// `true` unless the verdict is [`BusyVerdict::Idle`].
    pub async fn is_busy(&self, instance: &InstanceId) -> bool {
        self.check(instance).await != BusyVerdict::Idle
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use idler_model::RoutingEntry;

    use super::*;
    use crate::memory::MemoryJobs;

    fn routes() -> Arc<RoutingTable> {
        let entry = |repo: &str| RoutingEntry {
            repo: repo.into(),
            labels: BTreeSet::from(["self-hosted".to_string()]),
            instance_id: InstanceId::new("vm1").unwrap(),
            zone: "us-central1-a".into(),
        };
        Arc::new(RoutingTable::new(vec![entry("o/a"), entry("o/b")]).unwrap())
    }

    fn vm1() -> InstanceId {
        InstanceId::new("vm1").unwrap()
    }

    #[tokio::test]
    async fn unregistered_runner_is_idle() {
        let jobs = Arc::new(MemoryJobs::new());
        let gate = BusyGate::new(jobs.clone(), routes());

        assert_eq!(gate.check(&vm1()).await, BusyVerdict::Idle);
        assert_eq!(jobs.queries(), 2);
    }

    #[tokio::test]
    async fn busy_in_any_repo_is_busy() {
        let jobs = Arc::new(MemoryJobs::new());
        jobs.set_runner("o/a", "vm1", false);
        jobs.set_runner("o/b", "vm1", true);
        let gate = BusyGate::new(jobs, routes());

        assert_eq!(gate.check(&vm1()).await, BusyVerdict::Busy);
        assert!(gate.is_busy(&vm1()).await);
    }

    #[tokio::test]
    async fn query_failure_is_uncertain() {
        let jobs = Arc::new(MemoryJobs::new());
        jobs.set_failing(true);
        let gate = BusyGate::new(jobs, routes());

        let verdict = gate.check(&vm1()).await;
        assert_eq!(verdict, BusyVerdict::Uncertain);
        assert_eq!(verdict.skip_reason(), Some(SkipReason::BusyStateUnknown));
        assert!(gate.is_busy(&vm1()).await);
    }

    #[tokio::test]
    async fn unrouted_instance_is_idle_without_queries() {
        let jobs = Arc::new(MemoryJobs::new());
        let gate = BusyGate::new(jobs.clone(), routes());

        let other = InstanceId::new("vm9").unwrap();
        assert_eq!(gate.check(&other).await, BusyVerdict::Idle);
        assert_eq!(jobs.queries(), 0);
    }
}
