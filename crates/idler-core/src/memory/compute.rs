use std::{
    collections::{HashMap, HashSet},
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use idler_model::{InstanceState, InstanceTarget, OperationId};

use super::poisoned;
use crate::{backend::ComputeBackend, error::BackendError};

const BACKEND: &str = "memory-compute";

/// Compute backend whose start/stop take effect immediately.
#[derive(Debug, Default)]
pub struct MemoryCompute {
    states: RwLock<HashMap<String, InstanceState>>,
    calls: RwLock<Vec<String>>,
    failing: RwLock<HashSet<&'static str>>,
    next_op: AtomicU64,
}

impl MemoryCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance in the given state.
    pub fn with_instance(self, id: &str, state: InstanceState) -> Self {
        self.set_state(id, state);
        self
    }

    pub fn set_state(&self, id: &str, state: InstanceState) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), state);
    }

    pub fn state(&self, id: &str) -> Option<InstanceState> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Make every subsequent call of `op` (`status`, `start`, `stop`) fail.
    pub fn fail_on(&self, op: &'static str) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op);
    }

    /// Calls received so far, as `"<op> <instance>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of `op` calls received for `id`.
    pub fn count(&self, op: &str, id: &str) -> usize {
        let needle = format!("{op} {id}");
        self.calls().iter().filter(|c| **c == needle).count()
    }

    fn enter(&self, op: &'static str, target: &InstanceTarget) -> Result<(), BackendError> {
        self.calls
            .write()
            .map_err(poisoned(BACKEND))?
            .push(format!("{op} {}", target.instance_id));

        if self.failing.read().map_err(poisoned(BACKEND))?.contains(op) {
            return Err(BackendError::Rejected {
                backend: BACKEND,
                status: 500,
                message: format!("{op} failed"),
            });
        }
        Ok(())
    }

    fn transition(
        &self,
        target: &InstanceTarget,
        to: InstanceState,
    ) -> Result<OperationId, BackendError> {
        let mut states = self.states.write().map_err(poisoned(BACKEND))?;
        let state = states
            .get_mut(target.instance_id.as_str())
            .ok_or_else(|| not_found(target))?;
        *state = to;

        let n = self.next_op.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("operation-{n}"))
    }
}

fn not_found(target: &InstanceTarget) -> BackendError {
    BackendError::NotFound {
        backend: BACKEND,
        resource: format!("instance {target}"),
    }
}

#[async_trait]
impl ComputeBackend for MemoryCompute {
    async fn status(&self, target: &InstanceTarget) -> Result<InstanceState, BackendError> {
        self.enter("status", target)?;
        let states = self.states.read().map_err(poisoned(BACKEND))?;
        states
            .get(target.instance_id.as_str())
            .cloned()
            .ok_or_else(|| not_found(target))
    }

    async fn start(&self, target: &InstanceTarget) -> Result<OperationId, BackendError> {
        self.enter("start", target)?;
        self.transition(target, InstanceState::Running)
    }

    async fn stop(&self, target: &InstanceTarget) -> Result<OperationId, BackendError> {
        self.enter("stop", target)?;
        self.transition(target, InstanceState::Terminated)
    }
}
