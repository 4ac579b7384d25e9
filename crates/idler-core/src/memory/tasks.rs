use std::{
    collections::HashMap,
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;

use super::poisoned;
use crate::{
    backend::{DeferredTask, TaskBackend},
    error::BackendError,
};

const BACKEND: &str = "memory-tasks";

/// One call received by [`MemoryTasks`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCall {
    Delete(String),
    Create(String),
}

/// Task backend that keeps live tasks in a map keyed by the deterministic key.
///
/// Nothing fires on its own; tests take a task with [`MemoryTasks::take`] and feed its request
/// to the stop path.
#[derive(Debug, Default)]
pub struct MemoryTasks {
    live: RwLock<HashMap<String, DeferredTask>>,
    calls: RwLock<Vec<TaskCall>>,
    fail_delete: AtomicBool,
    fail_create: AtomicBool,
    next_id: AtomicU64,
}

impl MemoryTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// The live task under `key`, if any.
    pub fn get(&self, key: &str) -> Option<DeferredTask> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Remove and return the live task under `key`, as if it had fired.
    pub fn take(&self, key: &str) -> Option<DeferredTask> {
        self.live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn live_count(&self) -> usize {
        self.live.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn calls(&self) -> Vec<TaskCall> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn log(&self, call: TaskCall) -> Result<(), BackendError> {
        self.calls.write().map_err(poisoned(BACKEND))?.push(call);
        Ok(())
    }
}

#[async_trait]
impl TaskBackend for MemoryTasks {
    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        self.log(TaskCall::Delete(key.to_string()))?;
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(BackendError::Transport {
                backend: BACKEND,
                message: "delete failed".into(),
            });
        }
        Ok(self
            .live
            .write()
            .map_err(poisoned(BACKEND))?
            .remove(key)
            .is_some())
    }

    async fn create(&self, task: DeferredTask) -> Result<String, BackendError> {
        self.log(TaskCall::Create(task.key.clone()))?;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BackendError::Transport {
                backend: BACKEND,
                message: "create failed".into(),
            });
        }

        let mut live = self.live.write().map_err(poisoned(BACKEND))?;
        if live.contains_key(&task.key) {
            return Err(BackendError::Rejected {
                backend: BACKEND,
                status: 409,
                message: format!("task {} already exists", task.key),
            });
        }
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let name = format!("{}-{n}", task.key);
        live.insert(task.key.clone(), task);
        Ok(name)
    }
}
