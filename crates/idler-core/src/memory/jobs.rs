use std::{
    collections::HashMap,
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use super::poisoned;
use crate::{backend::JobStatusBackend, error::BackendError};

const BACKEND: &str = "memory-jobs";

/// Job-status backend backed by a `(repo, runner) -> busy` map.
#[derive(Debug, Default)]
pub struct MemoryJobs {
    runners: RwLock<HashMap<(String, String), bool>>,
    failing: AtomicBool,
    queries: AtomicUsize,
}

impl MemoryJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or update) a runner under `repo`.
    pub fn set_runner(&self, repo: &str, runner: &str, busy: bool) {
        self.runners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((repo.to_string(), runner.to_string()), busy);
    }

    /// Make every subsequent query fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStatusBackend for MemoryJobs {
    async fn runner_busy(&self, repo: &str, runner: &str) -> Result<Option<bool>, BackendError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Transport {
                backend: BACKEND,
                message: "job-status surface unavailable".into(),
            });
        }
        let runners = self.runners.read().map_err(poisoned(BACKEND))?;
        Ok(runners
            .get(&(repo.to_string(), runner.to_string()))
            .copied())
    }
}
