//! In-memory backends for tests and local dry runs.
//!
//! Each backend keeps a call log so tests can assert on exactly what the orchestrator asked for,
//! and can be told to fail an operation to exercise error paths.
mod compute;
pub use compute::MemoryCompute;

mod jobs;
pub use jobs::MemoryJobs;

mod metrics;
pub use metrics::MemoryMetrics;

mod tasks;
pub use tasks::{MemoryTasks, TaskCall};

use std::sync::{Arc, PoisonError};

use crate::{backend::Backends, error::BackendError};

fn poisoned<T>(backend: &'static str) -> impl FnOnce(PoisonError<T>) -> BackendError {
    move |_| BackendError::Transport {
        backend,
        message: "state lock poisoned".into(),
    }
}

/// Fresh in-memory instances of all three backends.
#[derive(Clone, Default)]
pub struct MemoryBackends {
    pub compute: Arc<MemoryCompute>,
    pub tasks: Arc<MemoryTasks>,
    pub jobs: Arc<MemoryJobs>,
}

impl MemoryBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backends(&self) -> Backends {
        Backends {
            compute: self.compute.clone(),
            tasks: self.tasks.clone(),
            jobs: self.jobs.clone(),
        }
    }
}
