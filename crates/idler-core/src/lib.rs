//! Runner lifecycle orchestration.
//!
//! Matches job-lifecycle events to managed instances, keeps those instances running while work
//! arrives, and schedules a debounced, busy-gated shutdown once they go idle. All state lives in
//! the three external systems behind [`backend`]; this crate holds none between requests.

pub mod backend;
pub use backend::{Backends, ComputeBackend, DeferredTask, JobStatusBackend, TaskBackend};

mod error;
pub use error::{BackendError, CoreError};

pub mod gate;
pub use gate::{BusyGate, BusyVerdict};

pub mod instance;
pub use instance::InstanceController;

pub mod memory;

pub mod metrics;
pub use metrics::{
    EventOutcome, MetricsBackend, MetricsHandle, NoOpMetrics, PowerAction, noop_metrics,
};

pub mod orchestrator;
pub use orchestrator::{JobDisposition, Orchestrator, OrchestratorPolicy};

pub mod stop;
pub use stop::{PendingStop, StopScheduler, pending_stop_key};
