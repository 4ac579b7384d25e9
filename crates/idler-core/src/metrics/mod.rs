//! Metrics collection abstraction for the orchestrator.
//!
//! Backends (prometheus, statsd, etc) implement [`MetricsBackend`] and are handed to
//! [`crate::Orchestrator::with_metrics`].
mod backend;
pub use backend::{EventOutcome, MetricsBackend, MetricsHandle, PowerAction};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

/// Create a no-op metrics handle.
#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}
