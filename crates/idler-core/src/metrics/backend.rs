use std::sync::Arc;

use idler_model::SkipReason;

/// How an inbound job event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// A routing entry matched and the side effect succeeded.
    Handled,
    /// A routing entry matched but the action needs no side effect.
    Ignored,
    /// No routing entry matched.
    NoMatch,
    /// Entries for more than one instance matched; nothing was done.
    Ambiguous,
    /// A routing entry matched and the side effect failed.
    Failed,
}

impl EventOutcome {
    /// Return label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            EventOutcome::Handled => "handled",
            EventOutcome::Ignored => "ignored",
            EventOutcome::NoMatch => "no_match",
            EventOutcome::Ambiguous => "ambiguous",
            EventOutcome::Failed => "failed",
        }
    }
}

/// Power transition requested from the compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Start,
    Stop,
}

impl PowerAction {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            PowerAction::Start => "start",
            PowerAction::Stop => "stop",
        }
    }
}

/// Backend metrics collection interface.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record an inbound job event.
    ///
    /// # Arguments
    /// - `action`: Job action as received (`queued`, `completed`, ...)
    /// - `outcome`: What the orchestrator did with it
    fn record_event(&self, action: &str, outcome: EventOutcome);
    /// Record an idempotent power request.
    ///
    /// `issued` is `false` when the instance was already in the requested state.
    fn record_power_action(&self, action: PowerAction, issued: bool);
    /// Record a deferred stop that was re-armed instead of executed.
    fn record_stop_rearm(&self, reason: SkipReason);
    /// Record a failed call to an external backend.
    ///
    /// # Arguments
    /// - `backend`: Backend name (`compute`, `tasks`, `jobs`)
    /// - `op`: Operation that failed
    fn record_backend_error(&self, backend: &str, op: &str);
}

/// Shared handle to metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
