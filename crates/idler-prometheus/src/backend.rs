use std::sync::Arc;

use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder, proto::MetricFamily};

use idler_core::{EventOutcome, MetricsBackend, PowerAction};
use idler_model::SkipReason;

const NAMESPACE: &str = "idler";

/// Prometheus metrics backend.
///
/// ## Label cardinality
/// All labels are bounded:
/// - `action`: job actions as received, `invalid` for undecodable payloads, or `start`/`stop`
/// - `outcome`: "handled", "ignored", "no_match", "ambiguous", "failed"
/// - `result`: "issued", "noop"
/// - `reason`: "runner_busy", "busy_state_unknown"
/// - `backend`/`op`: fixed backend and operation names
#[derive(Clone)]
pub struct PrometheusMetrics {
    events: CounterVec,
    power_actions: CounterVec,
    stop_rearms: CounterVec,
    backend_errors: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    /// Create a new prometheus metrics backend with custom registry.
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let events = CounterVec::new(
            Opts::new("events_total", "Job-lifecycle events received").namespace(NAMESPACE),
            &["action", "outcome"],
        )?;
        registry.register(Box::new(events.clone()))?;

        let power_actions = CounterVec::new(
            Opts::new("power_actions_total", "Idempotent start/stop requests")
                .namespace(NAMESPACE),
            &["action", "result"],
        )?;
        registry.register(Box::new(power_actions.clone()))?;

        let stop_rearms = CounterVec::new(
            Opts::new("stop_rearms_total", "Deferred stops re-armed instead of executed")
                .namespace(NAMESPACE),
            &["reason"],
        )?;
        registry.register(Box::new(stop_rearms.clone()))?;

        let backend_errors = CounterVec::new(
            Opts::new("backend_errors_total", "Failed calls to external backends")
                .namespace(NAMESPACE),
            &["backend", "op"],
        )?;
        registry.register(Box::new(backend_errors.clone()))?;

        Ok(Self {
            events,
            power_actions,
            stop_rearms,
            backend_errors,
            registry,
        })
    }

    /// Create a new prometheus metrics backend with its own registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    /// Gather all metrics for exposition.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Encode every registered metric in the text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Content type matching [`PrometheusMetrics::render`].
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_event(&self, action: &str, outcome: EventOutcome) {
        self.events
            .with_label_values(&[action, outcome.as_label()])
            .inc();
    }

    fn record_power_action(&self, action: PowerAction, issued: bool) {
        let result = if issued { "issued" } else { "noop" };
        self.power_actions
            .with_label_values(&[action.as_label(), result])
            .inc();
    }

    fn record_stop_rearm(&self, reason: SkipReason) {
        self.stop_rearms
            .with_label_values(&[reason.as_label()])
            .inc();
    }

    fn record_backend_error(&self, backend: &str, op: &str) {
        self.backend_errors
            .with_label_values(&[backend, op])
            .inc();
    }
}
