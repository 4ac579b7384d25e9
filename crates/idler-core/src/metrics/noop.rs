use idler_model::SkipReason;

use crate::metrics::backend::{EventOutcome, MetricsBackend, PowerAction};

/// No-op metrics backend that compiles to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    #[inline(always)]
    fn record_event(&self, _: &str, _: EventOutcome) {}

    #[inline(always)]
    fn record_power_action(&self, _: PowerAction, _: bool) {}

    #[inline(always)]
    fn record_stop_rearm(&self, _: SkipReason) {}

    #[inline(always)]
    fn record_backend_error(&self, _: &str, _: &str) {}
}
