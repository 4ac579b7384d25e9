use std::sync::{PoisonError, RwLock};

use idler_model::SkipReason;

use crate::metrics::{EventOutcome, MetricsBackend, PowerAction};

/// Metrics backend that keeps every recorded sample as a `name:label,label` line.
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    samples: RwLock<Vec<String>>,
}

impl MemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<String> {
        self.samples
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded samples equal to `sample`.
    pub fn count(&self, sample: &str) -> usize {
        self.samples
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| *s == sample)
            .count()
    }

    fn push(&self, sample: String) {
        self.samples
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample);
    }
}

impl MetricsBackend for MemoryMetrics {
    fn record_event(&self, action: &str, outcome: EventOutcome) {
        self.push(format!("event:{action},{}", outcome.as_label()));
    }

    fn record_power_action(&self, action: PowerAction, issued: bool) {
        self.push(format!("power:{},{issued}", action.as_label()));
    }

    fn record_stop_rearm(&self, reason: SkipReason) {
        self.push(format!("rearm:{}", reason.as_label()));
    }

    fn record_backend_error(&self, backend: &str, op: &str) {
        self.push(format!("backend_error:{backend},{op}"));
    }
}
