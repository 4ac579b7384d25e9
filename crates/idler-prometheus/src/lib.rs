//! Prometheus metrics backend for the idler orchestrator.
//!
//! [`PrometheusMetrics`] implements [`idler_core::MetricsBackend`] and is handed to
//! [`idler_core::Orchestrator::with_metrics`]. Exposition is left to the HTTP layer:
//!
//! ```rust,ignore
//! let metrics = PrometheusMetrics::new()?;
//! let body = metrics.render()?;
//! ```
//!
//! ## Metrics
//! - `idler_events_total{action, outcome}` - Counter
//! - `idler_power_actions_total{action, result}` - Counter
//! - `idler_stop_rearms_total{reason}` - Counter
//! - `idler_backend_errors_total{backend, op}` - Counter

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
