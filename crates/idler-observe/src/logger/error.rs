use thiserror::Error;
use tracing_subscriber::util::TryInitError;

/// Failures while reading `LOG_*` settings or installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("LOG_FORMAT '{0}' is not one of text, json, gcp, journald")]
    InvalidFormat(String),

    #[error("LOG_LEVEL '{value}' is not a valid filter: {reason}")]
    InvalidLevel { value: String, reason: String },

    #[error("journald output needs Linux and the `journald` feature")]
    JournaldUnavailable,

    #[error("journald socket unavailable: {0}")]
    Journald(#[source] std::io::Error),

    #[error("could not install the global subscriber: {0}")]
    Install(#[from] TryInitError),
}
