use thiserror::Error;

/// Construction-time failures of the GCP backends.
///
/// Per-call failures are reported as [`idler_core::BackendError`].
#[derive(Debug, Error)]
pub enum GcpError {
    #[error("invalid gcp config: {0}")]
    Config(String),

    #[error("gcp auth: {0}")]
    Auth(#[from] gcp_auth::Error),

    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
}
