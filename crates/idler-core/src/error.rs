use thiserror::Error;

use idler_model::InstanceId;

/// Failure reported by one of the external systems of record.
///
/// Surfaced unchanged to callers; nothing in this crate retries it.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend}: request failed: {message}")]
    Transport {
        backend: &'static str,
        message: String,
    },

    #[error("{backend}: authentication failed: {message}")]
    Auth {
        backend: &'static str,
        message: String,
    },

    #[error("{backend}: {resource} not found")]
    NotFound {
        backend: &'static str,
        resource: String,
    },

    #[error("{backend}: rejected with status {status}: {message}")]
    Rejected {
        backend: &'static str,
        status: u16,
        message: String,
    },

    #[error("{backend}: unexpected response: {message}")]
    InvalidResponse {
        backend: &'static str,
        message: String,
    },
}

impl BackendError {
    /// Name of the backend that failed, for logs and metric labels.
    pub fn backend(&self) -> &'static str {
        match self {
            BackendError::Transport { backend, .. }
            | BackendError::Auth { backend, .. }
            | BackendError::NotFound { backend, .. }
            | BackendError::Rejected { backend, .. }
            | BackendError::InvalidResponse { backend, .. } => backend,
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("no zone known for instance '{0}'")]
    UnresolvedZone(InstanceId),
}
