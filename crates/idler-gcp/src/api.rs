//! Plumbing shared by the Google REST clients.
use std::sync::Arc;

use gcp_auth::TokenProvider;
use idler_core::BackendError;
use reqwest::{Response, StatusCode};
use serde::Deserialize;

/// Google API error envelope.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

pub(crate) async fn access_token(
    provider: &Arc<dyn TokenProvider>,
    backend: &'static str,
    scopes: &[&str],
) -> Result<String, BackendError> {
    let token = provider
        .token(scopes)
        .await
        .map_err(|e| BackendError::Auth {
            backend,
            message: e.to_string(),
        })?;
    Ok(token.as_str().to_string())
}

pub(crate) fn transport(backend: &'static str, err: reqwest::Error) -> BackendError {
    BackendError::Transport {
        backend,
        message: err.to_string(),
    }
}

/// Turn a non-success response into a [`BackendError`].
pub(crate) async fn error_from_response(
    backend: &'static str,
    resource: &str,
    response: Response,
) -> BackendError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    error_from_parts(backend, resource, status, &body)
}

pub(crate) fn error_from_parts(
    backend: &'static str,
    resource: &str,
    status: StatusCode,
    body: &str,
) -> BackendError {
    let message = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(r) if r.error.status.is_empty() => r.error.message,
        Ok(r) => format!("{} ({})", r.error.message, r.error.status),
        Err(_) => body.to_string(),
    };

    match status {
        StatusCode::NOT_FOUND => BackendError::NotFound {
            backend,
            resource: resource.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Auth { backend, message },
        _ => BackendError::Rejected {
            backend,
            status: status.as_u16(),
            message,
        },
    }
}

pub(crate) async fn parse_json<T: for<'de> Deserialize<'de>>(
    backend: &'static str,
    response: Response,
) -> Result<T, BackendError> {
    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::InvalidResponse {
            backend,
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_error_envelope_is_unwrapped() {
        let body = r#"{"error":{"code":403,"message":"Permission denied","status":"PERMISSION_DENIED"}}"#;
        let err = error_from_parts("compute", "vm1", StatusCode::FORBIDDEN, body);
        match err {
            BackendError::Auth { backend, message } => {
                assert_eq!(backend, "compute");
                assert_eq!(message, "Permission denied (PERMISSION_DENIED)");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn not_found_names_the_resource() {
        let err = error_from_parts("compute", "zone/vm1", StatusCode::NOT_FOUND, "");
        assert!(matches!(
            err,
            BackendError::NotFound { resource, .. } if resource == "zone/vm1"
        ));
    }

    #[test]
    fn unparsable_body_is_kept_verbatim() {
        let err = error_from_parts("tasks", "q", StatusCode::BAD_GATEWAY, "upstream down");
        match err {
            BackendError::Rejected { status, message, .. } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
