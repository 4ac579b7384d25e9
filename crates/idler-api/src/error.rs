use thiserror::Error;

use idler_core::CoreError;

use crate::signature::SignatureError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl From<SignatureError> for ApiError {
    fn from(err: SignatureError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

impl ApiError {
    /// Machine-readable error code carried in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::NotFound => "not_found",
            ApiError::Internal(_) => "internal",
            ApiError::Core(CoreError::UnresolvedZone(_)) => "unresolved_zone",
            ApiError::Core(CoreError::Backend(_)) => "backend_error",
        }
    }
}

#[cfg(feature = "http")]
mod response {
    use axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use idler_core::CoreError;
    use serde::Serialize;

    use super::ApiError;

    #[derive(Serialize)]
    struct ErrorBody<'a> {
        code: &'a str,
        message: String,
    }

    impl ApiError {
        pub fn status(&self) -> StatusCode {
            match self {
                ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                ApiError::NotFound => StatusCode::NOT_FOUND,
                ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::Core(CoreError::UnresolvedZone(_)) => StatusCode::BAD_REQUEST,
                ApiError::Core(CoreError::Backend(_)) => StatusCode::BAD_GATEWAY,
            }
        }
    }

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            let status = self.status();
            if status.is_server_error() {
                tracing::error!(code = self.code(), error = %self, "request failed");
            } else {
                tracing::debug!(code = self.code(), error = %self, "request rejected");
            }
            let body = ErrorBody {
                code: self.code(),
                message: self.to_string(),
            };
            (status, Json(body)).into_response()
        }
    }
}
