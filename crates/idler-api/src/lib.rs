mod error;
pub use error::ApiError;

mod handler;
pub use handler::{ApiHandler, ServiceInfo};

mod adapter;
pub use adapter::OrchestratorAdapter;

mod signature;
pub use signature::{SignatureError, secrets_match, verify_signature};

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpApi;

#[cfg(feature = "http")]
pub use axum;
