//! Google Cloud backends: Compute Engine power control and Cloud Tasks stop scheduling.
//!
//! Both talk to the public REST APIs with `reqwest`; access tokens come from `gcp_auth`, which
//! discovers credentials from the environment (metadata server on Cloud Run, ADC locally).
//!
//! ## Example
//! ```rust,ignore
//! let auth = idler_gcp::default_provider().await?;
//! let compute = ComputeEngine::new(ComputeConfig::new("my-project"), auth.clone())?;
//! let tasks = CloudTasksScheduler::new(
//!     CloudTasksConfig::new("my-project", "us-central1", "runner-stops", "https://idler.run.app", secret),
//!     auth,
//! )?;
//! ```

mod error;
pub use error::GcpError;

mod api;

mod compute;
pub use compute::{ComputeConfig, ComputeEngine};

mod tasks;
pub use tasks::{CloudTasksConfig, CloudTasksScheduler};

use std::sync::Arc;

pub use gcp_auth::TokenProvider;

/// Token provider discovered from the environment (metadata server, ADC, gcloud).
pub async fn default_provider() -> Result<Arc<dyn TokenProvider>, GcpError> {
    Ok(gcp_auth::provider().await?)
}
