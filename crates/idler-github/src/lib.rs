//! GitHub Actions job-status backend.
//!
//! Authenticates as a GitHub App installation and answers "is this self-hosted runner busy"
//! from the repository runners API.

mod error;
pub use error::GithubError;

mod app;
pub use app::{AppCredentials, InstallationAuth};

mod runners;
pub use runners::{GithubConfig, GithubRunners};
