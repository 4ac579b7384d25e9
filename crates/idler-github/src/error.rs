use thiserror::Error;

/// Construction-time failures of the GitHub backend.
#[derive(Debug, Error)]
pub enum GithubError {
    #[error("invalid github config: {0}")]
    Config(String),

    #[error("invalid app private key: {0}")]
    Key(#[from] jsonwebtoken::errors::Error),

    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
}
