use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid instance id: {0}")]
    InvalidInstanceId(String),
}

/// Load-time rejections of a routing table.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("routing config is not valid JSON: {0}")]
    Malformed(String),

    #[error("entry #{index}: repo must not be empty")]
    EmptyRepo { index: usize },

    #[error("entry #{index}: {reason}")]
    InvalidInstance { index: usize, reason: String },

    #[error("entry #{index}: no zone given and no default zone configured")]
    MissingZone { index: usize },

    #[error("instance '{instance}' is mapped to zones '{first}' and '{second}'")]
    ConflictingZone {
        instance: String,
        first: String,
        second: String,
    },

    #[error(
        "entries #{first} and #{second} overlap for repo '{repo}' but target different instances"
    )]
    Ambiguous {
        repo: String,
        first: usize,
        second: usize,
    },
}
