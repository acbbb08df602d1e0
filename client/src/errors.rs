use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("permission denied")]
    PermissionDenied,

    /// The cached snapshot cannot answer every requested action; callers
    /// fall through to the base client.
    #[error("snapshot cannot answer the requested actions")]
    UnknownPermissionAction,

    #[error("malformed cache key: {0}")]
    MalformedKey(String),

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("aggregator is shut down")]
    Closed,

    #[error("server error {code}: {message}")]
    Server { code: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl ClientError {
    pub fn is_unknown_permission_action(&self) -> bool {
        matches!(self, ClientError::UnknownPermissionAction)
    }
}
