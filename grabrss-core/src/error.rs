use thiserror::Error;

/// Poll-level failures. The `Display` text is what callers show to the user.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("no such feed: {feed}")]
    ConfigNotFound { feed: String },
    #[error("failed to retrieve RSS from {uri}: {reason}")]
    SourceUnreachable { uri: String, reason: String },
    #[error("RSS feed was empty: {uri}")]
    EmptyFeed { uri: String },
    #[error("incompatible feed {uri}")]
    IncompatibleEntry { uri: String },
    #[error("poll cancelled by shutdown")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("feed parsing error: {0}")]
    Parse(String),
}

impl From<rss::Error> for FetchError {
    fn from(err: rss::Error) -> Self {
        FetchError::Parse(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
