use thiserror::Error;

/// Failure to obtain current conditions for one location.
#[derive(Debug, Error)]
#[error("failed to fetch weather for {location}: {kind}")]
pub struct FetchError {
    pub location: String,
    #[source]
    pub kind: FetchErrorKind,
}

impl FetchError {
    pub fn new(location: impl Into<String>, kind: FetchErrorKind) -> Self {
        Self { location: location.into(), kind }
    }
}

#[derive(Debug, Error)]
pub enum FetchErrorKind {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("response is missing {0}")]
    MissingField(&'static str),
}

/// Failure of a statement against the relational store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("connection lock poisoned")]
    Poisoned,
}
