use thiserror::Error;

/// Why a single source produced nothing. Never surfaced to the page; the
/// resolver falls through to the next source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("skipped: {0}")]
    Skipped(String),
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Unavailable(_) => "unavailable",
            SourceError::Malformed(_) => "malformed",
            SourceError::Timeout(_) => "timeout",
            SourceError::Skipped(_) => "skipped",
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Malformed(err.to_string())
        } else {
            SourceError::Unavailable(err.to_string())
        }
    }
}

/// Write-back failure. Logged, never rolls back local state.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
}

impl PersistError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PersistError::Transport(e) => crate::retry::is_retryable_network_error(e),
            PersistError::Status { status, .. } => crate::retry::is_retryable_http_error(*status),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("unknown section `{0}`")]
    UnknownSection(String),
    #[error("value does not fit section `{section}`: {reason}")]
    Rejected { section: String, reason: String },
}
