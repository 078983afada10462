//! Error types for ideaflow-core

use thiserror::Error;

/// Main error type for the ideaflow-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller is not authenticated against the backend. Never retried.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Malformed input, rejected before any network call
    #[error("validation error: {0}")]
    Validation(String),

    /// Transport-level HTTP failure (connection, timeout, decode)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Backend or third-party service returned an error response
    #[error("API error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Api {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// Poll budget exhausted without a terminal status
    #[error("Generation timed out after {attempts} status checks")]
    Timeout { attempts: u32 },

    /// Generation service reported a terminal failure
    #[error("generation failed: {0}")]
    Generation(String),

    /// Polling was cancelled; persisted state is kept for a later resume
    #[error("generation polling cancelled")]
    Cancelled,

    /// Another generation for the same idea is still in flight
    #[error("a prototype generation is already in progress for idea {0}")]
    AlreadyGenerating(String),

    /// Requested record does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether a request that failed with this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) => true,
            Error::Api {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this error came from the poll budget running out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Result type alias for ideaflow-core
pub type Result<T> = std::result::Result<T, Error>;
