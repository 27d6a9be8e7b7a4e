//! Error types for elara

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for elara operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Why a remote listing call was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingFailure {
    /// The API answered with a non-2xx status
    Status(u16),
    /// The response had no `files` field
    MissingFiles,
    /// The call failed below the HTTP status level
    Transport(String),
}

impl fmt::Display for ListingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingFailure::Status(code) => write!(f, "status {}", code),
            ListingFailure::MissingFiles => write!(f, "response has no file listing"),
            ListingFailure::Transport(message) => write!(f, "transport failure: {}", message),
        }
    }
}

/// Main error type for elara
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Local scan failed under {root}: {source}")]
    LocalScan {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Error getting remote file listing for {path}: {cause}")]
    RemoteListing { path: String, cause: ListingFailure },

    #[error("Remote API error: {0}")]
    Api(String),

    #[error("HTTP request error: {0}")]
    #[cfg(feature = "http")]
    Http(#[from] reqwest::Error),

    #[error("HTTP request error: {0}")]
    #[cfg(not(feature = "http"))]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Check if error is retryable
    ///
    /// Nothing in this crate retries on its own; callers use this to decide
    /// whether to schedule another reconciliation cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::RemoteListing { cause, .. } => match cause {
                ListingFailure::Status(code) => *code >= 500 || *code == 429,
                ListingFailure::MissingFiles => false,
                ListingFailure::Transport(_) => true,
            },
            SyncError::Http(_) | SyncError::Timeout(_) => true,
            _ => false,
        }
    }

    pub(crate) fn remote_listing(path: impl Into<String>, cause: ListingFailure) -> Self {
        SyncError::RemoteListing {
            path: path.into(),
            cause,
        }
    }
}
