//! Error types for quay-core

use thiserror::Error;

/// Result type alias using quay-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in quay-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Sync node or repository not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote repository rejected the request
    #[error("Remote error: {0}")]
    Remote(String),

    /// The request was cancelled before it completed
    #[error("Request cancelled")]
    Cancelled,

    /// The request task stopped without producing a result
    #[error("Request task failed: {0}")]
    TaskFailed(String),
}
