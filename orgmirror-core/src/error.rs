//! Error types for orgmirror

use thiserror::Error;

use crate::git::GitError;

/// Result type alias for orgmirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for orgmirror operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Version control error
    #[error(transparent)]
    Git(#[from] GitError),

    /// Retention database error
    #[error("Retention database error: {0}")]
    Database(#[from] orgmirror_db::Error),

    /// Hosting API error (organization or repository enumeration)
    #[error("Hosting API error: {0}")]
    Hosting(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
