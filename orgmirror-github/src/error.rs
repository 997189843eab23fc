//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub operations
#[derive(Error, Debug)]
pub enum Error {
    /// GitHub API error
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// Authentication error
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// Organization missing or not visible to the token
    #[error("Organization {0} not found or not accessible")]
    OrganizationNotFound(String),
}

impl From<Error> for orgmirror_core::Error {
    fn from(err: Error) -> Self {
        orgmirror_core::Error::Hosting(err.to_string())
    }
}
