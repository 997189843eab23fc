//! Retention store errors

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Schema could not be brought up to date
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Cannot create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No platform cache directory to hold the default database
    #[error("Could not determine cache directory")]
    NoCacheDir,

    /// A stored timestamp could not be converted back to a date
    #[error("Invalid timestamp in column {column}: {value}")]
    InvalidTimestamp { column: &'static str, value: i64 },
}

pub type Result<T> = std::result::Result<T, Error>;
