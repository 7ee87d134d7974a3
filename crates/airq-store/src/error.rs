//! Error types for airq-store.

use std::path::PathBuf;

/// Result type for airq-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in airq-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored row could not be turned back into a sample.
    #[error("Corrupt row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },

    /// The database was written by a schema version this build does not know.
    #[error("Unsupported schema version {found} (expected {supported})")]
    UnsupportedSchema { found: i32, supported: i32 },
}
