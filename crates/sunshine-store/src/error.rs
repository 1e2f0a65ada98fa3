//! Error types for sunshine-store.

use std::path::PathBuf;

use time::Date;

/// Result type for sunshine-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sunshine-store.
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

    /// A weather record that cannot be stored.
    #[error("Invalid weather record for {date}: {reason}")]
    InvalidRecord { date: Date, reason: String },

    /// A batch upsert stopped part way; the first `written` rows are committed.
    #[error("Upsert stopped after {written} row(s): {source}")]
    PartialUpsert {
        written: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Number of rows committed before the failure, if this was a batch write.
    pub fn rows_written(&self) -> usize {
        match self {
            Error::PartialUpsert { written, .. } => *written,
            _ => 0,
        }
    }
}
