//! Error types for the metadata index.

use thiserror::Error;

/// Result type alias for index operations.
pub type MetaResult<T> = Result<T, MetaError>;

/// Error variants for metadata index operations.
#[derive(Debug, Error)]
pub enum MetaError {
    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No record exists for the requested virtual path.
    #[error("no record for path: {path}")]
    NotFound {
        /// The virtual path that was looked up.
        path: String,
    },

    /// A record already exists where none was expected.
    #[error("record already exists for path: {path}")]
    AlreadyExists {
        /// The conflicting virtual path.
        path: String,
    },

    /// A stored row violated an invariant (bad timestamp, negative size).
    #[error("corrupt index row for {path}: {reason}")]
    CorruptRow {
        /// The virtual path of the offending row.
        path: String,
        /// What was wrong with it.
        reason: String,
    },
}
